//! Execution backends
//!
//! A [`Runtime`] is where tasks actually run. The set of backends is closed:
//! each [`RuntimeKind`] maps to one variant, and plan files name the kind by
//! its lowercase label.

mod mock;
mod remote;

pub use mock::{MockRuntime, DEFAULT_MAX_STEP, DEFAULT_THRESHOLD};
pub use remote::RemoteRuntime;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShuttleError};
use crate::inputs::{format_inputs, Inputs};
use crate::session::Session;
use crate::state::ExecutionState;

/// Opaque identifier a backend assigns to a launched task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionRef(String);

impl ExecutionRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Mock,
    Remote,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Mock => "mock",
            RuntimeKind::Remote => "remote",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = ShuttleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mock" | "local" => Ok(RuntimeKind::Mock),
            "remote" => Ok(RuntimeKind::Remote),
            other => Err(ShuttleError::UnknownRuntime(other.to_string())),
        }
    }
}

/// Serializable identity of a runtime: its kind and construction arguments
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSpec {
    pub kind: RuntimeKind,
    pub args: Inputs,
}

impl RuntimeSpec {
    pub fn new(kind: RuntimeKind, args: Inputs) -> Self {
        Self { kind, args }
    }
}

/// How a runtime appears in plan and experiment files
///
/// The kind stays a plain string here so that an unregistered kind surfaces
/// as [`ShuttleError::UnknownRuntime`] rather than a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeRecord {
    #[serde(alias = "id")]
    pub kind: String,
    #[serde(default)]
    pub args: Inputs,
}

impl RuntimeRecord {
    pub fn into_spec(self) -> Result<RuntimeSpec> {
        Ok(RuntimeSpec {
            kind: self.kind.parse()?,
            args: self.args,
        })
    }
}

impl From<&RuntimeSpec> for RuntimeRecord {
    fn from(spec: &RuntimeSpec) -> Self {
        Self {
            kind: spec.kind.as_str().to_string(),
            args: spec.args.clone(),
        }
    }
}

/// Contract every backend implements
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> RuntimeKind;

    fn args(&self) -> &Inputs;

    /// Stage a local file; returns the locator tasks should reference
    async fn upload(&self, local: &Path) -> Result<String>;

    /// Start a task and return its reference
    async fn execute(&self, name: &str, app_id: &str, inputs: &Inputs) -> Result<ExecutionRef>;

    async fn status(&self, execution: &ExecutionRef) -> Result<ExecutionState>;

    async fn signal(&self, execution: &ExecutionRef, signal: &str) -> Result<()>;

    async fn list_files(&self, execution: &ExecutionRef) -> Result<Vec<String>>;

    /// Fetch one remote file into `dest_dir`, returning the local path
    async fn download(
        &self,
        execution: &ExecutionRef,
        remote_path: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf>;
}

#[derive(Debug)]
pub enum Runtime {
    Mock(MockRuntime),
    Remote(RemoteRuntime),
}

impl Runtime {
    /// Unseeded simulated runtime with default parameters
    pub fn mock() -> Self {
        Runtime::Mock(MockRuntime::new())
    }

    /// Simulated runtime with a reproducible progression
    pub fn mock_seeded(seed: u64) -> Self {
        Runtime::Mock(MockRuntime::seeded(seed))
    }

    pub fn remote(args: Inputs, session: &Session) -> Self {
        Runtime::Remote(RemoteRuntime::new(args, session.clone()))
    }

    /// Build the backend registered for `spec.kind`
    pub fn from_spec(spec: RuntimeSpec, session: &Session) -> Result<Self> {
        match spec.kind {
            RuntimeKind::Mock => Ok(Runtime::Mock(MockRuntime::from_args(spec.args)?)),
            RuntimeKind::Remote => Ok(Runtime::remote(spec.args, session)),
        }
    }

    fn backend(&self) -> &dyn Backend {
        match self {
            Runtime::Mock(mock) => mock,
            Runtime::Remote(remote) => remote,
        }
    }

    pub fn kind(&self) -> RuntimeKind {
        self.backend().kind()
    }

    pub fn args(&self) -> &Inputs {
        self.backend().args()
    }

    pub fn spec(&self) -> RuntimeSpec {
        RuntimeSpec::new(self.kind(), self.args().clone())
    }

    pub async fn upload(&self, local: &Path) -> Result<String> {
        self.backend().upload(local).await
    }

    pub async fn execute(&self, name: &str, app_id: &str, inputs: &Inputs) -> Result<ExecutionRef> {
        self.backend().execute(name, app_id, inputs).await
    }

    pub async fn status(&self, execution: &ExecutionRef) -> Result<ExecutionState> {
        self.backend().status(execution).await
    }

    pub async fn signal(&self, execution: &ExecutionRef, signal: &str) -> Result<()> {
        self.backend().signal(execution, signal).await
    }

    pub async fn list_files(&self, execution: &ExecutionRef) -> Result<Vec<String>> {
        self.backend().list_files(execution).await
    }

    pub async fn download(
        &self,
        execution: &ExecutionRef,
        remote_path: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        self.backend().download(execution, remote_path, dest_dir).await
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind() {
            RuntimeKind::Mock => "Mock",
            RuntimeKind::Remote => "Remote",
        };
        write!(f, "{}(args={})", label, format_inputs(self.args()))
    }
}
