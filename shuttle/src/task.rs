//! A single unit of work bound to a runtime

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::error::{Result, ShuttleError};
use crate::inputs::{format_inputs, Inputs};
use crate::runtime::{ExecutionRef, Runtime, RuntimeSpec};
use crate::state::ExecutionState;

/// Signal sent to a running task by [`Task::stop`]
pub const STOP_SIGNAL: &str = "SIGTERM";

/// An application invocation with concrete inputs on a chosen runtime
///
/// A task holds no execution reference until [`Task::launch`] succeeds, and
/// may be launched at most once.
#[derive(Debug)]
pub struct Task {
    name: String,
    app_id: String,
    inputs: Inputs,
    runtime: Arc<Runtime>,
    execution_ref: Option<ExecutionRef>,
}

/// Serializable identity of a task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub name: String,
    pub app_id: String,
    pub inputs: Inputs,
    pub runtime: RuntimeSpec,
    pub execution_ref: Option<ExecutionRef>,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        app_id: impl Into<String>,
        inputs: Inputs,
        runtime: Arc<Runtime>,
    ) -> Self {
        Self {
            name: name.into(),
            app_id: app_id.into(),
            inputs,
            runtime,
            execution_ref: None,
        }
    }

    /// Reattach a task to an execution started earlier
    pub(crate) fn with_execution_ref(mut self, execution_ref: Option<ExecutionRef>) -> Self {
        self.execution_ref = execution_ref;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn execution_ref(&self) -> Option<&ExecutionRef> {
        self.execution_ref.as_ref()
    }

    pub fn is_launched(&self) -> bool {
        self.execution_ref.is_some()
    }

    pub fn spec(&self) -> TaskSpec {
        TaskSpec {
            name: self.name.clone(),
            app_id: self.app_id.clone(),
            inputs: self.inputs.clone(),
            runtime: self.runtime.spec(),
            execution_ref: self.execution_ref.clone(),
        }
    }

    fn require_ref(&self, operation: &str) -> Result<&ExecutionRef> {
        self.execution_ref.as_ref().ok_or_else(|| {
            ShuttleError::Precondition(format!(
                "cannot {} task {}: it has not been launched",
                operation, self.name
            ))
        })
    }

    /// Start the task on its runtime and record the reference
    pub async fn launch(&mut self) -> Result<&ExecutionRef> {
        if let Some(existing) = &self.execution_ref {
            return Err(ShuttleError::Precondition(format!(
                "task {} is already launched as {}",
                self.name, existing
            )));
        }

        info!("[{}] Launching on {}", self.name, self.runtime);
        let execution = self
            .runtime
            .execute(&self.name, &self.app_id, &self.inputs)
            .await?;
        info!("[{}] Launched as {}", self.name, execution);
        Ok(&*self.execution_ref.insert(execution))
    }

    pub async fn status(&self) -> Result<ExecutionState> {
        let execution = self.require_ref("query status of")?;
        self.runtime.status(execution).await
    }

    /// Remote paths of the task's output files
    pub async fn files(&self) -> Result<Vec<String>> {
        let execution = self.require_ref("list files of")?;
        self.runtime.list_files(execution).await
    }

    /// Ask the runtime to terminate the task
    pub async fn stop(&self) -> Result<()> {
        let execution = self.require_ref("stop")?;
        info!("[{}] Stopping {}", self.name, execution);
        self.runtime.signal(execution, STOP_SIGNAL).await
    }

    pub async fn download(&self, remote_path: &str, dest_dir: &Path) -> Result<PathBuf> {
        let execution = self.require_ref("download output of")?;
        self.runtime.download(execution, remote_path, dest_dir).await
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Task(name={}, app_id={}, inputs={}, runtime={}",
            self.name,
            self.app_id,
            format_inputs(&self.inputs),
            self.runtime
        )?;
        if let Some(execution) = &self.execution_ref {
            write!(f, ", ref={}", execution)?;
        }
        f.write_str(")")
    }
}
