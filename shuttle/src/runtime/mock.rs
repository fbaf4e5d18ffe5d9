//! Simulated backend for local experimentation and tests

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shuttle_gateway::artifact_path;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Backend, ExecutionRef, RuntimeKind};
use crate::error::{Result, ShuttleError};
use crate::inputs::{InputValue, Inputs};
use crate::state::ExecutionState;

/// Progress counter value past which status reports `Completed`
pub const DEFAULT_THRESHOLD: u32 = 10;

/// Largest random increment applied per status query
pub const DEFAULT_MAX_STEP: u32 = 5;

/// Runtime that pretends to execute tasks
///
/// Every `status` call advances a shared counter by a random amount in
/// `0..=max_step`; once the counter exceeds `threshold`, every later call
/// reports `Completed`. The counter is shared by all tasks placed on the
/// same instance.
///
/// Recognised arguments: `seed` (any 64-bit integer), `threshold` and
/// `max_step` (non-negative integers) and `outputs` (relative paths reported
/// by `list_files`).
#[derive(Debug)]
pub struct MockRuntime {
    args: Inputs,
    threshold: u32,
    max_step: u32,
    outputs: Vec<String>,
    state: Mutex<Progress>,
}

#[derive(Debug)]
struct Progress {
    counter: u32,
    rng: StdRng,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::build(Inputs::new(), None, DEFAULT_THRESHOLD, DEFAULT_MAX_STEP, Vec::new())
    }

    pub fn seeded(seed: u64) -> Self {
        let mut args = Inputs::new();
        args.insert("seed".into(), InputValue::Integer(seed_to_arg(seed)));
        Self::build(args, Some(seed), DEFAULT_THRESHOLD, DEFAULT_MAX_STEP, Vec::new())
    }

    pub fn from_args(args: Inputs) -> Result<Self> {
        let seed = seed_arg(&args)?;
        let threshold = integer_arg(&args, "threshold")?.unwrap_or(DEFAULT_THRESHOLD.into());
        let max_step = integer_arg(&args, "max_step")?.unwrap_or(DEFAULT_MAX_STEP.into());

        let outputs = match args.get("outputs") {
            None => Vec::new(),
            Some(InputValue::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        invalid_arg("outputs", "expected a list of file names")
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(invalid_arg("outputs", "expected a list of file names")),
        };

        let threshold = u32::try_from(threshold)
            .map_err(|_| invalid_arg("threshold", "must be a non-negative 32-bit integer"))?;
        let max_step = u32::try_from(max_step)
            .map_err(|_| invalid_arg("max_step", "must be a non-negative 32-bit integer"))?;

        Ok(Self::build(args, seed, threshold, max_step, outputs))
    }

    fn build(
        args: Inputs,
        seed: Option<u64>,
        threshold: u32,
        max_step: u32,
        outputs: Vec<String>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            args,
            threshold,
            max_step,
            outputs,
            state: Mutex::new(Progress { counter: 0, rng }),
        }
    }

    /// Current value of the shared progress counter
    pub async fn progress(&self) -> u32 {
        self.state.lock().await.counter
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn integer_arg(args: &Inputs, key: &str) -> Result<Option<u64>> {
    match args.get(key) {
        None => Ok(None),
        Some(InputValue::Integer(value)) => u64::try_from(*value)
            .map(Some)
            .map_err(|_| invalid_arg(key, "must not be negative")),
        Some(_) => Err(invalid_arg(key, "expected an integer")),
    }
}

// Seeds are stored as the two's complement bits of the u64 so every seed
// survives a save/load round trip.
fn seed_to_arg(seed: u64) -> i64 {
    i64::from_ne_bytes(seed.to_ne_bytes())
}

fn seed_arg(args: &Inputs) -> Result<Option<u64>> {
    match args.get("seed") {
        None => Ok(None),
        Some(InputValue::Integer(value)) => Ok(Some(u64::from_ne_bytes(value.to_ne_bytes()))),
        Some(_) => Err(invalid_arg("seed", "expected an integer")),
    }
}

fn invalid_arg(key: &str, reason: &str) -> ShuttleError {
    ShuttleError::PlanFormat(format!("mock runtime argument '{}': {}", key, reason))
}

#[async_trait]
impl Backend for MockRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Mock
    }

    fn args(&self) -> &Inputs {
        &self.args
    }

    async fn upload(&self, local: &Path) -> Result<String> {
        Ok(local.display().to_string())
    }

    async fn execute(&self, name: &str, app_id: &str, inputs: &Inputs) -> Result<ExecutionRef> {
        let execution = ExecutionRef::new(Uuid::new_v4().to_string());
        info!(
            "Simulating {} ({}) with {} input(s) as {}",
            name,
            app_id,
            inputs.len(),
            execution
        );
        Ok(execution)
    }

    async fn status(&self, execution: &ExecutionRef) -> Result<ExecutionState> {
        let mut progress = self.state.lock().await;
        let step = progress.rng.gen_range(0..=self.max_step);
        progress.counter = progress.counter.saturating_add(step);

        let state = if progress.counter > self.threshold {
            ExecutionState::Completed
        } else {
            ExecutionState::Executing
        };
        debug!(
            "Mock status for {}: counter {} (+{}) -> {}",
            execution, progress.counter, step, state
        );
        Ok(state)
    }

    async fn signal(&self, execution: &ExecutionRef, signal: &str) -> Result<()> {
        debug!("Mock runtime ignoring {} for {}", signal, execution);
        Ok(())
    }

    async fn list_files(&self, _execution: &ExecutionRef) -> Result<Vec<String>> {
        Ok(self.outputs.clone())
    }

    async fn download(
        &self,
        execution: &ExecutionRef,
        remote_path: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        let relative = artifact_path(remote_path).ok_or_else(|| ShuttleError::Backend {
            kind: RuntimeKind::Mock,
            message: format!("'{}' is not a relative file path", remote_path),
        })?;

        let local = dest_dir.join(relative);
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(
            &local,
            format!("simulated output {} of {}\n", remote_path, execution),
        )
        .await?;
        Ok(local)
    }
}
