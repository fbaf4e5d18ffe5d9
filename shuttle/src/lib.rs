//! # shuttle
//!
//! Plan, confirm, launch, monitor and collect scientific application runs on
//! local (simulated) or remote compute.
//!
//! A [`Plan`] is an ordered list of [`Task`]s, each bound to a [`Runtime`].
//! [`Experiment`] builds plans from shared inputs, replicas and parameter
//! sweeps; plans can be saved with their execution references and reloaded
//! later to keep monitoring.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use shuttle::{Application, Experiment, Runtime, TerminalConsole};
//!
//! #[tokio::main]
//! async fn main() -> shuttle::Result<()> {
//!     let mut experiment = Experiment::new(
//!         Application::new("demo", "echo"),
//!         Arc::new(Runtime::mock()),
//!     );
//!     experiment.add_replica(&[]).add_replica(&[]);
//!
//!     let mut plan = experiment.plan();
//!     plan.run(false, &mut TerminalConsole).await?;
//!     plan.join(Duration::from_secs(1)).await?;
//!     plan.collect_results("results".as_ref()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod experiment;
pub mod format;
pub mod gateway;
pub mod inputs;
pub mod plan;
pub mod runtime;
pub mod session;
pub mod state;
pub mod task;

pub use config::ShuttleConfig;
pub use console::{Console, ScriptedConsole, TerminalConsole};
pub use error::{Result, ShuttleError};
pub use experiment::{Application, Experiment, ExperimentDefinition};
pub use gateway::Gateway;
pub use inputs::{InputValue, Inputs};
pub use plan::{
    ExecutionOptions, JoinReport, LaunchReport, LaunchStatus, Plan, PlanFile, RunOutcome,
};
pub use runtime::{ExecutionRef, Runtime, RuntimeKind, RuntimeSpec};
pub use session::{Credential, CredentialStore, Session};
pub use state::ExecutionState;
pub use task::{Task, TaskSpec};
