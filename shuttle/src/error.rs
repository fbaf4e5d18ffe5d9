//! Error types for planning and executing tasks

use shuttle_gateway::GatewayError;
use thiserror::Error;

use crate::plan::LaunchReport;
use crate::runtime::RuntimeKind;

/// Main error type for the orchestration engine
#[derive(Error, Debug)]
pub enum ShuttleError {
    /// An operation was attempted in a state that does not allow it
    /// (status of an unlaunched task, double launch, resizing a launched plan)
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// The user declined the confirmation prompt
    #[error("Execution was aborted by user")]
    UserAborted,

    /// A network runtime was used without an access credential
    #[error("Not logged in: {0} requires an access credential")]
    MissingCredential(String),

    /// A runtime backend reported something the engine cannot use
    #[error("{kind} runtime error: {message}")]
    Backend { kind: RuntimeKind, message: String },

    /// Gateway Execution Service failure
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Launching stopped partway; `report` says which tasks are running remotely
    #[error("Launch failed at task {index}: {source}")]
    LaunchFailed {
        index: usize,
        #[source]
        source: Box<ShuttleError>,
        report: LaunchReport,
    },

    /// A plan or experiment file named a runtime kind with no backend
    #[error("Unknown runtime kind: {0}")]
    UnknownRuntime(String),

    /// A plan or experiment file is structurally valid but semantically wrong
    #[error("Invalid plan file: {0}")]
    PlanFormat(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, ShuttleError>;

impl ShuttleError {
    /// Conditions the CLI reports as a message rather than a failure
    pub fn is_expected(&self) -> bool {
        matches!(self, ShuttleError::UserAborted | ShuttleError::MissingCredential(_))
    }
}
