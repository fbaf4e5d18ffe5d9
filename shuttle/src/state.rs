//! Lifecycle states reported by runtime backends

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Execution state of one task, as reported by its backend
///
/// Variants are declared in lifecycle order; `Ord` follows that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Created,
    Validated,
    Scheduled,
    Launched,
    Executing,
    Canceling,
    Canceled,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown execution state: {0}")]
pub struct UnknownState(pub String);

impl ExecutionState {
    pub const ALL: [ExecutionState; 9] = [
        ExecutionState::Created,
        ExecutionState::Validated,
        ExecutionState::Scheduled,
        ExecutionState::Launched,
        ExecutionState::Executing,
        ExecutionState::Canceling,
        ExecutionState::Canceled,
        ExecutionState::Completed,
        ExecutionState::Failed,
    ];

    /// Number of steps a progress indicator uses for one task
    pub const PROGRESS_STEPS: u64 = 6;

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Created => "CREATED",
            ExecutionState::Validated => "VALIDATED",
            ExecutionState::Scheduled => "SCHEDULED",
            ExecutionState::Launched => "LAUNCHED",
            ExecutionState::Executing => "EXECUTING",
            ExecutionState::Canceling => "CANCELING",
            ExecutionState::Canceled => "CANCELED",
            ExecutionState::Completed => "COMPLETED",
            ExecutionState::Failed => "FAILED",
        }
    }

    /// No further transitions happen after a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Canceled | ExecutionState::Failed
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionState::Completed)
    }

    /// Position on a task's progress indicator, out of [`Self::PROGRESS_STEPS`]
    pub fn progress(&self) -> u64 {
        match self {
            ExecutionState::Created => 0,
            ExecutionState::Validated => 1,
            ExecutionState::Scheduled => 2,
            ExecutionState::Launched => 3,
            ExecutionState::Executing => 4,
            ExecutionState::Canceling => 5,
            ExecutionState::Canceled | ExecutionState::Completed | ExecutionState::Failed => {
                Self::PROGRESS_STEPS
            }
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionState {
    type Err = UnknownState;

    /// Case-insensitive; accepts the aliases backends commonly use
    /// (`RUNNING`, `CANCELLED`, `CANCELLING`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_uppercase();
        let state = match label.as_str() {
            "CREATED" => ExecutionState::Created,
            "VALIDATED" => ExecutionState::Validated,
            "SCHEDULED" | "QUEUED" => ExecutionState::Scheduled,
            "LAUNCHED" => ExecutionState::Launched,
            "EXECUTING" | "RUNNING" => ExecutionState::Executing,
            "CANCELING" | "CANCELLING" => ExecutionState::Canceling,
            "CANCELED" | "CANCELLED" => ExecutionState::Canceled,
            "COMPLETED" => ExecutionState::Completed,
            "FAILED" => ExecutionState::Failed,
            _ => return Err(UnknownState(s.to_string())),
        };
        Ok(state)
    }
}
