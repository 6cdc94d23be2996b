use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Lifecycle state of a task as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    /// Waiting in the work queue for an offer.
    Queued,
    /// Bound to an offer and handed to the transport.
    Launched,
    /// The executor accepted the task and started work.
    Running,
    /// Completed successfully.
    Finished,
    /// Failed during fetch or execution.
    Failed,
    /// Killed on request of the resource manager or the framework.
    Killed,
    /// Lost together with its node or executor.
    Lost,
}

impl TaskState {
    /// Returns `true` if the task is in a terminal state (won't transition further).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Failed | TaskState::Killed | TaskState::Lost
        )
    }

    /// Returns `true` for terminal states other than `Finished`.
    pub fn is_failure(&self) -> bool {
        self.is_terminal() && *self != TaskState::Finished
    }

    /// Whether `self -> next` is a legal lifecycle step.
    ///
    /// Nothing returns to `Queued`, nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Queued, Launched) => true,
            (Launched, Running) => true,
            (Launched | Running, s) if s.is_terminal() => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Launched => "launched",
            TaskState::Running => "running",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Killed => "killed",
            TaskState::Lost => "lost",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" => Ok(TaskState::Queued),
            "launched" => Ok(TaskState::Launched),
            "running" => Ok(TaskState::Running),
            "finished" => Ok(TaskState::Finished),
            "failed" => Ok(TaskState::Failed),
            "killed" => Ok(TaskState::Killed),
            "lost" => Ok(TaskState::Lost),
            _ => Err(ModelError::InvalidState(s.to_string())),
        }
    }
}
