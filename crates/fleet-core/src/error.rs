use thiserror::Error;

use fleet_model::{ModelError, TaskId, TaskState};

use crate::driver::DriverError;

/// Framework-level failures. Every variant ends the scheduler run.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Work-queue source missing, unreadable or malformed.
    #[error("allocation error: {0}")]
    Allocation(String),

    /// Driver creation, connection or request failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The resource manager connection went away.
    #[error("disconnected from resource manager")]
    Disconnected,

    /// A task reached `Lost`, `Killed` or `Failed` with no retry left.
    #[error("aborting: task {task_id} is in unexpected state {state}: {message}")]
    ProtocolAbort {
        task_id: TaskId,
        state: TaskState,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    /// Process exit code for this failure class, distinct per class for supervisors.
    pub fn exit_code(&self) -> u8 {
        match self {
            CoreError::Allocation(_) => 2,
            CoreError::Transport(_) => 3,
            CoreError::ProtocolAbort { .. } => 4,
            CoreError::Disconnected => 5,
            CoreError::Config(_) => 6,
        }
    }
}

impl From<DriverError> for CoreError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::Closed => CoreError::Disconnected,
            other => CoreError::Transport(other.to_string()),
        }
    }
}

impl From<ModelError> for CoreError {
    fn from(e: ModelError) -> Self {
        CoreError::Config(e.to_string())
    }
}
