use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("invalid resource demand: {0}")]
    InvalidDemand(String),
    #[error("invalid task state: {0}")]
    InvalidState(String),
    #[error("illegal transition for task {task_id}: {from} -> {to}")]
    IllegalTransition {
        task_id: String,
        from: String,
        to: String,
    },
}
