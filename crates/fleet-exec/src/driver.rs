use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use fleet_model::TaskStatus;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatusSendError {
    #[error("status channel closed")]
    Closed,
    #[error("status update rejected: {0}")]
    Rejected(String),
}

/// Outbound half of the executor transport.
#[async_trait]
pub trait ExecutorDriver: Send + Sync {
    /// Deliver a status update to the scheduler (at-least-once on the transport side).
    async fn send_status_update(&self, status: TaskStatus) -> Result<(), StatusSendError>;
}

#[async_trait]
impl ExecutorDriver for mpsc::Sender<TaskStatus> {
    async fn send_status_update(&self, status: TaskStatus) -> Result<(), StatusSendError> {
        self.send(status).await.map_err(|_| StatusSendError::Closed)
    }
}

#[async_trait]
impl ExecutorDriver for mpsc::UnboundedSender<TaskStatus> {
    async fn send_status_update(&self, status: TaskStatus) -> Result<(), StatusSendError> {
        self.send(status).map_err(|_| StatusSendError::Closed)
    }
}
