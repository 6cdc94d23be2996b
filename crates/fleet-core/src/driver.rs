use async_trait::async_trait;
use thiserror::Error;

use fleet_model::{Filters, OfferId, TaskAssignment};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriverError {
    #[error("driver is closed")]
    Closed,
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("driver failure: {0}")]
    Failed(String),
}

/// Requests the scheduler sends to the resource manager.
///
/// Launches and declines are best effort: the manager reports the real outcome through
/// status updates. Implementations must not call back into the scheduler synchronously.
#[async_trait]
pub trait SchedulerDriver: Send + Sync {
    /// Launch `tasks` against `offer_id`; an empty list declines the offer.
    async fn launch_tasks(
        &self,
        offer_id: &OfferId,
        tasks: Vec<TaskAssignment>,
        filters: Filters,
    ) -> Result<(), DriverError>;

    async fn decline_offer(&self, offer_id: &OfferId, filters: Filters) -> Result<(), DriverError>;

    /// Graceful stop after success: no more offers, running work is left alone.
    async fn stop(&self) -> Result<(), DriverError>;

    /// Stop after a failure.
    async fn abort(&self) -> Result<(), DriverError>;
}
