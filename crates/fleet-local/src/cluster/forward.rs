use std::sync::Weak;

use async_trait::async_trait;
use tokio::sync::mpsc;

use fleet_core::SchedulerEvent;
use fleet_exec::{ExecutorDriver, StatusSendError};
use fleet_model::{NodeId, TaskState, TaskStatus};

use super::Inner;

/// Executor driver of one node: relays updates to the scheduler stream.
pub(super) struct StatusForwarder {
    node_id: NodeId,
    events: mpsc::Sender<SchedulerEvent>,
    cluster: Weak<Inner>,
}

impl StatusForwarder {
    pub fn new(node_id: NodeId, events: mpsc::Sender<SchedulerEvent>, cluster: Weak<Inner>) -> Self {
        Self {
            node_id,
            events,
            cluster,
        }
    }
}

#[async_trait]
impl ExecutorDriver for StatusForwarder {
    async fn send_status_update(&self, mut status: TaskStatus) -> Result<(), StatusSendError> {
        if status.state.is_terminal()
            && let Some(cluster) = self.cluster.upgrade()
            && cluster.release(&status.task_id).await
            && status.state == TaskState::Failed
        {
            status.state = TaskState::Killed;
        }
        if status.node_id.is_none() {
            status.node_id = Some(self.node_id.clone());
        }
        self.events
            .send(SchedulerEvent::StatusUpdate(status))
            .await
            .map_err(|_| StatusSendError::Closed)
    }
}
