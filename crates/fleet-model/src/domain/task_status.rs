use serde::{Deserialize, Serialize};

use crate::{NodeId, TaskId, TaskState};

/// Status update travelling from a node back to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    /// Human readable reason, set on failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Captured task output, set on `Finished`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
}

impl TaskStatus {
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        Self {
            task_id,
            state,
            message: None,
            data: None,
            node_id: None,
        }
    }

    pub fn running(task_id: TaskId) -> Self {
        Self::new(task_id, TaskState::Running)
    }

    pub fn finished(task_id: TaskId, output: impl Into<String>) -> Self {
        Self {
            data: Some(output.into()),
            ..Self::new(task_id, TaskState::Finished)
        }
    }

    pub fn failed(task_id: TaskId, detail: impl Into<String>) -> Self {
        Self::new(task_id, TaskState::Failed).with_message(detail)
    }

    pub fn lost(task_id: TaskId, reason: impl Into<String>) -> Self {
        Self::new(task_id, TaskState::Lost).with_message(reason)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_node(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn message_or_empty(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}
