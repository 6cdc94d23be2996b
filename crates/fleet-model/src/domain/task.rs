use serde::{Deserialize, Serialize};

use crate::{ExecutorId, NodeId, ResourceDemand, TaskId, WorkUnit};

/// A unit of work waiting in (or taken from) the scheduler's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub task_id: TaskId,
    /// Artifact locator handed to the executor.
    pub command: String,
    /// Index of the work-queue line this task executes.
    pub unit: WorkUnit,
    /// 1 for the first launch of a work unit, incremented on every retry.
    pub attempt: u32,
    /// Node the task was bound to; `None` while queued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
}

impl TaskDescriptor {
    pub fn new(task_id: TaskId, command: impl Into<String>, unit: WorkUnit) -> Self {
        Self {
            task_id,
            command: command.into(),
            unit,
            attempt: 1,
            node_id: None,
        }
    }

    /// Task name shown to the resource manager.
    pub fn name(&self) -> String {
        format!("fleet-task-{}", self.task_id)
    }
}

/// How a node obtains and starts the executor process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorInfo {
    pub executor_id: ExecutorId,
    pub name: String,
    /// Command run on the node after the artifact is fetched.
    pub command: String,
    /// Where the node downloads the executor binary from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl Default for ExecutorInfo {
    fn default() -> Self {
        Self {
            executor_id: ExecutorId::from("default"),
            name: "fleet executor".to_string(),
            command: "./fleet-executor".to_string(),
            uri: None,
        }
    }
}

/// Launch request payload: one task bound to one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssignment {
    pub task_id: TaskId,
    pub name: String,
    pub node_id: NodeId,
    pub executor: ExecutorInfo,
    pub resources: ResourceDemand,
    /// Command payload; for script tasks this is the artifact locator.
    pub data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_descriptor_starts_unbound() {
        let d = TaskDescriptor::new(TaskId::from("3"), "scripts/a.sh", 2);
        assert_eq!(d.attempt, 1);
        assert_eq!(d.unit, 2);
        assert!(d.node_id.is_none());
        assert_eq!(d.name(), "fleet-task-3");
    }
}
