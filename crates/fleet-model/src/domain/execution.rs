use serde::{Deserialize, Serialize};

use crate::{TaskId, TaskStatus};

/// Outcome of one task's fetch-and-run pipeline on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Captured standard output (empty on failure).
    pub exit_output: String,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            exit_output: output.into(),
            failed: false,
            error_detail: None,
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            exit_output: String::new(),
            failed: true,
            error_detail: Some(detail.into()),
        }
    }

    /// Terminal status update for this result: `Finished` with output, or `Failed` with detail.
    pub fn into_status(self, task_id: TaskId) -> TaskStatus {
        if self.failed {
            TaskStatus::failed(
                task_id,
                self.error_detail.unwrap_or_else(|| "task failed".to_string()),
            )
        } else {
            TaskStatus::finished(task_id, self.exit_output)
        }
    }
}
