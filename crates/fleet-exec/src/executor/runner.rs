use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleet_model::{ExecutionResult, NodeId, TaskAssignment, TaskStatus};

use crate::{
    driver::ExecutorDriver,
    error::{FetchError, PipelineError},
    pipeline::Pipeline,
};

const TARGET: &str = "fleet.exec.runner";

/// What a task assignment's `data` is turned into.
#[async_trait]
pub trait Workload: Send + Sync {
    async fn perform(&self, data: &str, cancel: &CancellationToken) -> Result<String, PipelineError>;

    /// Make the executor binary advertised at `uri` available on the node.
    async fn stage_executor(&self, _uri: &str, _cancel: &CancellationToken) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[async_trait]
impl Workload for Pipeline {
    async fn perform(&self, data: &str, cancel: &CancellationToken) -> Result<String, PipelineError> {
        self.fetch_and_run(data, cancel).await
    }

    async fn stage_executor(&self, uri: &str, cancel: &CancellationToken) -> Result<(), PipelineError> {
        self.stage(uri, cancel).await?;
        Ok(())
    }
}

/// Runs one assignment and reports exactly `Running`, then `Finished` or `Failed`.
pub struct TaskRunner {
    work: Arc<dyn Workload>,
    driver: Arc<dyn ExecutorDriver>,
    node_id: Option<NodeId>,
    /// Executor URIs already staged on this node.
    staged: Mutex<HashSet<String>>,
}

impl TaskRunner {
    pub fn new(work: Arc<dyn Workload>, driver: Arc<dyn ExecutorDriver>) -> Self {
        Self {
            work,
            driver,
            node_id: None,
            staged: Mutex::default(),
        }
    }

    /// Stamp outgoing status updates with `node_id`.
    pub fn with_node(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub async fn run(&self, task: &TaskAssignment, cancel: &CancellationToken) -> ExecutionResult {
        info!(target: TARGET, task_id = %task.task_id, task = %task.name, data = %task.data, "launching task");
        self.report(TaskStatus::running(task.task_id.clone())).await;

        let result = match self.execute(task, cancel).await {
            Ok(output) => ExecutionResult::success(output),
            Err(e) if e.is_cancelled() => ExecutionResult::failure("cancelled"),
            Err(e) => ExecutionResult::failure(e.to_string()),
        };

        if result.failed {
            warn!(
                target: TARGET,
                task_id = %task.task_id,
                detail = result.error_detail.as_deref().unwrap_or_default(),
                "task failed"
            );
        } else {
            info!(target: TARGET, task_id = %task.task_id, output_bytes = result.exit_output.len(), "task finished");
        }
        self.report(result.clone().into_status(task.task_id.clone()))
            .await;
        result
    }

    async fn execute(
        &self,
        task: &TaskAssignment,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled.into());
        }
        if let Some(uri) = &task.executor.uri {
            self.stage_executor(uri, cancel).await?;
        }
        self.work.perform(&task.data, cancel).await
    }

    /// Stage each advertised executor once; a failed attempt is retried by the next task.
    async fn stage_executor(&self, uri: &str, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let mut staged = self.staged.lock().await;
        if staged.contains(uri) {
            return Ok(());
        }
        debug!(target: TARGET, %uri, "staging executor");
        self.work.stage_executor(uri, cancel).await?;
        staged.insert(uri.to_string());
        Ok(())
    }

    async fn report(&self, status: TaskStatus) {
        let status = match &self.node_id {
            Some(node) => status.with_node(node.clone()),
            None => status,
        };
        let (task_id, state) = (status.task_id.clone(), status.state);
        if let Err(e) = self.driver.send_status_update(status).await {
            warn!(target: TARGET, %task_id, %state, error = %e, "failed to send status update");
        }
    }
}
