use std::time::Duration;

use async_trait::async_trait;
use fleet_model::{ExecutorInfo, ResourceDemand, TaskState, TaskStatus};

use super::*;
use crate::{
    driver::{ExecutorDriver, StatusSendError},
    error::{ExecutionError, PipelineError},
};

/// `ok:<out>` succeeds, `fail` fails, `block` waits for cancellation, `sleep:<ms>` succeeds late.
struct FakeWork;

#[async_trait]
impl Workload for FakeWork {
    async fn perform(&self, data: &str, cancel: &CancellationToken) -> Result<String, PipelineError> {
        if let Some(out) = data.strip_prefix("ok:") {
            return Ok(out.to_string());
        }
        if let Some(ms) = data.strip_prefix("sleep:") {
            tokio::time::sleep(Duration::from_millis(ms.parse().unwrap())).await;
            return Ok(data.to_string());
        }
        if data == "block" {
            cancel.cancelled().await;
            return Err(ExecutionError::Cancelled.into());
        }
        Err(ExecutionError::Stderr("boom".into()).into())
    }
}

/// Counts staging calls; the `bad` URI cannot be staged.
#[derive(Default)]
struct StagingWork {
    staged: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl Workload for StagingWork {
    async fn perform(&self, data: &str, cancel: &CancellationToken) -> Result<String, PipelineError> {
        FakeWork.perform(data, cancel).await
    }

    async fn stage_executor(&self, uri: &str, _cancel: &CancellationToken) -> Result<(), PipelineError> {
        self.staged.lock().unwrap().push(uri.to_string());
        if uri == "bad" {
            return Err(crate::FetchError::Status {
                url: uri.to_string(),
                status: 404,
            }
            .into());
        }
        Ok(())
    }
}

struct BrokenDriver;

#[async_trait]
impl ExecutorDriver for BrokenDriver {
    async fn send_status_update(&self, _status: TaskStatus) -> Result<(), StatusSendError> {
        Err(StatusSendError::Closed)
    }
}

fn assignment(id: &str, data: &str) -> TaskAssignment {
    TaskAssignment {
        task_id: TaskId::from(id),
        name: format!("fleet-task-{id}"),
        node_id: NodeId::from("node-1"),
        executor: ExecutorInfo::default(),
        resources: ResourceDemand::new(1.0, 128.0).unwrap(),
        data: data.to_string(),
    }
}

fn runner() -> (TaskRunner, mpsc::UnboundedReceiver<TaskStatus>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TaskRunner::new(Arc::new(FakeWork), Arc::new(tx)), rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<TaskStatus>) -> Vec<(String, TaskState)> {
    let mut out = Vec::new();
    while let Ok(s) = rx.try_recv() {
        out.push((s.task_id.to_string(), s.state));
    }
    out
}

fn st(id: &str, state: TaskState) -> (String, TaskState) {
    (id.to_string(), state)
}

#[tokio::test]
async fn success_reports_running_then_finished() {
    let (runner, mut rx) = runner();
    let result = runner
        .run(&assignment("1", "ok:a\n"), &CancellationToken::new())
        .await;
    assert!(!result.failed);

    let running = rx.recv().await.unwrap();
    assert_eq!(running.state, TaskState::Running);
    let done = rx.recv().await.unwrap();
    assert_eq!(done.state, TaskState::Finished);
    assert_eq!(done.data.as_deref(), Some("a\n"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn failure_reports_failed_and_never_finished() {
    let (runner, mut rx) = runner();
    let result = runner
        .run(&assignment("1", "fail"), &CancellationToken::new())
        .await;
    assert!(result.failed);

    let states: Vec<_> = drain(&mut rx).into_iter().map(|(_, s)| s).collect();
    assert_eq!(states, vec![TaskState::Running, TaskState::Failed]);
}

#[tokio::test]
async fn failure_detail_carries_the_error() {
    let (runner, mut rx) = runner();
    runner
        .run(&assignment("1", "fail"), &CancellationToken::new())
        .await;
    let _running = rx.recv().await.unwrap();
    let failed = rx.recv().await.unwrap();
    assert_eq!(
        failed.message.as_deref(),
        Some("execution error: stderr output: boom")
    );
}

#[tokio::test]
async fn node_id_is_stamped_on_updates() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = TaskRunner::new(Arc::new(FakeWork), Arc::new(tx)).with_node(NodeId::from("n7"));
    runner
        .run(&assignment("1", "ok:"), &CancellationToken::new())
        .await;
    while let Ok(s) = rx.try_recv() {
        assert_eq!(s.node_id, Some(NodeId::from("n7")));
    }
}

#[tokio::test]
async fn send_failures_do_not_stop_the_task() {
    let runner = TaskRunner::new(Arc::new(FakeWork), Arc::new(BrokenDriver));
    let result = runner
        .run(&assignment("1", "ok:x"), &CancellationToken::new())
        .await;
    assert_eq!(result.exit_output, "x");
}

#[tokio::test]
async fn launches_run_one_at_a_time_in_order() {
    let (runner, mut status_rx) = runner();
    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(Executor::new(runner).run(rx));

    tx.send(ExecutorEvent::LaunchTask(assignment("1", "sleep:50")))
        .await
        .unwrap();
    tx.send(ExecutorEvent::LaunchTask(assignment("2", "fail")))
        .await
        .unwrap();
    tx.send(ExecutorEvent::LaunchTask(assignment("3", "ok:c")))
        .await
        .unwrap();
    drop(tx);

    let stats = handle.await.unwrap();
    assert_eq!(
        stats,
        ExecutorStats {
            launched: 3,
            finished: 2,
            failed: 1
        }
    );
    assert_eq!(
        drain(&mut status_rx),
        vec![
            st("1", TaskState::Running),
            st("1", TaskState::Finished),
            st("2", TaskState::Running),
            st("2", TaskState::Failed),
            st("3", TaskState::Running),
            st("3", TaskState::Finished),
        ]
    );
}

#[tokio::test]
async fn kill_cancels_running_task_only() {
    let (runner, mut status_rx) = runner();
    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(Executor::new(runner).run(rx));

    tx.send(ExecutorEvent::LaunchTask(assignment("1", "block")))
        .await
        .unwrap();
    tx.send(ExecutorEvent::LaunchTask(assignment("2", "ok:next")))
        .await
        .unwrap();
    assert_eq!(status_rx.recv().await.unwrap().state, TaskState::Running);

    tx.send(ExecutorEvent::KillTask(TaskId::from("1")))
        .await
        .unwrap();
    let killed = status_rx.recv().await.unwrap();
    assert_eq!(killed.task_id, TaskId::from("1"));
    assert_eq!(killed.state, TaskState::Failed);
    assert_eq!(killed.message.as_deref(), Some("cancelled"));

    drop(tx);
    handle.await.unwrap();
    assert_eq!(
        drain(&mut status_rx),
        vec![st("2", TaskState::Running), st("2", TaskState::Finished)]
    );
}

#[tokio::test]
async fn kill_for_unknown_task_is_ignored() {
    let (runner, mut status_rx) = runner();
    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(Executor::new(runner).run(rx));

    tx.send(ExecutorEvent::KillTask(TaskId::from("99")))
        .await
        .unwrap();
    tx.send(ExecutorEvent::LaunchTask(assignment("1", "ok:a")))
        .await
        .unwrap();
    drop(tx);

    handle.await.unwrap();
    assert_eq!(
        drain(&mut status_rx),
        vec![st("1", TaskState::Running), st("1", TaskState::Finished)]
    );
}

#[tokio::test]
async fn shutdown_cancels_in_flight_and_queued_tasks() {
    let (runner, mut status_rx) = runner();
    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(Executor::new(runner).run(rx));

    tx.send(ExecutorEvent::LaunchTask(assignment("1", "block")))
        .await
        .unwrap();
    tx.send(ExecutorEvent::LaunchTask(assignment("2", "block")))
        .await
        .unwrap();
    assert_eq!(status_rx.recv().await.unwrap().state, TaskState::Running);
    tx.send(ExecutorEvent::Shutdown).await.unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.failed, 2);
    assert_eq!(
        drain(&mut status_rx),
        vec![
            st("1", TaskState::Failed),
            st("2", TaskState::Running),
            st("2", TaskState::Failed),
        ]
    );
}

#[tokio::test]
async fn shutdown_token_stops_the_loop() {
    let (runner, _status_rx) = runner();
    let (_tx, rx) = mpsc::channel(8);
    let executor = Executor::new(runner);
    let token = executor.shutdown_token();
    let handle = tokio::spawn(executor.run(rx));

    token.cancel();
    let stats = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats, ExecutorStats::default());
}

#[tokio::test]
async fn duplicate_launch_is_ignored() {
    let (runner, mut status_rx) = runner();
    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(Executor::new(runner).run(rx));

    tx.send(ExecutorEvent::LaunchTask(assignment("1", "sleep:50")))
        .await
        .unwrap();
    tx.send(ExecutorEvent::LaunchTask(assignment("1", "sleep:50")))
        .await
        .unwrap();
    drop(tx);

    assert_eq!(handle.await.unwrap().launched, 1);
    assert_eq!(drain(&mut status_rx).len(), 2);
}

fn with_executor_uri(mut task: TaskAssignment, uri: &str) -> TaskAssignment {
    task.executor.uri = Some(uri.to_string());
    task
}

#[tokio::test]
async fn advertised_executor_is_staged_once() {
    let work = Arc::new(StagingWork::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = TaskRunner::new(work.clone(), Arc::new(tx));
    let cancel = CancellationToken::new();

    for id in ["1", "2"] {
        let result = runner
            .run(&with_executor_uri(assignment(id, "ok:x"), "http://h/fleet-executor"), &cancel)
            .await;
        assert!(!result.failed);
    }
    assert_eq!(*work.staged.lock().unwrap(), vec!["http://h/fleet-executor".to_string()]);
    assert_eq!(drain(&mut rx).len(), 4);
}

#[tokio::test]
async fn unstageable_executor_fails_the_task() {
    let work = Arc::new(StagingWork::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = TaskRunner::new(work.clone(), Arc::new(tx));
    let cancel = CancellationToken::new();

    let result = runner
        .run(&with_executor_uri(assignment("1", "ok:x"), "bad"), &cancel)
        .await;
    assert!(result.failed);
    assert!(result.error_detail.unwrap().contains("404"));
    assert_eq!(
        drain(&mut rx),
        vec![st("1", TaskState::Running), st("1", TaskState::Failed)]
    );

    // Not remembered as staged: the next task tries again.
    runner
        .run(&with_executor_uri(assignment("2", "ok:x"), "bad"), &cancel)
        .await;
    assert_eq!(work.staged.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn redelivered_launch_of_a_completed_task_is_ignored() {
    let (runner, mut status_rx) = runner();
    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(Executor::new(runner).run(rx));

    tx.send(ExecutorEvent::LaunchTask(assignment("1", "ok:a")))
        .await
        .unwrap();
    assert_eq!(status_rx.recv().await.unwrap().state, TaskState::Running);
    assert_eq!(status_rx.recv().await.unwrap().state, TaskState::Finished);

    tx.send(ExecutorEvent::LaunchTask(assignment("1", "ok:a")))
        .await
        .unwrap();
    drop(tx);

    let stats = handle.await.unwrap();
    assert_eq!(stats.launched, 1);
    assert_eq!(stats.finished, 1);
    assert!(drain(&mut status_rx).is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn missing_artifact_reports_failed_without_finished() {
    use crate::{Pipeline, PipelineConfig, testutil};

    let addr = testutil::serve(testutil::scripts()).await;
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = PipelineConfig::default();
    cfg.fetch.address = addr.to_string();
    cfg.fetch.scratch_dir = dir.path().to_path_buf();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = TaskRunner::new(Arc::new(Pipeline::new(cfg).unwrap()), Arc::new(tx));
    let result = runner
        .run(&assignment("1", "missing.sh"), &CancellationToken::new())
        .await;

    assert!(result.failed);
    assert!(result.error_detail.unwrap().contains("404"));
    let running = rx.recv().await.unwrap();
    let failed = rx.recv().await.unwrap();
    assert_eq!(running.state, TaskState::Running);
    assert_eq!(failed.state, TaskState::Failed);
    assert!(rx.try_recv().is_err());
}
