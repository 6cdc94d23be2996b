//! Executor event loop.
//!
//! Launches are queued FIFO and handed to a single worker, so at most one task runs at a time.
//! Every task gets a child of the executor's shutdown token; `KillTask` cancels one task,
//! `Shutdown` cancels all of them.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fleet_model::{ExecutorId, NodeId, TaskAssignment, TaskId};

mod runner;
pub use runner::{TaskRunner, Workload};

const TARGET: &str = "fleet.exec.executor";

/// How many completed task ids are remembered to reject a redelivered launch.
const COMPLETED_MEMORY: usize = 256;

/// Callbacks delivered to the executor by the transport.
#[derive(Debug, Clone)]
pub enum ExecutorEvent {
    Registered {
        executor_id: ExecutorId,
        node_id: NodeId,
    },
    Reregistered {
        node_id: NodeId,
    },
    Disconnected,
    LaunchTask(TaskAssignment),
    KillTask(TaskId),
    FrameworkMessage(String),
    Shutdown,
    Error(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub launched: usize,
    pub finished: usize,
    pub failed: usize,
}

/// Tasks this executor has accepted: queued or running, plus the most recently completed.
#[derive(Default)]
struct Ledger {
    live: HashMap<TaskId, CancellationToken>,
    completed: VecDeque<TaskId>,
}

impl Ledger {
    fn knows(&self, task_id: &TaskId) -> bool {
        self.live.contains_key(task_id) || self.completed.contains(task_id)
    }

    fn complete(&mut self, task_id: &TaskId) {
        self.live.remove(task_id);
        if self.completed.len() == COMPLETED_MEMORY {
            self.completed.pop_front();
        }
        self.completed.push_back(task_id.clone());
    }
}

type Tokens = Arc<Mutex<Ledger>>;

pub struct Executor {
    runner: Arc<TaskRunner>,
    shutdown: CancellationToken,
}

impl Executor {
    pub fn new(runner: TaskRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling this token has the same effect as a `Shutdown` event.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Consume events until `Shutdown` or until the event channel closes.
    ///
    /// On `Shutdown` queued and running tasks are cancelled (each still reports `Failed`);
    /// on channel close the queued work is drained normally.
    pub async fn run(self, mut events: mpsc::Receiver<ExecutorEvent>) -> ExecutorStats {
        let tokens: Tokens = Arc::default();
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(work_loop(self.runner.clone(), work_rx, tokens.clone()));
        let mut launched = 0;

        loop {
            let event = tokio::select! {
                ev = events.recv() => ev,
                _ = self.shutdown.cancelled() => Some(ExecutorEvent::Shutdown),
            };
            let Some(event) = event else {
                debug!(target: TARGET, "event channel closed, draining queued tasks");
                break;
            };

            match event {
                ExecutorEvent::Registered {
                    executor_id,
                    node_id,
                } => info!(target: TARGET, %executor_id, %node_id, "executor registered"),
                ExecutorEvent::Reregistered { node_id } => {
                    info!(target: TARGET, %node_id, "executor re-registered")
                }
                ExecutorEvent::Disconnected => warn!(target: TARGET, "executor disconnected"),
                ExecutorEvent::FrameworkMessage(text) => {
                    info!(target: TARGET, %text, "framework message")
                }
                ExecutorEvent::Error(text) => error!(target: TARGET, %text, "transport error"),
                ExecutorEvent::LaunchTask(task) => {
                    let token = {
                        let mut tokens = tokens.lock().await;
                        if tokens.knows(&task.task_id) {
                            warn!(target: TARGET, task_id = %task.task_id, "duplicate launch ignored");
                            continue;
                        }
                        let token = self.shutdown.child_token();
                        tokens.live.insert(task.task_id.clone(), token.clone());
                        token
                    };
                    launched += 1;
                    debug!(target: TARGET, task_id = %task.task_id, launched, "task queued");
                    if work_tx.send((task, token)).is_err() {
                        error!(target: TARGET, "task worker is gone");
                        break;
                    }
                }
                ExecutorEvent::KillTask(task_id) => match tokens.lock().await.live.get(&task_id) {
                    Some(token) => {
                        info!(target: TARGET, %task_id, "kill requested, cancelling task");
                        token.cancel();
                    }
                    None => debug!(target: TARGET, %task_id, "kill for unknown or completed task"),
                },
                ExecutorEvent::Shutdown => {
                    info!(target: TARGET, "shutting down executor");
                    self.shutdown.cancel();
                    break;
                }
            }
        }

        drop(work_tx);
        let mut stats = worker.await.unwrap_or_else(|e| {
            error!(target: TARGET, error = %e, "task worker panicked");
            ExecutorStats::default()
        });
        stats.launched = launched;
        info!(target: TARGET, ?stats, "executor stopped");
        stats
    }
}

async fn work_loop(
    runner: Arc<TaskRunner>,
    mut queue: mpsc::UnboundedReceiver<(TaskAssignment, CancellationToken)>,
    tokens: Tokens,
) -> ExecutorStats {
    let mut stats = ExecutorStats::default();
    while let Some((task, cancel)) = queue.recv().await {
        let result = runner.run(&task, &cancel).await;
        tokens.lock().await.complete(&task.task_id);
        if result.failed {
            stats.failed += 1;
        } else {
            stats.finished += 1;
        }
    }
    stats
}

#[cfg(test)]
mod tests;
