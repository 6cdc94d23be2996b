use std::{
    collections::{HashMap, VecDeque},
    time::SystemTime,
};

use tracing::trace;

use fleet_model::{
    ModelError, NodeId, TaskDescriptor, TaskId, TaskState, TaskStatus, WorkUnit,
};

/// Scheduler-side view of one task.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub descriptor: TaskDescriptor,
    pub state: TaskState,
    pub updated_at: SystemTime,
    /// Last failure message reported for this task.
    pub error: Option<String>,
}

/// What applying a status update did to the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusOutcome {
    /// Legal non-terminal step (e.g. `Launched -> Running`).
    Progress,
    /// The task finished; `finished` was incremented.
    Finished,
    /// The task ended in `Failed`, `Lost` or `Killed`.
    Failed { attempt: u32, unit: WorkUnit },
    /// Duplicate or out-of-order update; nothing changed.
    Ignored { current: TaskState },
    /// No task with this id was ever launched.
    Unknown,
}

/// Bookkeeping of every task in one scheduler run.
///
/// Owned and mutated only by the scheduler loop, so no locking.
/// Counters are per work unit: `finished <= launched <= total` always holds.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, TaskRecord>,
    /// FIFO of queued task ids.
    queue: VecDeque<TaskId>,
    total: usize,
    next_id: u64,
    launched: usize,
    finished: usize,
    retried: usize,
}

impl TaskRegistry {
    /// One queued task per command, ids assigned in queue order starting at `1`.
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self {
            tasks: HashMap::new(),
            queue: VecDeque::new(),
            total: 0,
            next_id: 1,
            launched: 0,
            finished: 0,
            retried: 0,
        };
        for (unit, command) in commands.into_iter().enumerate() {
            let id = registry.alloc_id();
            registry.insert_queued(TaskDescriptor::new(id, command, unit));
            registry.total += 1;
        }
        registry
    }

    fn alloc_id(&mut self) -> TaskId {
        let id = TaskId::from(self.next_id.to_string());
        self.next_id += 1;
        id
    }

    fn insert_queued(&mut self, descriptor: TaskDescriptor) {
        let id = descriptor.task_id.clone();
        self.tasks.insert(
            id.clone(),
            TaskRecord {
                descriptor,
                state: TaskState::Queued,
                updated_at: SystemTime::now(),
                error: None,
            },
        );
        self.queue.push_back(id);
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Work units launched at least once.
    pub fn launched(&self) -> usize {
        self.launched
    }

    pub fn finished(&self) -> usize {
        self.finished
    }

    /// Descriptors created by retries.
    pub fn retried(&self) -> usize {
        self.retried
    }

    /// Descriptors still waiting for an offer.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn is_complete(&self) -> bool {
        self.finished == self.total
    }

    /// Nothing left to launch (running tasks may still be in flight).
    pub fn all_launched(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued descriptors in launch order.
    pub fn queued(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.queue
            .iter()
            .filter_map(|id| self.tasks.get(id).map(|r| &r.descriptor))
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.tasks.get(id)
    }

    pub fn state(&self, id: &TaskId) -> Option<TaskState> {
        self.tasks.get(id).map(|r| r.state)
    }

    /// Tasks launched or running.
    pub fn in_flight(&self) -> usize {
        self.tasks
            .values()
            .filter(|r| matches!(r.state, TaskState::Launched | TaskState::Running))
            .count()
    }

    /// Move a queued task to `Launched` on `node_id`.
    ///
    /// Fails if the task is unknown or not queued.
    pub fn mark_launched(
        &mut self,
        id: &TaskId,
        node_id: &NodeId,
    ) -> Result<&TaskDescriptor, ModelError> {
        let pos = self.queue.iter().position(|q| q == id).ok_or_else(|| {
            ModelError::IllegalTransition {
                task_id: id.to_string(),
                from: self
                    .state(id)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                to: TaskState::Launched.to_string(),
            }
        })?;
        self.queue.remove(pos);

        let record = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| ModelError::InvalidState(format!("task {id} missing from registry")))?;
        record.state = TaskState::Launched;
        record.updated_at = SystemTime::now();
        record.descriptor.node_id = Some(node_id.clone());
        if record.descriptor.attempt == 1 {
            self.launched += 1;
        }
        trace!(target: "fleet.core.registry", task_id = %id, node_id = %node_id, "task launched");
        Ok(&record.descriptor)
    }

    /// Apply a status update from the transport.
    pub fn apply_status(&mut self, status: &TaskStatus) -> StatusOutcome {
        let Some(record) = self.tasks.get_mut(&status.task_id) else {
            return StatusOutcome::Unknown;
        };
        if !record.state.can_transition_to(status.state) {
            return StatusOutcome::Ignored {
                current: record.state,
            };
        }

        record.state = status.state;
        record.updated_at = SystemTime::now();
        if let Some(msg) = &status.message
            && status.state.is_failure()
        {
            record.error = Some(msg.clone());
        }

        match status.state {
            TaskState::Finished => {
                self.finished += 1;
                StatusOutcome::Finished
            }
            s if s.is_failure() => StatusOutcome::Failed {
                attempt: record.descriptor.attempt,
                unit: record.descriptor.unit,
            },
            _ => StatusOutcome::Progress,
        }
    }

    /// Queue a fresh attempt of a failed task's work unit.
    ///
    /// The failed task keeps its terminal state; the new descriptor gets a new id.
    pub fn requeue(&mut self, failed: &TaskId) -> Option<TaskId> {
        let record = self.tasks.get(failed)?;
        if !record.state.is_failure() {
            return None;
        }
        let mut descriptor = TaskDescriptor::new(
            TaskId::from(String::new()),
            record.descriptor.command.clone(),
            record.descriptor.unit,
        );
        descriptor.attempt = record.descriptor.attempt + 1;

        let id = self.alloc_id();
        descriptor.task_id = id.clone();
        self.insert_queued(descriptor);
        self.retried += 1;
        trace!(target: "fleet.core.registry", failed = %failed, task_id = %id, "task requeued");
        Some(id)
    }
}
