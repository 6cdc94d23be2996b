//! Local resource manager.
//!
//! Offers every node's unreserved resources on a fixed cadence, honours refusal filters,
//! validates launches against the offer they name and runs accepted tasks on a per-node
//! in-process executor. Executor status updates are forwarded to the scheduler and
//! release the task's reservation once terminal.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::{
    sync::{Mutex, mpsc},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use fleet_core::{DriverError, SchedulerDriver, SchedulerEvent};
use fleet_exec::{Executor, ExecutorEvent, ExecutorStats, Pipeline, PipelineConfig, TaskRunner, Workload};
use fleet_model::{
    Filters, FrameworkId, NodeId, OfferId, ResourceOffer, Resources, TaskAssignment, TaskId,
    TaskStatus,
};

use crate::error::ClusterError;

mod forward;
mod node;

use forward::StatusForwarder;
use node::{Allocation, ExecutorSlot, Node, PendingOffer};

const TARGET: &str = "fleet.local.cluster";
const EXECUTOR_BUFFER: usize = 64;

/// Builds the workload a node's executor runs.
pub type WorkloadFactory =
    Arc<dyn Fn(&NodeId) -> Result<Arc<dyn Workload>, ClusterError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub node_id: NodeId,
    pub resources: Resources,
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub nodes: Vec<NodeSpec>,
    pub offer_interval: Duration,
    /// Unanswered offers are rescinded after this long.
    pub offer_timeout: Option<Duration>,
    /// Executor pipeline template; each node fetches into its own scratch subdirectory.
    pub pipeline: PipelineConfig,
    pub event_buffer: usize,
}

impl ClusterConfig {
    /// `count` identical nodes named after this host.
    pub fn uniform(count: usize, resources: Resources) -> Self {
        let host = host_name();
        let nodes = (1..=count)
            .map(|i| NodeSpec {
                node_id: NodeId::from(format!("{host}-{i}")),
                resources: resources.clone(),
            })
            .collect();
        Self {
            nodes,
            offer_interval: Duration::from_millis(200),
            offer_timeout: None,
            pipeline: PipelineConfig::default(),
            event_buffer: 1024,
        }
    }

    fn validate(&self) -> Result<(), ClusterError> {
        if self.nodes.is_empty() {
            return Err(ClusterError::Config("no nodes configured".into()));
        }
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(&node.node_id) {
                return Err(ClusterError::Config(format!("duplicate node id {}", node.node_id)));
            }
        }
        if self.offer_interval.is_zero() {
            return Err(ClusterError::Config("offer interval must be positive".into()));
        }
        if self.event_buffer == 0 {
            return Err(ClusterError::Config("event buffer must be positive".into()));
        }
        Ok(())
    }
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<NodeId, Node>,
    offers: HashMap<OfferId, PendingOffer>,
    tasks: HashMap<TaskId, Allocation>,
    /// Tasks with a kill request in flight; their `Failed` report becomes `Killed`.
    killing: HashSet<TaskId>,
}

struct Inner {
    framework_id: FrameworkId,
    offer_interval: Duration,
    offer_timeout: Option<Duration>,
    events: mpsc::Sender<SchedulerEvent>,
    state: Mutex<State>,
    stopped: CancellationToken,
    workload: WorkloadFactory,
}

/// Handle to a running local cluster; also the scheduler's driver.
#[derive(Clone)]
pub struct LocalCluster {
    inner: Arc<Inner>,
}

impl LocalCluster {
    /// Start a cluster whose executors run the artifact pipeline.
    ///
    /// Returns the scheduler event stream; `Registered` is always the first event.
    pub fn start(
        cfg: ClusterConfig,
    ) -> Result<(Self, mpsc::Receiver<SchedulerEvent>), ClusterError> {
        let template = cfg.pipeline.clone();
        let factory: WorkloadFactory = Arc::new(move |node: &NodeId| {
            let mut cfg = template.clone();
            cfg.fetch.scratch_dir = cfg.fetch.scratch_dir.join(node.as_str());
            let pipeline = Pipeline::new(cfg).map_err(|e| ClusterError::Executor {
                node: node.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Arc::new(pipeline) as Arc<dyn Workload>)
        });
        Self::start_with_workload(cfg, factory)
    }

    pub fn start_with_workload(
        cfg: ClusterConfig,
        workload: WorkloadFactory,
    ) -> Result<(Self, mpsc::Receiver<SchedulerEvent>), ClusterError> {
        cfg.validate()?;
        let (events, rx) = mpsc::channel(cfg.event_buffer);
        let node_count = cfg.nodes.len();
        let nodes = cfg
            .nodes
            .into_iter()
            .map(|n| (n.node_id.clone(), Node::new(n.node_id, n.resources)))
            .collect();

        let inner = Arc::new(Inner {
            framework_id: FrameworkId::from(Uuid::new_v4().to_string()),
            offer_interval: cfg.offer_interval,
            offer_timeout: cfg.offer_timeout,
            events,
            state: Mutex::new(State {
                nodes,
                ..Default::default()
            }),
            stopped: CancellationToken::new(),
            workload,
        });
        info!(
            target: TARGET,
            framework_id = %inner.framework_id,
            nodes = node_count,
            "local cluster started"
        );
        tokio::spawn(offer_loop(inner.clone()));
        Ok((Self { inner }, rx))
    }

    pub fn framework_id(&self) -> &FrameworkId {
        &self.inner.framework_id
    }

    pub async fn free_resources(&self, node_id: &NodeId) -> Option<Resources> {
        let st = self.inner.state.lock().await;
        st.nodes.get(node_id).map(|n| n.free.clone())
    }

    /// Ask the task's executor to kill it. Returns `false` if the task is not running here.
    pub async fn kill_task(&self, task_id: &TaskId) -> bool {
        let tx = {
            let mut st = self.inner.state.lock().await;
            let Some(node_id) = st.tasks.get(task_id).map(|a| a.node_id.clone()) else {
                return false;
            };
            let Some(tx) = st
                .nodes
                .get(&node_id)
                .and_then(|n| n.executor.as_ref())
                .map(|slot| slot.tx.clone())
            else {
                return false;
            };
            st.killing.insert(task_id.clone());
            tx
        };
        info!(target: TARGET, %task_id, "killing task");
        tx.send(ExecutorEvent::KillTask(task_id.clone())).await.is_ok()
    }

    /// Stop offers, close every executor and wait for it to drain.
    ///
    /// Drop the scheduler event receiver first if nobody reads it anymore, otherwise
    /// executors can block forwarding their last updates.
    pub async fn shutdown(&self) -> Vec<(NodeId, ExecutorStats)> {
        self.inner.stop(false).await;
        let slots: Vec<(NodeId, ExecutorSlot)> = {
            let mut st = self.inner.state.lock().await;
            st.nodes
                .values_mut()
                .filter_map(|n| n.executor.take().map(|slot| (n.id.clone(), slot)))
                .collect()
        };

        let mut stats = Vec::with_capacity(slots.len());
        for (node_id, slot) in slots {
            drop(slot.tx);
            match slot.handle.await {
                Ok(s) => stats.push((node_id, s)),
                Err(e) => warn!(target: TARGET, %node_id, error = %e, "executor task failed"),
            }
        }
        stats
    }
}

#[async_trait]
impl SchedulerDriver for LocalCluster {
    async fn launch_tasks(
        &self,
        offer_id: &OfferId,
        tasks: Vec<TaskAssignment>,
        filters: Filters,
    ) -> Result<(), DriverError> {
        if self.inner.stopped.is_cancelled() {
            return Err(DriverError::Closed);
        }
        self.inner.launch(offer_id, tasks, filters).await;
        Ok(())
    }

    async fn decline_offer(&self, offer_id: &OfferId, filters: Filters) -> Result<(), DriverError> {
        self.inner.decline(offer_id, filters).await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), DriverError> {
        self.inner.stop(false).await;
        Ok(())
    }

    async fn abort(&self) -> Result<(), DriverError> {
        self.inner.stop(true).await;
        Ok(())
    }
}

async fn offer_loop(inner: Arc<Inner>) {
    let registered = SchedulerEvent::Registered {
        framework_id: inner.framework_id.clone(),
        master: "local".to_string(),
    };
    if inner.events.send(registered).await.is_err() {
        return;
    }

    let mut tick = tokio::time::interval(inner.offer_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = inner.stopped.cancelled() => break,
            _ = tick.tick() => {}
        }
        let (rescinded, offers) = inner.offer_round(Instant::now()).await;
        for offer_id in rescinded {
            if inner.events.send(SchedulerEvent::OfferRescinded(offer_id)).await.is_err() {
                return;
            }
        }
        if !offers.is_empty() && inner.events.send(SchedulerEvent::ResourceOffers(offers)).await.is_err() {
            debug!(target: TARGET, "scheduler event stream closed, stopping offers");
            return;
        }
    }
    debug!(target: TARGET, "offer generation stopped");
}

impl Inner {
    async fn offer_round(&self, now: Instant) -> (Vec<OfferId>, Vec<ResourceOffer>) {
        let mut st = self.state.lock().await;
        let State { nodes, offers: pending, .. } = &mut *st;

        let mut rescinded = Vec::new();
        if let Some(timeout) = self.offer_timeout {
            pending.retain(|offer_id, offer| {
                if now.duration_since(offer.issued) < timeout {
                    return true;
                }
                if let Some(node) = nodes.get_mut(&offer.node_id) {
                    node.outstanding = None;
                }
                info!(target: TARGET, %offer_id, node_id = %offer.node_id, "offer unanswered, rescinding");
                rescinded.push(offer_id.clone());
                false
            });
        }

        let mut offers = Vec::new();
        for node in nodes.values_mut().filter(|n| n.offerable(now)) {
            let offer_id = OfferId::from(Uuid::new_v4().to_string());
            node.outstanding = Some(offer_id.clone());
            pending.insert(
                offer_id.clone(),
                PendingOffer {
                    node_id: node.id.clone(),
                    resources: node.free.clone(),
                    issued: now,
                },
            );
            trace!(target: TARGET, %offer_id, node_id = %node.id, "offering");
            offers.push(ResourceOffer::new(offer_id, node.id.clone(), node.free.clone()));
        }
        (rescinded, offers)
    }

    async fn launch(self: &Arc<Self>, offer_id: &OfferId, tasks: Vec<TaskAssignment>, filters: Filters) {
        let mut lost = Vec::new();
        let mut deliveries = Vec::new();
        {
            let mut st = self.state.lock().await;
            let State { nodes, offers, tasks: allocations, .. } = &mut *st;

            let node = offers
                .remove(offer_id)
                .and_then(|offer| nodes.get_mut(&offer.node_id).map(|node| (node, offer.resources)));
            let Some((node, mut remaining)) = node else {
                warn!(target: TARGET, %offer_id, count = tasks.len(), "launch against unknown or expired offer");
                lost.extend(tasks.into_iter().map(|t| {
                    TaskStatus::lost(t.task_id, format!("offer {offer_id} is no longer valid"))
                }));
                self.report_lost(lost);
                return;
            };
            node.answered(filters, Instant::now());

            for task in tasks {
                let reason = if task.node_id != node.id {
                    Some(format!("task targets node {} but offer is from {}", task.node_id, node.id))
                } else if !remaining.fits(&task.resources) {
                    Some(format!("offer {offer_id} has insufficient resources"))
                } else if allocations.contains_key(&task.task_id) {
                    Some("task id already running".to_string())
                } else {
                    None
                };
                if let Some(reason) = reason {
                    warn!(target: TARGET, task_id = %task.task_id, %offer_id, %reason, "rejecting task");
                    lost.push(TaskStatus::lost(task.task_id, reason).with_node(node.id.clone()));
                    continue;
                }

                let tx = match self.executor_for(node, &task) {
                    Ok(tx) => tx,
                    Err(e) => {
                        warn!(target: TARGET, task_id = %task.task_id, error = %e, "no executor for task");
                        lost.push(TaskStatus::lost(task.task_id, e.to_string()).with_node(node.id.clone()));
                        continue;
                    }
                };
                remaining.subtract(&task.resources);
                node.reserve(&task.resources);
                allocations.insert(
                    task.task_id.clone(),
                    Allocation {
                        node_id: node.id.clone(),
                        demand: task.resources,
                    },
                );
                debug!(target: TARGET, task_id = %task.task_id, node_id = %node.id, "task accepted");
                deliveries.push((tx, task));
            }
        }

        self.report_lost(lost);
        for (tx, task) in deliveries {
            let task_id = task.task_id.clone();
            if tx.send(ExecutorEvent::LaunchTask(task)).await.is_err() {
                warn!(target: TARGET, %task_id, "executor is gone");
                self.release(&task_id).await;
                self.report_lost(vec![TaskStatus::lost(task_id, "executor is gone")]);
            }
        }
    }

    fn executor_for(
        self: &Arc<Self>,
        node: &mut Node,
        task: &TaskAssignment,
    ) -> Result<mpsc::Sender<ExecutorEvent>, ClusterError> {
        if let Some(slot) = &node.executor {
            return Ok(slot.tx.clone());
        }
        let work = (self.workload)(&node.id)?;
        let forwarder = StatusForwarder::new(node.id.clone(), self.events.clone(), Arc::downgrade(self));
        let runner = TaskRunner::new(work, Arc::new(forwarder)).with_node(node.id.clone());

        let (tx, rx) = mpsc::channel(EXECUTOR_BUFFER);
        let handle = tokio::spawn(Executor::new(runner).run(rx));
        let _ = tx.try_send(ExecutorEvent::Registered {
            executor_id: task.executor.executor_id.clone(),
            node_id: node.id.clone(),
        });
        info!(
            target: TARGET,
            node_id = %node.id,
            executor_id = %task.executor.executor_id,
            uri = task.executor.uri.as_deref().unwrap_or_default(),
            "executor started"
        );
        node.executor = Some(ExecutorSlot {
            tx: tx.clone(),
            handle,
        });
        Ok(tx)
    }

    async fn decline(&self, offer_id: &OfferId, filters: Filters) {
        let mut st = self.state.lock().await;
        let Some(offer) = st.offers.remove(offer_id) else {
            debug!(target: TARGET, %offer_id, "decline for unknown offer");
            return;
        };
        if let Some(node) = st.nodes.get_mut(&offer.node_id) {
            node.answered(filters, Instant::now());
        }
        trace!(target: TARGET, %offer_id, refuse_seconds = filters.refuse_seconds, "offer declined");
    }

    /// Free the task's reservation. Returns `true` if a kill was requested for it.
    async fn release(&self, task_id: &TaskId) -> bool {
        let mut st = self.state.lock().await;
        let killed = st.killing.remove(task_id);
        if let Some(alloc) = st.tasks.remove(task_id)
            && let Some(node) = st.nodes.get_mut(&alloc.node_id)
        {
            node.release(&alloc.demand);
            trace!(target: TARGET, %task_id, node_id = %node.id, "resources released");
        }
        killed
    }

    fn report_lost(&self, lost: Vec<TaskStatus>) {
        if lost.is_empty() {
            return;
        }
        // Sent from a separate task: the caller may be the scheduler loop that drains `events`.
        let events = self.events.clone();
        tokio::spawn(async move {
            for status in lost {
                if events.send(SchedulerEvent::StatusUpdate(status)).await.is_err() {
                    break;
                }
            }
        });
    }

    async fn stop(&self, abort: bool) {
        let already = self.stopped.is_cancelled();
        self.stopped.cancel();
        let executors: Vec<mpsc::Sender<ExecutorEvent>> = {
            let mut st = self.state.lock().await;
            st.offers.clear();
            for node in st.nodes.values_mut() {
                node.outstanding = None;
            }
            if abort {
                st.nodes
                    .values()
                    .filter_map(|n| n.executor.as_ref().map(|slot| slot.tx.clone()))
                    .collect()
            } else {
                Vec::new()
            }
        };
        for tx in executors {
            let _ = tx.send(ExecutorEvent::Shutdown).await;
        }
        if !already {
            info!(target: TARGET, abort, "local cluster stopping");
        }
    }
}

#[cfg(test)]
mod tests;
