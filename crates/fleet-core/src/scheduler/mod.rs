mod event;
pub use event::SchedulerEvent;

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use fleet_model::{
    ExecutorInfo, Filters, FrameworkId, OfferId, ResourceDemand, ResourceOffer, TaskAssignment,
    TaskStatus,
};

use crate::{
    driver::SchedulerDriver,
    error::CoreError,
    matcher::{OfferMatcher, OfferPlan},
    policy::RetryPolicy,
    registry::{StatusOutcome, TaskRegistry},
};

const TARGET: &str = "fleet.core.scheduler";

/// How many rescinded offer ids are remembered to skip late deliveries.
const RESCINDED_MEMORY: usize = 256;

/// Lifecycle of one scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unregistered,
    Registered,
    /// Work remains in the queue; offers are matched.
    Offering,
    /// Everything launched, waiting for completions.
    Draining,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub demand: ResourceDemand,
    /// Attached to every launch and decline.
    pub filters: Filters,
    pub executor: ExecutorInfo,
    pub retry: RetryPolicy,
}

impl SchedulerConfig {
    pub fn new(demand: ResourceDemand) -> Self {
        Self {
            demand,
            filters: Filters::default(),
            executor: ExecutorInfo::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Counters reported when a run ends successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub launched: usize,
    pub finished: usize,
    pub retried: usize,
}

/// Whether the event loop keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

/// The callback surface registered with the cluster transport.
///
/// Events are handled strictly one at a time and run to completion; the scheduler owns the
/// registry exclusively, so nothing here is locked.
pub struct Scheduler {
    cfg: SchedulerConfig,
    matcher: OfferMatcher,
    registry: TaskRegistry,
    phase: Phase,
    framework_id: Option<FrameworkId>,
    /// Offer ids rescinded before they were delivered.
    rescinded: VecDeque<OfferId>,
}

impl Scheduler {
    /// Build a scheduler over the given work queue (one task per command).
    pub fn new<I, S>(cfg: SchedulerConfig, commands: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = TaskRegistry::new(commands);
        if registry.total() == 0 {
            return Err(CoreError::Allocation("work queue is empty".to_string()));
        }
        Ok(Self {
            matcher: OfferMatcher::new(cfg.demand),
            cfg,
            registry,
            phase: Phase::Unregistered,
            framework_id: None,
            rescinded: VecDeque::new(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn framework_id(&self) -> Option<&FrameworkId> {
        self.framework_id.as_ref()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total: self.registry.total(),
            launched: self.registry.launched(),
            finished: self.registry.finished(),
            retried: self.registry.retried(),
        }
    }

    /// Consume events until the run terminates.
    ///
    /// Returns the summary once every task finished, or the error that aborted the run.
    /// A channel closed before termination counts as a disconnect.
    pub async fn run<D>(
        &mut self,
        events: &mut mpsc::Receiver<SchedulerEvent>,
        driver: &D,
    ) -> Result<RunSummary, CoreError>
    where
        D: SchedulerDriver + ?Sized,
    {
        while let Some(event) = events.recv().await {
            match self.handle(event, driver).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Done) => {
                    let summary = self.summary();
                    info!(target: TARGET, ?summary, "framework run completed");
                    return Ok(summary);
                }
                Err(e) => {
                    self.set_phase(Phase::Terminated);
                    error!(target: TARGET, error = %e, "framework run aborted");
                    return Err(e);
                }
            }
        }
        self.set_phase(Phase::Terminated);
        error!(target: TARGET, "transport event stream closed before the run completed");
        Err(CoreError::Disconnected)
    }

    /// Handle one transport callback.
    pub async fn handle<D>(&mut self, event: SchedulerEvent, driver: &D) -> Result<Flow, CoreError>
    where
        D: SchedulerDriver + ?Sized,
    {
        event::log_event(&event);

        match event {
            SchedulerEvent::Registered { framework_id, .. } => {
                self.framework_id = Some(framework_id);
                if self.phase == Phase::Unregistered {
                    self.set_phase(Phase::Registered);
                }
                Ok(Flow::Continue)
            }
            SchedulerEvent::Reregistered { .. } => {
                if self.phase == Phase::Unregistered {
                    self.set_phase(Phase::Registered);
                }
                Ok(Flow::Continue)
            }
            SchedulerEvent::ResourceOffers(offers) => {
                if let Err(e) = self.on_offers(offers, driver).await {
                    self.shutdown(driver, true).await;
                    return Err(e);
                }
                Ok(Flow::Continue)
            }
            SchedulerEvent::OfferRescinded(offer_id) => {
                self.on_rescinded(offer_id);
                Ok(Flow::Continue)
            }
            SchedulerEvent::StatusUpdate(status) => self.on_status(status, driver).await,
            SchedulerEvent::Disconnected => {
                self.shutdown(driver, true).await;
                Err(CoreError::Disconnected)
            }
            SchedulerEvent::Error(message) => {
                self.shutdown(driver, true).await;
                Err(CoreError::Transport(message))
            }
            // Lost tasks arrive as `Lost` status updates; these are informational.
            SchedulerEvent::FrameworkMessage { .. }
            | SchedulerEvent::NodeLost(_)
            | SchedulerEvent::ExecutorLost { .. } => Ok(Flow::Continue),
        }
    }

    async fn on_offers<D>(&mut self, offers: Vec<ResourceOffer>, driver: &D) -> Result<(), CoreError>
    where
        D: SchedulerDriver + ?Sized,
    {
        for offer in offers {
            if let Some(pos) = self.rescinded.iter().position(|id| *id == offer.offer_id) {
                self.rescinded.remove(pos);
                debug!(target: TARGET, offer_id = %offer.offer_id, "skipping rescinded offer");
                continue;
            }

            match self.phase {
                Phase::Unregistered | Phase::Terminated => {
                    warn!(target: TARGET, offer_id = %offer.offer_id, phase = ?self.phase, "declining offer: not accepting work");
                    self.decline(&offer.offer_id, driver).await?;
                }
                _ if self.registry.all_launched() => {
                    debug!(target: TARGET, offer_id = %offer.offer_id, "declining offer: all work launched");
                    self.decline(&offer.offer_id, driver).await?;
                }
                _ => {
                    if self.phase == Phase::Registered {
                        self.set_phase(Phase::Offering);
                    }
                    let plan = self.matcher.plan(&offer, self.registry.queued());
                    if plan.is_decline() {
                        debug!(
                            target: TARGET,
                            offer_id = %offer.offer_id,
                            cpus = offer.resources.cpus(),
                            mem = offer.resources.mem(),
                            "declining offer: insufficient resources"
                        );
                        self.decline(&offer.offer_id, driver).await?;
                    } else {
                        self.launch(plan, driver).await?;
                    }
                }
            }
        }

        if self.phase == Phase::Offering && self.registry.all_launched() {
            self.set_phase(Phase::Draining);
        }
        Ok(())
    }

    #[instrument(level = "debug", target = "fleet.core.scheduler", skip_all, fields(offer_id = %plan.offer_id, node_id = %plan.node_id))]
    async fn launch<D>(&mut self, plan: OfferPlan, driver: &D) -> Result<(), CoreError>
    where
        D: SchedulerDriver + ?Sized,
    {
        let mut tasks = Vec::with_capacity(plan.bindings.len());
        for binding in &plan.bindings {
            let descriptor = self.registry.mark_launched(&binding.task_id, &plan.node_id)?;
            let assignment = TaskAssignment {
                task_id: descriptor.task_id.clone(),
                name: descriptor.name(),
                node_id: plan.node_id.clone(),
                executor: self.cfg.executor.clone(),
                resources: binding.resources,
                data: binding.command.clone(),
            };
            info!(
                target: TARGET,
                task = %assignment.name,
                offer_id = %plan.offer_id,
                launched = self.registry.launched(),
                total = self.registry.total(),
                "prepared task for launch"
            );
            tasks.push(assignment);
        }

        info!(
            target: TARGET,
            count = tasks.len(),
            offer_id = %plan.offer_id,
            leftover_cpus = plan.leftover.cpus(),
            leftover_mem = plan.leftover.mem(),
            "launching tasks"
        );
        driver
            .launch_tasks(&plan.offer_id, tasks, self.cfg.filters)
            .await
            .map_err(|e| {
                error!(target: TARGET, offer_id = %plan.offer_id, error = %e, "launch request failed");
                CoreError::from(e)
            })
    }

    async fn decline<D>(&self, offer_id: &OfferId, driver: &D) -> Result<(), CoreError>
    where
        D: SchedulerDriver + ?Sized,
    {
        driver
            .decline_offer(offer_id, self.cfg.filters)
            .await
            .map_err(|e| {
                error!(target: TARGET, %offer_id, error = %e, "decline request failed");
                CoreError::from(e)
            })
    }

    fn on_rescinded(&mut self, offer_id: OfferId) {
        // Already answered, or not delivered yet: remember it so a late delivery is skipped.
        if self.rescinded.len() == RESCINDED_MEMORY {
            self.rescinded.pop_front();
        }
        self.rescinded.push_back(offer_id);
    }

    async fn on_status<D>(&mut self, status: TaskStatus, driver: &D) -> Result<Flow, CoreError>
    where
        D: SchedulerDriver + ?Sized,
    {
        match self.registry.apply_status(&status) {
            StatusOutcome::Progress => Ok(Flow::Continue),
            StatusOutcome::Unknown => {
                warn!(target: TARGET, task_id = %status.task_id, state = %status.state, "status update for unknown task");
                Ok(Flow::Continue)
            }
            StatusOutcome::Ignored { current } => {
                debug!(
                    target: TARGET,
                    task_id = %status.task_id,
                    state = %status.state,
                    %current,
                    "ignoring duplicate or out-of-order status update"
                );
                Ok(Flow::Continue)
            }
            StatusOutcome::Finished => {
                info!(
                    target: TARGET,
                    task_id = %status.task_id,
                    finished = self.registry.finished(),
                    total = self.registry.total(),
                    in_flight = self.registry.in_flight(),
                    "task finished"
                );
                if !self.registry.is_complete() {
                    return Ok(Flow::Continue);
                }
                info!(target: TARGET, "total tasks completed, stopping framework");
                self.shutdown(driver, false).await;
                Ok(Flow::Done)
            }
            StatusOutcome::Failed { attempt, unit } => {
                if self.cfg.retry.should_retry(attempt) {
                    if let Some(retry_id) = self.registry.requeue(&status.task_id) {
                        warn!(
                            target: TARGET,
                            task_id = %status.task_id,
                            state = %status.state,
                            unit,
                            attempt,
                            %retry_id,
                            detail = status.message_or_empty(),
                            "task failed, requeued for retry"
                        );
                        if self.phase == Phase::Draining {
                            self.set_phase(Phase::Offering);
                        }
                        return Ok(Flow::Continue);
                    }
                }

                error!(
                    target: TARGET,
                    task_id = %status.task_id,
                    state = %status.state,
                    detail = status.message_or_empty(),
                    in_flight = self.registry.in_flight(),
                    "aborting because task is in unexpected state"
                );
                self.shutdown(driver, true).await;
                Err(CoreError::ProtocolAbort {
                    task_id: status.task_id,
                    state: status.state,
                    message: status.message.unwrap_or_default(),
                })
            }
        }
    }

    /// Ask the driver to stop; failures here are logged, the run is over either way.
    async fn shutdown<D>(&mut self, driver: &D, abort: bool)
    where
        D: SchedulerDriver + ?Sized,
    {
        self.set_phase(Phase::Terminated);
        let res = if abort {
            driver.abort().await
        } else {
            driver.stop().await
        };
        if let Err(e) = res {
            warn!(target: TARGET, abort, error = %e, "driver did not acknowledge shutdown");
        }
    }

    fn set_phase(&mut self, next: Phase) {
        if self.phase != next {
            debug!(target: TARGET, from = ?self.phase, to = ?next, "scheduler phase change");
            self.phase = next;
        }
    }
}
