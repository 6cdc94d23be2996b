use std::time::{Duration, Instant};

use tokio::{sync::mpsc, task::JoinHandle};

use fleet_exec::{ExecutorEvent, ExecutorStats};
use fleet_model::{Filters, NodeId, OfferId, ResourceDemand, Resources};

/// Refusals too long to represent end a year out.
const FOREVER: Duration = Duration::from_secs(365 * 24 * 3600);

pub(super) struct ExecutorSlot {
    pub tx: mpsc::Sender<ExecutorEvent>,
    pub handle: JoinHandle<ExecutorStats>,
}

pub(super) struct Node {
    pub id: NodeId,
    /// Resources not reserved by running tasks.
    pub free: Resources,
    pub refuse_until: Option<Instant>,
    pub outstanding: Option<OfferId>,
    pub executor: Option<ExecutorSlot>,
}

impl Node {
    pub fn new(id: NodeId, resources: Resources) -> Self {
        Self {
            id,
            free: resources,
            refuse_until: None,
            outstanding: None,
            executor: None,
        }
    }

    pub fn offerable(&self, now: Instant) -> bool {
        self.outstanding.is_none()
            && self.refuse_until.is_none_or(|until| until <= now)
            && !self.free.is_empty()
    }

    /// The offer was answered: clear it and start the refusal window.
    pub fn answered(&mut self, filters: Filters, now: Instant) {
        self.outstanding = None;
        let window = filters.refuse_duration();
        self.refuse_until = Some(
            now.checked_add(window)
                .unwrap_or_else(|| now + FOREVER),
        );
    }

    pub fn reserve(&mut self, demand: &ResourceDemand) {
        self.free.subtract(demand);
    }

    pub fn release(&mut self, demand: &ResourceDemand) {
        self.free.add(demand);
    }
}

pub(super) struct PendingOffer {
    pub node_id: NodeId,
    pub resources: Resources,
    pub issued: Instant,
}

pub(super) struct Allocation {
    pub node_id: NodeId,
    pub demand: ResourceDemand,
}
