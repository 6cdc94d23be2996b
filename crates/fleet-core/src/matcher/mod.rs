//! Pure offer-to-task matching.
//!
//! Greedy single-size bin packing: walk the queue in FIFO order and bind tasks while one more
//! task's demand still fits into what is left of the offer. No reordering, no partial
//! allocation, no combining offers. All mutation is left to the caller.
use fleet_model::{NodeId, OfferId, ResourceDemand, ResourceOffer, Resources, TaskDescriptor, TaskId};

/// One queued task bound to an offer.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskBinding {
    pub task_id: TaskId,
    pub command: String,
    pub resources: ResourceDemand,
}

/// Decision for one offer.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferPlan {
    pub offer_id: OfferId,
    pub node_id: NodeId,
    /// Tasks to launch, in queue order.
    pub bindings: Vec<TaskBinding>,
    /// Resources left unused; returned to the manager with the launch.
    pub leftover: Resources,
}

impl OfferPlan {
    /// Nothing fits: the whole offer is declined.
    pub fn is_decline(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OfferMatcher {
    demand: ResourceDemand,
}

impl OfferMatcher {
    pub fn new(demand: ResourceDemand) -> Self {
        Self { demand }
    }

    pub fn demand(&self) -> ResourceDemand {
        self.demand
    }

    /// Bind as many `queued` tasks to `offer` as both resources and the queue allow.
    pub fn plan<'a, I>(&self, offer: &ResourceOffer, queued: I) -> OfferPlan
    where
        I: IntoIterator<Item = &'a TaskDescriptor>,
    {
        let mut remaining = offer.resources.clone();
        let mut bindings = Vec::new();

        for task in queued {
            if !remaining.fits(&self.demand) {
                break;
            }
            remaining.subtract(&self.demand);
            bindings.push(TaskBinding {
                task_id: task.task_id.clone(),
                command: task.command.clone(),
                resources: self.demand,
            });
        }

        OfferPlan {
            offer_id: offer.offer_id.clone(),
            node_id: offer.node_id.clone(),
            bindings,
            leftover: remaining,
        }
    }
}
