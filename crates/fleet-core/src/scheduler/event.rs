use fleet_model::{ExecutorId, FrameworkId, NodeId, OfferId, ResourceOffer, TaskStatus};
use tracing::{debug, error, info, trace, warn};

/// Callbacks delivered by the cluster transport, one at a time.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    Registered {
        framework_id: FrameworkId,
        master: String,
    },
    Reregistered {
        master: String,
    },
    Disconnected,
    ResourceOffers(Vec<ResourceOffer>),
    OfferRescinded(OfferId),
    StatusUpdate(TaskStatus),
    FrameworkMessage {
        executor_id: ExecutorId,
        node_id: NodeId,
        message: String,
    },
    NodeLost(NodeId),
    ExecutorLost {
        executor_id: ExecutorId,
        node_id: NodeId,
        status: i32,
    },
    Error(String),
}

impl SchedulerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerEvent::Registered { .. } => "registered",
            SchedulerEvent::Reregistered { .. } => "reregistered",
            SchedulerEvent::Disconnected => "disconnected",
            SchedulerEvent::ResourceOffers(_) => "resource_offers",
            SchedulerEvent::OfferRescinded(_) => "offer_rescinded",
            SchedulerEvent::StatusUpdate(_) => "status_update",
            SchedulerEvent::FrameworkMessage { .. } => "framework_message",
            SchedulerEvent::NodeLost(_) => "node_lost",
            SchedulerEvent::ExecutorLost { .. } => "executor_lost",
            SchedulerEvent::Error(_) => "error",
        }
    }
}

/// Log line for an incoming event, before it is handled.
pub(crate) fn log_event(event: &SchedulerEvent) {
    const T: &str = "fleet.core.event";
    match event {
        SchedulerEvent::Registered {
            framework_id,
            master,
        } => info!(target: T, %framework_id, master = %master, "scheduler registered with master"),
        SchedulerEvent::Reregistered { master } => {
            info!(target: T, master = %master, "scheduler re-registered with master")
        }
        SchedulerEvent::Disconnected => error!(target: T, "scheduler disconnected from master"),
        SchedulerEvent::ResourceOffers(offers) => {
            for o in offers {
                debug!(
                    target: T,
                    offer_id = %o.offer_id,
                    node_id = %o.node_id,
                    cpus = o.resources.cpus(),
                    mem = o.resources.mem(),
                    "received offer"
                );
            }
        }
        SchedulerEvent::OfferRescinded(offer_id) => {
            debug!(target: T, %offer_id, "offer rescinded")
        }
        SchedulerEvent::StatusUpdate(s) => info!(
            target: T,
            task_id = %s.task_id,
            state = %s.state,
            detail = s.message_or_empty(),
            "status update"
        ),
        SchedulerEvent::FrameworkMessage {
            executor_id,
            node_id,
            message,
        } => trace!(target: T, %executor_id, %node_id, text = %message, "framework message"),
        SchedulerEvent::NodeLost(node_id) => warn!(target: T, %node_id, "node lost"),
        SchedulerEvent::ExecutorLost {
            executor_id,
            node_id,
            status,
        } => warn!(target: T, %executor_id, %node_id, status, "executor lost"),
        SchedulerEvent::Error(message) => error!(target: T, reason = %message, "scheduler received error"),
    }
}
