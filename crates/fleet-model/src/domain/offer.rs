use serde::{Deserialize, Serialize};

use crate::{NodeId, OfferId, Resources};

/// Snapshot of resources a node is willing to lend.
///
/// Consumed exactly once by the scheduler (launched against or declined), or invalidated by a rescind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOffer {
    pub offer_id: OfferId,
    pub node_id: NodeId,
    pub resources: Resources,
}

impl ResourceOffer {
    pub fn new(offer_id: impl Into<OfferId>, node_id: impl Into<NodeId>, resources: Resources) -> Self {
        Self {
            offer_id: offer_id.into(),
            node_id: node_id.into(),
            resources,
        }
    }
}
