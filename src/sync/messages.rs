//! Wire messages for the position-update pipeline

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::types::{AgentId, Orientation};

/// One agent's pose, as reported by an owner or fanned out to observers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentPose {
    pub agent: AgentId,
    pub position: Vec3,
    /// Absent orientation leaves the stored one untouched
    pub orientation: Option<Orientation>,
}

/// Inbound batch from one participant, in receipt order.
///
/// Ephemeral: merged into agent records and converted into an outbound
/// broadcast set, then discarded.
pub type PendingUpdateBatch = Vec<AgentPose>;

/// An agent that lost its owner, with its last-known position so
/// participants can prioritize which orphans to pick up by proximity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrphanNotice {
    pub agent: AgentId,
    pub last_position: Vec3,
}

/// Messages delivered to participants
///
/// Always batched: one `PositionBatch` per destination per tick, one
/// `OrphanAnnouncement` per sweep. The design forbids one message per
/// agent; naive fan-out was the dominant cost this subsystem exists to
/// eliminate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboundMessage {
    PositionBatch { updates: Vec<AgentPose> },
    OrphanAnnouncement { orphans: Vec<OrphanNotice> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_message_json_shape() {
        let msg = OutboundMessage::PositionBatch {
            updates: vec![AgentPose {
                agent: AgentId(Uuid::nil()),
                position: Vec3::new(1.0, 2.0, 3.0),
                orientation: Some(Orientation::new(0.5, 0.0)),
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: OutboundMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
