//! Distance-scoped, batched fan-out of accepted position updates
//!
//! Updates accepted in a processing tick are delivered only to
//! participants close enough to plausibly observe the agent, as exactly
//! one batched message per destination. Sends go through unbounded
//! channels so a slow destination never blocks the caller.
//!
//! Per-destination filtering is independent, so fan-out uses rayon above
//! a participant-count threshold and stays sequential below it where
//! thread overhead would dominate.

use ahash::AHashMap;
use glam::Vec3;
use rayon::prelude::*;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::core::config::SyncConfig;
use crate::core::error::{DroverError, Result};
use crate::core::types::{planar_distance, ParticipantId};
use crate::sync::messages::{AgentPose, OrphanNotice, OutboundMessage};

struct ParticipantEntry {
    /// Fan-out reference point; `None` until the participant has spawned
    /// into the world, during which it receives no position batches
    reference: Option<Vec3>,
    /// Per-participant override of the configured broadcast radius
    radius_override: Option<f32>,
    sender: UnboundedSender<OutboundMessage>,
}

/// Roster of connected participants and the fan-out logic
pub struct SyncBroadcaster {
    config: Arc<SyncConfig>,
    roster: Mutex<AHashMap<ParticipantId, ParticipantEntry>>,
}

impl SyncBroadcaster {
    pub fn new(config: Arc<SyncConfig>) -> Self {
        Self {
            config,
            roster: Mutex::new(AHashMap::new()),
        }
    }

    /// Register a participant; the returned receiver carries its
    /// outbound messages
    pub fn connect(&self, participant: ParticipantId) -> UnboundedReceiver<OutboundMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut roster = self.roster.lock().unwrap_or_else(|p| p.into_inner());
        roster.insert(
            participant,
            ParticipantEntry {
                reference: None,
                radius_override: None,
                sender,
            },
        );
        tracing::info!(%participant, "participant connected");
        receiver
    }

    pub fn disconnect(&self, participant: ParticipantId) -> bool {
        let mut roster = self.roster.lock().unwrap_or_else(|p| p.into_inner());
        let removed = roster.remove(&participant).is_some();
        if removed {
            tracing::info!(%participant, "participant disconnected");
        }
        removed
    }

    pub fn is_connected(&self, participant: ParticipantId) -> bool {
        let roster = self.roster.lock().unwrap_or_else(|p| p.into_inner());
        roster.contains_key(&participant)
    }

    pub fn participant_count(&self) -> usize {
        let roster = self.roster.lock().unwrap_or_else(|p| p.into_inner());
        roster.len()
    }

    /// Update a participant's fan-out reference point (its own pose)
    pub fn set_reference(&self, participant: ParticipantId, position: Vec3) -> Result<()> {
        let mut roster = self.roster.lock().unwrap_or_else(|p| p.into_inner());
        let entry = roster
            .get_mut(&participant)
            .ok_or(DroverError::ParticipantNotFound(participant))?;
        entry.reference = Some(position);
        Ok(())
    }

    pub fn set_radius_override(
        &self,
        participant: ParticipantId,
        radius: Option<f32>,
    ) -> Result<()> {
        let mut roster = self.roster.lock().unwrap_or_else(|p| p.into_inner());
        let entry = roster
            .get_mut(&participant)
            .ok_or(DroverError::ParticipantNotFound(participant))?;
        entry.radius_override = radius;
        Ok(())
    }

    /// Fan an accepted update set out to every eligible destination.
    ///
    /// The originating participant never receives its own echo, and each
    /// destination gets at most one message containing only the updates
    /// within its broadcast radius.
    pub fn broadcast_updates(&self, origin: ParticipantId, accepted: &[AgentPose]) {
        if accepted.is_empty() {
            return;
        }

        // Snapshot the roster so filtering happens without the lock held
        let destinations: Vec<(ParticipantId, Vec3, f32, UnboundedSender<OutboundMessage>)> = {
            let roster = self.roster.lock().unwrap_or_else(|p| p.into_inner());
            roster
                .iter()
                .filter(|(id, _)| **id != origin)
                .filter_map(|(id, entry)| {
                    let reference = entry.reference?;
                    let radius = entry.radius_override.unwrap_or(self.config.broadcast_radius);
                    Some((*id, reference, radius, entry.sender.clone()))
                })
                .collect()
        };

        let batches: Vec<(ParticipantId, UnboundedSender<OutboundMessage>, Vec<AgentPose>)> =
            if destinations.len() >= self.config.parallel_threshold {
                destinations
                    .into_par_iter()
                    .map(|(id, reference, radius, sender)| {
                        (id, sender, in_radius(accepted, reference, radius))
                    })
                    .collect()
            } else {
                destinations
                    .into_iter()
                    .map(|(id, reference, radius, sender)| {
                        (id, sender, in_radius(accepted, reference, radius))
                    })
                    .collect()
            };

        for (id, sender, updates) in batches {
            if updates.is_empty() {
                continue;
            }
            let count = updates.len();
            if sender.send(OutboundMessage::PositionBatch { updates }).is_err() {
                tracing::debug!(participant = %id, "dropping batch for closed channel");
            } else {
                tracing::trace!(participant = %id, count, "position batch sent");
            }
        }
    }

    /// Announce newly orphaned agents to all participants as one batched
    /// message each
    pub fn broadcast_orphans(&self, orphans: &[OrphanNotice]) {
        if orphans.is_empty() {
            return;
        }
        let roster = self.roster.lock().unwrap_or_else(|p| p.into_inner());
        for (id, entry) in roster.iter() {
            let msg = OutboundMessage::OrphanAnnouncement {
                orphans: orphans.to_vec(),
            };
            if entry.sender.send(msg).is_err() {
                tracing::debug!(participant = %id, "dropping orphan announcement for closed channel");
            }
        }
    }
}

fn in_radius(accepted: &[AgentPose], reference: Vec3, radius: f32) -> Vec<AgentPose> {
    accepted
        .iter()
        .filter(|pose| planar_distance(pose.position, reference) <= radius)
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AgentId;

    fn pose(x: f32, z: f32) -> AgentPose {
        AgentPose {
            agent: AgentId::new(),
            position: Vec3::new(x, 0.0, z),
            orientation: None,
        }
    }

    #[test]
    fn test_in_radius_filters_planar() {
        let updates = vec![pose(0.0, 0.0), pose(50.0, 0.0), pose(300.0, 0.0)];
        let near = in_radius(&updates, Vec3::ZERO, 100.0);
        assert_eq!(near.len(), 2);
    }

    #[test]
    fn test_no_reference_no_messages() {
        let broadcaster = SyncBroadcaster::new(Arc::new(SyncConfig::default()));
        let origin = ParticipantId::new();
        let observer = ParticipantId::new();
        broadcaster.connect(origin);
        let mut rx = broadcaster.connect(observer);
        // Observer has no reference point yet
        broadcaster.broadcast_updates(origin, &[pose(0.0, 0.0)]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_orphans_reach_everyone() {
        let broadcaster = SyncBroadcaster::new(Arc::new(SyncConfig::default()));
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        let mut rx_a = broadcaster.connect(a);
        let mut rx_b = broadcaster.connect(b);
        let orphans = vec![OrphanNotice {
            agent: AgentId::new(),
            last_position: Vec3::ZERO,
        }];
        broadcaster.broadcast_orphans(&orphans);
        assert!(matches!(
            rx_a.try_recv().unwrap(),
            OutboundMessage::OrphanAnnouncement { .. }
        ));
        assert!(matches!(
            rx_b.try_recv().unwrap(),
            OutboundMessage::OrphanAnnouncement { .. }
        ));
    }
}
