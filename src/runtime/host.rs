//! Simulation host: the facade collaborators talk to
//!
//! Wires the store, ownership registry, broadcaster, and fallback
//! simulator together, and owns the batch entry point that drives the
//! whole pipeline: owner sample -> ownership validation -> soft-bounds
//! correction -> record update -> distance-scoped fan-out.

use glam::Vec3;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::agent::store::{AgentStore, SpawnParams};
use crate::core::config::SyncConfig;
use crate::core::error::Result;
use crate::core::types::{AgentId, ParticipantId};
use crate::fallback::FallbackSimulator;
use crate::ownership::OwnershipRegistry;
use crate::runtime::sweeper::TimeoutSweeper;
use crate::sync::messages::{AgentPose, OrphanNotice, OutboundMessage, PendingUpdateBatch};
use crate::sync::SyncBroadcaster;

pub struct SimulationHost {
    config: Arc<SyncConfig>,
    store: Arc<AgentStore>,
    fallback: Arc<FallbackSimulator>,
    registry: Arc<OwnershipRegistry>,
    broadcaster: Arc<SyncBroadcaster>,
}

impl SimulationHost {
    pub fn new(config: SyncConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let store = Arc::new(AgentStore::new(config.clone()));
        let fallback = Arc::new(FallbackSimulator::new(store.clone(), config.clone(), seed));
        let registry = Arc::new(OwnershipRegistry::new(
            store.clone(),
            fallback.clone(),
            config.clone(),
        ));
        let broadcaster = Arc::new(SyncBroadcaster::new(config.clone()));
        Ok(Self {
            config,
            store,
            fallback,
            registry,
            broadcaster,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &AgentStore {
        &self.store
    }

    pub fn fallback(&self) -> &FallbackSimulator {
        &self.fallback
    }

    pub fn registry(&self) -> &OwnershipRegistry {
        &self.registry
    }

    pub fn broadcaster(&self) -> &SyncBroadcaster {
        &self.broadcaster
    }

    // === Agent lifecycle (spawning collaborator interface) ===

    pub fn spawn_agent(&self, params: SpawnParams) -> AgentId {
        self.store.spawn(params)
    }

    pub fn remove_agent(&self, agent: AgentId) -> bool {
        self.registry.on_agent_removed(agent);
        self.fallback.on_reclaimed(agent);
        self.store.remove(agent)
    }

    // === Participant lifecycle ===

    pub fn connect(&self, participant: ParticipantId) -> UnboundedReceiver<OutboundMessage> {
        self.broadcaster.connect(participant)
    }

    /// Graceful or detected disconnect: every agent the participant owns
    /// is released and announced in one orphan batch
    pub fn disconnect(&self, participant: ParticipantId) {
        let orphans = self.registry.release_all(participant);
        if !orphans.is_empty() {
            let notices: Vec<OrphanNotice> = orphans
                .into_iter()
                .map(|(agent, last_position)| OrphanNotice {
                    agent,
                    last_position,
                })
                .collect();
            self.broadcaster.broadcast_orphans(&notices);
        }
        self.broadcaster.disconnect(participant);
    }

    /// Participant reports its own pose, used as its fan-out reference
    pub fn update_participant_reference(
        &self,
        participant: ParticipantId,
        position: Vec3,
    ) -> Result<()> {
        self.broadcaster.set_reference(participant, position)
    }

    /// Per-participant override of the configured broadcast radius;
    /// `None` restores the default
    pub fn set_participant_radius(
        &self,
        participant: ParticipantId,
        radius: Option<f32>,
    ) -> Result<()> {
        self.broadcaster.set_radius_override(participant, radius)
    }

    // === Ownership protocol ===

    pub fn claim(&self, participant: ParticipantId, agent: AgentId) -> bool {
        self.registry.claim(participant, agent)
    }

    pub fn release(&self, participant: ParticipantId, agent: AgentId) {
        if let Some(last_position) = self.registry.release(participant, agent) {
            self.broadcaster.broadcast_orphans(&[OrphanNotice {
                agent,
                last_position,
            }]);
        }
    }

    pub fn get_owner(&self, agent: AgentId) -> Option<ParticipantId> {
        self.registry.get_owner(agent)
    }

    pub fn is_claimed(&self, agent: AgentId) -> bool {
        self.registry.is_claimed(agent)
    }

    // === High-frequency entry point ===

    /// Process one inbound position batch from a participant.
    ///
    /// Entries are applied in receipt order. A malformed or stale entry
    /// (unknown agent, non-finite position, agent owned by someone else)
    /// is skipped without rejecting the rest of the batch. Accepted
    /// entries are fanned out as one message per nearby destination.
    /// Returns how many entries were accepted.
    pub fn submit_position_batch(
        &self,
        participant: ParticipantId,
        batch: PendingUpdateBatch,
    ) -> usize {
        self.submit_position_batch_at(participant, batch, Instant::now())
    }

    pub fn submit_position_batch_at(
        &self,
        participant: ParticipantId,
        batch: PendingUpdateBatch,
        now: Instant,
    ) -> usize {
        let mut accepted: Vec<AgentPose> = Vec::with_capacity(batch.len());
        for entry in batch {
            let stored = self.registry.accept_update_at(
                participant,
                entry.agent,
                entry.position,
                entry.orientation,
                now,
            );
            if let Some(position) = stored {
                accepted.push(AgentPose {
                    agent: entry.agent,
                    position,
                    orientation: entry.orientation,
                });
            }
        }
        if !accepted.is_empty() {
            self.broadcaster.broadcast_updates(participant, &accepted);
        }
        accepted.len()
    }

    // === Background tasks ===

    /// Spawn the timeout sweeper and fallback driver on the current tokio
    /// runtime
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let sweeper = Arc::new(TimeoutSweeper::new(
            self.registry.clone(),
            self.broadcaster.clone(),
            self.config.clone(),
        ));
        vec![
            tokio::spawn(sweeper.run()),
            tokio::spawn(self.fallback.clone().run()),
        ]
    }
}
