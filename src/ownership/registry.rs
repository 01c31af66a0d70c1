//! Ownership registry: single-writer-per-agent under failing writers
//!
//! One state machine per agent (`WriteAuthority`) with two entry edges
//! into `Owned`: an explicit claim, and an implicit first-writer-wins
//! assignment when an update arrives for an unclaimed agent. Both edges
//! run under the same per-agent lock, so they cannot race into
//! inconsistent state. Rejected claims and dropped updates are expected
//! steady-state outcomes, not errors; callers observe a boolean and move
//! on.

use ahash::AHashMap;
use glam::Vec3;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::agent::store::{lock_slot, AgentStore};
use crate::agent::WriteAuthority;
use crate::core::config::SyncConfig;
use crate::core::types::{is_finite_pos, AgentId, Orientation, ParticipantId};
use crate::fallback::FallbackSimulator;
use crate::ownership::bounds::clamp_to_wander_radius;

/// Authoritative map of agent ownership plus the claim/release/timeout
/// state machine
pub struct OwnershipRegistry {
    store: Arc<AgentStore>,
    fallback: Arc<FallbackSimulator>,
    config: Arc<SyncConfig>,
    /// Agents currently owned, per participant. Guarded separately from
    /// the slots; lock order is always slot first, then this ledger.
    owned_counts: Mutex<AHashMap<ParticipantId, usize>>,
}

impl OwnershipRegistry {
    pub fn new(
        store: Arc<AgentStore>,
        fallback: Arc<FallbackSimulator>,
        config: Arc<SyncConfig>,
    ) -> Self {
        Self {
            store,
            fallback,
            config,
            owned_counts: Mutex::new(AHashMap::new()),
        }
    }

    /// Explicitly claim an agent for a participant
    ///
    /// Fails when the agent is missing/dead, owned by a different
    /// participant, or the claimant is at its ownership cap. Success on
    /// an agent the participant already owns just refreshes the lease.
    pub fn claim(&self, participant: ParticipantId, agent: AgentId) -> bool {
        self.claim_at(participant, agent, Instant::now())
    }

    pub fn claim_at(&self, participant: ParticipantId, agent: AgentId, now: Instant) -> bool {
        let Some(slot) = self.store.get(agent) else {
            tracing::debug!(%participant, %agent, "claim denied: unknown agent");
            return false;
        };
        let mut record = lock_slot(&slot);
        if !record.is_mutable() {
            tracing::debug!(%participant, %agent, "claim denied: agent dead or cleaned up");
            return false;
        }

        match record.authority {
            WriteAuthority::Owned { owner, .. } if owner != participant => {
                tracing::debug!(%participant, %agent, %owner, "claim denied: already owned");
                false
            }
            WriteAuthority::Owned { .. } => {
                // Re-claim by the current owner refreshes the lease
                record.authority = WriteAuthority::Owned {
                    owner: participant,
                    last_update: now,
                };
                true
            }
            WriteAuthority::Unclaimed { .. } | WriteAuthority::ServerSimulated => {
                if !self.try_take_slot(participant) {
                    tracing::debug!(%participant, %agent, "claim denied: ownership cap reached");
                    return false;
                }
                let was_simulated = record.is_server_simulated();
                record.authority = WriteAuthority::Owned {
                    owner: participant,
                    last_update: now,
                };
                drop(record);
                // Reclaim precedence: leave the fallback set in the same
                // logical step as the ownership transition
                self.fallback.on_reclaimed(agent);
                if was_simulated {
                    tracing::debug!(%participant, %agent, "claimed agent away from fallback");
                }
                true
            }
        }
    }

    /// Release an agent; no-op unless the caller is the current owner.
    ///
    /// Returns the agent's last-known position so the caller can fold it
    /// into an orphan announcement.
    pub fn release(&self, participant: ParticipantId, agent: AgentId) -> Option<Vec3> {
        self.release_at(participant, agent, Instant::now())
    }

    pub fn release_at(
        &self,
        participant: ParticipantId,
        agent: AgentId,
        now: Instant,
    ) -> Option<Vec3> {
        let slot = self.store.get(agent)?;
        let mut record = lock_slot(&slot);
        match record.authority {
            WriteAuthority::Owned { owner, .. } if owner == participant => {
                record.authority = WriteAuthority::Unclaimed { since: now };
                let position = record.position;
                drop(record);
                self.release_slot(participant);
                self.fallback.on_unclaimed(agent);
                tracing::debug!(%participant, %agent, "ownership released");
                Some(position)
            }
            _ => None,
        }
    }

    /// Release everything a participant owns (disconnect path).
    ///
    /// Returns the orphan batch for a single announcement.
    pub fn release_all(&self, participant: ParticipantId) -> Vec<(AgentId, Vec3)> {
        self.release_all_at(participant, Instant::now())
    }

    pub fn release_all_at(
        &self,
        participant: ParticipantId,
        now: Instant,
    ) -> Vec<(AgentId, Vec3)> {
        let mut orphans = Vec::new();
        for (id, slot) in self.store.slots() {
            let mut record = lock_slot(&slot);
            if let WriteAuthority::Owned { owner, .. } = record.authority {
                if owner == participant {
                    record.authority = WriteAuthority::Unclaimed { since: now };
                    let position = record.position;
                    drop(record);
                    self.release_slot(participant);
                    self.fallback.on_unclaimed(id);
                    orphans.push((id, position));
                }
            }
        }
        if !orphans.is_empty() {
            tracing::info!(%participant, count = orphans.len(), "released all owned agents");
        }
        orphans
    }

    /// Process one position sample from a participant
    ///
    /// Implicitly claims the agent when unowned (first-writer-wins); a
    /// sample for an agent owned by someone else is silently dropped.
    /// Returns the stored (possibly clamped) position on acceptance so
    /// the caller can queue a broadcast.
    pub fn accept_update(
        &self,
        participant: ParticipantId,
        agent: AgentId,
        position: Vec3,
        orientation: Option<Orientation>,
    ) -> bool {
        self.accept_update_at(participant, agent, position, orientation, Instant::now())
            .is_some()
    }

    pub fn accept_update_at(
        &self,
        participant: ParticipantId,
        agent: AgentId,
        position: Vec3,
        orientation: Option<Orientation>,
        now: Instant,
    ) -> Option<Vec3> {
        if !is_finite_pos(position) {
            tracing::debug!(%participant, %agent, "update dropped: non-finite position");
            return None;
        }
        let slot = self.store.get(agent)?;
        let mut record = lock_slot(&slot);
        if !record.is_mutable() {
            return None;
        }

        match record.authority {
            WriteAuthority::Owned { owner, .. } if owner != participant => {
                // Sole conflict-resolution rule: no merging, no voting
                tracing::debug!(%participant, %agent, %owner, "update dropped: owned by another");
                return None;
            }
            WriteAuthority::Owned { .. } => {}
            WriteAuthority::Unclaimed { .. } | WriteAuthority::ServerSimulated => {
                // Implicit claim-on-accept, same cap as explicit claims
                if !self.try_take_slot(participant) {
                    tracing::debug!(%participant, %agent, "update dropped: ownership cap reached");
                    return None;
                }
                self.fallback.on_reclaimed(agent);
            }
        }

        let stored = if self.config.soft_bounds_enabled {
            clamp_to_wander_radius(position, record.spawn_position, record.max_wander_radius)
        } else {
            position
        };
        record.position = stored;
        if let Some(orientation) = orientation {
            record.orientation = orientation;
        }
        record.authority = WriteAuthority::Owned {
            owner: participant,
            last_update: now,
        };
        Some(stored)
    }

    /// Demote every owner that has gone silent past the deadline.
    ///
    /// Each removal behaves exactly like an explicit release. Returns the
    /// orphan batch (id + last-known position) for one batched
    /// announcement.
    pub fn sweep_timeouts(&self, now: Instant, deadline: Duration) -> Vec<(AgentId, Vec3)> {
        let mut orphans = Vec::new();
        for (id, slot) in self.store.slots() {
            let mut record = lock_slot(&slot);
            if let WriteAuthority::Owned { owner, last_update } = record.authority {
                let stale = now
                    .checked_duration_since(last_update)
                    .map(|age| age > deadline)
                    .unwrap_or(false);
                if stale {
                    record.authority = WriteAuthority::Unclaimed { since: now };
                    let alive = record.is_alive && !record.cleaned_up;
                    let position = record.position;
                    drop(record);
                    self.release_slot(owner);
                    self.fallback.on_unclaimed(id);
                    tracing::debug!(%owner, agent = %id, "ownership timed out");
                    if alive {
                        orphans.push((id, position));
                    }
                }
            }
        }
        orphans
    }

    /// Clear ownership for an agent leaving the world (death cleanup or
    /// explicit destroy).
    ///
    /// Returns the owner's capacity slot before the record is dropped
    /// from the store; without this the slot would stay burned forever,
    /// since a removed agent is invisible to the timeout sweep.
    pub fn on_agent_removed(&self, agent: AgentId) {
        let Some(slot) = self.store.get(agent) else {
            return;
        };
        let mut record = lock_slot(&slot);
        if let WriteAuthority::Owned { owner, .. } = record.authority {
            record.authority = WriteAuthority::Unclaimed {
                since: Instant::now(),
            };
            drop(record);
            self.release_slot(owner);
            tracing::debug!(%owner, %agent, "ownership cleared on removal");
        }
    }

    pub fn get_owner(&self, agent: AgentId) -> Option<ParticipantId> {
        let slot = self.store.get(agent)?;
        let record = lock_slot(&slot);
        record.owner()
    }

    pub fn is_claimed(&self, agent: AgentId) -> bool {
        self.get_owner(agent).is_some()
    }

    /// How many agents a participant currently owns
    pub fn owned_count(&self, participant: ParticipantId) -> usize {
        let counts = self.owned_counts.lock().unwrap_or_else(|p| p.into_inner());
        counts.get(&participant).copied().unwrap_or(0)
    }

    /// Reserve one ownership slot, honoring the per-participant cap
    fn try_take_slot(&self, participant: ParticipantId) -> bool {
        let mut counts = self.owned_counts.lock().unwrap_or_else(|p| p.into_inner());
        let count = counts.entry(participant).or_insert(0);
        if *count >= self.config.max_owned_per_participant {
            return false;
        }
        *count += 1;
        true
    }

    fn release_slot(&self, participant: ParticipantId) {
        let mut counts = self.owned_counts.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(count) = counts.get_mut(&participant) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&participant);
            }
        }
    }
}
