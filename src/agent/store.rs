//! Agent store: shared mutable state with per-agent locking
//!
//! The store maps agent ids to individually locked records. Independent
//! agents have no cross-agent invariant, so fine-grained per-agent locks
//! let inbound batches, the timeout sweeper, and the fallback simulator
//! proceed without a single global lock. Every subsystem that reads or
//! writes ownership or position goes through the same slot mutex.

use ahash::AHashMap;
use glam::Vec3;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;

use crate::agent::record::{AgentConfig, AgentRecord, BehaviorMode};
use crate::core::config::SyncConfig;
use crate::core::types::AgentId;

/// Spawn parameters supplied by the external spawning component
#[derive(Debug, Clone)]
pub struct SpawnParams {
    pub position: Vec3,
    /// Falls back to `SyncConfig::default_wander_radius` when omitted
    pub wander_radius: Option<f32>,
    /// Falls back to config defaults when omitted
    pub config: Option<AgentConfig>,
    pub max_health: f32,
}

impl SpawnParams {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            wander_radius: None,
            config: None,
            max_health: 100.0,
        }
    }
}

/// One lockable slot per agent
pub type AgentSlot = Arc<Mutex<AgentRecord>>;

/// Lock a slot, recovering the guard if a panicking writer poisoned it.
///
/// Record invariants are single-field transitions; a poisoned lock never
/// leaves a half-written record behind.
pub fn lock_slot(slot: &AgentSlot) -> MutexGuard<'_, AgentRecord> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The authoritative collection of agent records
pub struct AgentStore {
    agents: RwLock<AHashMap<AgentId, AgentSlot>>,
    config: Arc<SyncConfig>,
}

impl AgentStore {
    pub fn new(config: Arc<SyncConfig>) -> Self {
        Self {
            agents: RwLock::new(AHashMap::new()),
            config,
        }
    }

    /// Create a record for a newly spawned agent
    pub fn spawn(&self, params: SpawnParams) -> AgentId {
        let id = AgentId::new();
        let wander_radius = params
            .wander_radius
            .unwrap_or(self.config.default_wander_radius);
        let agent_config = params.config.unwrap_or(AgentConfig {
            move_speed: self.config.default_move_speed,
            behavior: BehaviorMode::IdleWander,
        });
        let record = AgentRecord::new(
            id,
            params.position,
            wander_radius,
            params.max_health,
            agent_config,
            Instant::now(),
        );

        let mut agents = self.agents.write().unwrap_or_else(|p| p.into_inner());
        agents.insert(id, Arc::new(Mutex::new(record)));
        tracing::debug!(agent = %id, pos = ?params.position, "agent spawned");
        id
    }

    /// Look up an agent's slot
    ///
    /// `None` means the agent vanished (concurrent destruction); callers
    /// treat that as a no-op for the current operation.
    pub fn get(&self, agent: AgentId) -> Option<AgentSlot> {
        let agents = self.agents.read().unwrap_or_else(|p| p.into_inner());
        agents.get(&agent).cloned()
    }

    pub fn contains(&self, agent: AgentId) -> bool {
        let agents = self.agents.read().unwrap_or_else(|p| p.into_inner());
        agents.contains_key(&agent)
    }

    pub fn len(&self) -> usize {
        let agents = self.agents.read().unwrap_or_else(|p| p.into_inner());
        agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all slots for iteration
    ///
    /// Collected up front so background scans never hold the outer map
    /// lock while taking per-agent locks.
    pub fn slots(&self) -> Vec<(AgentId, AgentSlot)> {
        let agents = self.agents.read().unwrap_or_else(|p| p.into_inner());
        agents.iter().map(|(id, s)| (*id, s.clone())).collect()
    }

    /// Remove an agent, marking the record cleaned up first
    ///
    /// Any task still holding the slot sees the flag and stops mutating.
    pub fn remove(&self, agent: AgentId) -> bool {
        let slot = {
            let mut agents = self.agents.write().unwrap_or_else(|p| p.into_inner());
            agents.remove(&agent)
        };
        match slot {
            Some(slot) => {
                let mut record = lock_slot(&slot);
                record.cleaned_up = true;
                tracing::debug!(agent = %agent, "agent removed");
                true
            }
            None => false,
        }
    }

    // === Coordinator-owned health ops ===
    // These are the only write paths for health/lifecycle fields; the
    // sync pipeline never touches them.

    /// Apply damage; returns the agent's health afterwards, or `None` if
    /// the agent is gone or already cleaned up
    pub fn apply_damage(&self, agent: AgentId, amount: f32) -> Option<f32> {
        let slot = self.get(agent)?;
        let mut record = lock_slot(&slot);
        if record.cleaned_up || !record.is_alive {
            return None;
        }
        record.health = (record.health - amount).max(0.0);
        if record.health <= 0.0 {
            record.is_alive = false;
            tracing::info!(agent = %agent, "agent died");
        }
        Some(record.health)
    }

    pub fn heal(&self, agent: AgentId, amount: f32) -> Option<f32> {
        let slot = self.get(agent)?;
        let mut record = lock_slot(&slot);
        if record.cleaned_up || !record.is_alive {
            return None;
        }
        record.health = (record.health + amount).min(record.max_health);
        Some(record.health)
    }

    pub fn kill(&self, agent: AgentId) -> bool {
        self.apply_damage(agent, f32::MAX).is_some()
    }

    /// Read-only snapshot of one record
    pub fn snapshot(&self, agent: AgentId) -> Option<AgentRecord> {
        let slot = self.get(agent)?;
        let record = lock_slot(&slot);
        Some(record.clone())
    }
}
