//! Per-agent record: pose, lifecycle state, and write authority
//!
//! One `AgentRecord` exists per active agent. Position and orientation are
//! mutated by whichever subsystem currently holds write authority (the
//! owning participant via the sync pipeline, or the fallback simulator).
//! Health and lifecycle fields are coordinator-owned and never written by
//! the sync pipeline.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::core::types::{AgentId, Orientation, ParticipantId};

/// Behavior mode an agent's owner runs locally
///
/// The coordinator never executes these; the mode is part of the immutable
/// config snapshot so a new owner knows what motion profile to resume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BehaviorMode {
    #[default]
    IdleWander,
    Pursue,
    Strafe,
    Flee,
}

/// Immutable per-agent configuration, snapshotted at spawn
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Movement speed in world units per second
    pub move_speed: f32,
    /// Behavior mode the owner's local motion logic runs
    pub behavior: BehaviorMode,
}

/// Who is currently allowed to advance this agent's position.
///
/// This field is the single point of truth for the one-writer guarantee:
/// every transition happens under the agent's lock, so ownership and
/// fallback simulation can never both be active. Explicit claims and
/// implicit claim-on-first-update are just two edges into `Owned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAuthority {
    /// Nobody is simulating the agent
    Unclaimed { since: Instant },
    /// A participant holds the lease and streams position updates
    Owned {
        owner: ParticipantId,
        last_update: Instant,
    },
    /// The coordinator's fallback simulator is advancing the agent
    ServerSimulated,
}

/// Shared mutable state for one agent
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub id: AgentId,
    /// Last-known world pose
    pub position: Vec3,
    pub orientation: Orientation,
    /// Coordinator-authoritative regardless of who owns position
    pub health: f32,
    pub max_health: f32,
    pub is_alive: bool,
    /// Immutable bounds for soft-bounds clamping and fallback wander
    pub spawn_position: Vec3,
    pub max_wander_radius: f32,
    /// Immutable snapshot taken at creation
    pub config: AgentConfig,
    /// One-way flag; once set, no further mutation is permitted
    pub cleaned_up: bool,
    pub authority: WriteAuthority,
}

impl AgentRecord {
    pub fn new(
        id: AgentId,
        position: Vec3,
        max_wander_radius: f32,
        max_health: f32,
        config: AgentConfig,
        now: Instant,
    ) -> Self {
        Self {
            id,
            position,
            orientation: Orientation::default(),
            health: max_health,
            max_health,
            is_alive: true,
            spawn_position: position,
            max_wander_radius,
            config,
            cleaned_up: false,
            authority: WriteAuthority::Unclaimed { since: now },
        }
    }

    /// Current owner, if any
    pub fn owner(&self) -> Option<ParticipantId> {
        match self.authority {
            WriteAuthority::Owned { owner, .. } => Some(owner),
            _ => None,
        }
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self.authority, WriteAuthority::Owned { .. })
    }

    pub fn is_server_simulated(&self) -> bool {
        matches!(self.authority, WriteAuthority::ServerSimulated)
    }

    /// True when the record may still be mutated at all
    pub fn is_mutable(&self) -> bool {
        !self.cleaned_up && self.is_alive
    }
}
