//! Synchronization configuration with documented constants
//!
//! All tuning numbers for the ownership/sync/fallback pipeline are
//! collected here with explanations of their purpose and how they
//! interact with each other.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::error::{DroverError, Result};

/// Configuration for the ownership and synchronization subsystem
///
/// These values are plain numeric/boolean settings, not part of the
/// protocol itself. Defaults are tuned for a few thousand agents and a
/// few dozen participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    // === BROADCAST ===
    /// Maximum distance at which a participant receives updates about an
    /// agent's position (world units)
    ///
    /// Larger values increase fan-out cost roughly quadratically in dense
    /// areas: more agents per message AND more recipients per agent.
    pub broadcast_radius: f32,

    /// Minimum participant count before fan-out filtering uses rayon
    ///
    /// Below this threshold, thread overhead exceeds benefits. Each
    /// destination's radius filter is independent, so the split is safe.
    pub parallel_threshold: usize,

    // === OWNERSHIP ===
    /// Seconds of owner silence before a sweep demotes the agent to
    /// unclaimed
    ///
    /// Must cover normal network jitter plus a couple of missed batches;
    /// at a 10 Hz report rate, 3.0 means roughly 30 missed updates.
    pub ownership_timeout_secs: f32,

    /// How often the timeout sweeper runs (seconds)
    ///
    /// Staleness detection latency is timeout + up to one sweep interval.
    pub sweep_interval_secs: f32,

    /// Maximum number of agents one participant may own at once
    ///
    /// Caps the blast radius of a single misbehaving or overloaded
    /// client. Claims and implicit first-writer assignments both count.
    pub max_owned_per_participant: usize,

    // === SOFT BOUNDS ===
    /// Whether reported positions are clamped to the wander radius
    ///
    /// Disabling this trusts owners completely; useful in controlled
    /// tests, never in production.
    pub soft_bounds_enabled: bool,

    /// Wander radius assigned to agents whose spawn parameters omit one
    /// (world units)
    pub default_wander_radius: f32,

    // === FALLBACK SIMULATION ===
    /// Seconds an agent must remain unclaimed before the coordinator
    /// starts simulating it
    ///
    /// Kept above ownership_timeout_secs' sweep latency so a briefly
    /// lagging owner usually reclaims before the coordinator steps in.
    pub fallback_grace_secs: f32,

    /// Fixed timestep of the fallback motion model (seconds)
    ///
    /// Deliberately coarse (~1 Hz). Orphans only need to not freeze;
    /// smoothness is the next owner's job.
    pub fallback_step_secs: f32,

    /// How often the promotion check scans for grace-expired orphans
    /// (seconds)
    ///
    /// Independent of fallback_step_secs by design: promotion timing is
    /// seconds-scale, simulation stepping is sub-Hz.
    pub fallback_check_secs: f32,

    /// Fraction of an agent's configured speed used while
    /// server-simulated (0.0-1.0]
    ///
    /// Reduced speed keeps orphan motion visibly "idle" and cheap to
    /// re-converge when an owner takes over.
    pub fallback_speed_fraction: f32,

    /// Global cap on simultaneously server-simulated agents
    ///
    /// When over capacity, oldest-unclaimed agents are promoted first;
    /// the rest stay frozen until capacity frees up.
    pub fallback_capacity: usize,

    /// Distance below which a wander target counts as reached (world
    /// units)
    pub arrival_epsilon: f32,

    // === AGENT DEFAULTS ===
    /// Movement speed assigned to agents whose spawn parameters omit one
    /// (world units per second)
    pub default_move_speed: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            // Broadcast
            broadcast_radius: 120.0,
            parallel_threshold: 64,

            // Ownership
            ownership_timeout_secs: 3.0,
            sweep_interval_secs: 1.0,
            max_owned_per_participant: 64,

            // Soft bounds
            soft_bounds_enabled: true,
            default_wander_radius: 50.0,

            // Fallback
            fallback_grace_secs: 5.0,
            fallback_step_secs: 1.0,
            fallback_check_secs: 2.0,
            fallback_speed_fraction: 0.4,
            fallback_capacity: 256,
            arrival_epsilon: 0.5,

            // Agent defaults
            default_move_speed: 6.0,
        }
    }
}

impl SyncConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    ///
    /// Missing fields fall back to defaults via serde(default).
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SyncConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.broadcast_radius <= 0.0 {
            return Err(DroverError::Config(format!(
                "broadcast_radius ({}) must be positive",
                self.broadcast_radius
            )));
        }

        if self.ownership_timeout_secs <= 0.0 || self.sweep_interval_secs <= 0.0 {
            return Err(DroverError::Config(
                "ownership timeout and sweep interval must be positive".into(),
            ));
        }

        // Grace below the sweep latency means the coordinator starts
        // simulating agents whose owner merely skipped one sweep.
        if self.fallback_grace_secs < self.sweep_interval_secs {
            return Err(DroverError::Config(format!(
                "fallback_grace_secs ({}) should be >= sweep_interval_secs ({})",
                self.fallback_grace_secs, self.sweep_interval_secs
            )));
        }

        if self.fallback_speed_fraction <= 0.0 || self.fallback_speed_fraction > 1.0 {
            return Err(DroverError::Config(format!(
                "fallback_speed_fraction ({}) must be in (0.0, 1.0]",
                self.fallback_speed_fraction
            )));
        }

        if self.fallback_step_secs <= 0.0 || self.fallback_check_secs <= 0.0 {
            return Err(DroverError::Config(
                "fallback step and check intervals must be positive".into(),
            ));
        }

        if self.default_wander_radius <= 0.0 || self.arrival_epsilon <= 0.0 {
            return Err(DroverError::Config(
                "wander radius and arrival epsilon must be positive".into(),
            ));
        }

        if self.max_owned_per_participant == 0 {
            return Err(DroverError::Config(
                "max_owned_per_participant must be at least 1".into(),
            ));
        }

        Ok(())
    }

    pub fn ownership_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.ownership_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs_f32(self.sweep_interval_secs)
    }

    pub fn fallback_grace(&self) -> Duration {
        Duration::from_secs_f32(self.fallback_grace_secs)
    }

    pub fn fallback_step(&self) -> Duration {
        Duration::from_secs_f32(self.fallback_step_secs)
    }

    pub fn fallback_check(&self) -> Duration {
        Duration::from_secs_f32(self.fallback_check_secs)
    }
}
