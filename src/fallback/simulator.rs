//! Fallback simulation for orphaned agents
//!
//! Guarantees liveness for agents nobody is simulating, at minimal cost.
//! A periodic check promotes agents that have been unclaimed past a grace
//! period into server-simulated motion; promoted agents are advanced on a
//! fixed, low-frequency timestep with a trivial steering model: pick a
//! random wander target inside the agent's radius, walk straight at it at
//! a reduced fraction of configured speed, pick a new one on arrival. No
//! pathfinding, no obstacle avoidance.
//!
//! Promotion timing (seconds-scale grace) and simulation timing (sub-Hz
//! fixed step) are decoupled so mostly-idle orphan handling stays
//! negligible next to owner-driven simulation.
//!
//! Lock discipline: the per-agent slot lock is always taken before this
//! module's internal state lock, matching the registry's order.

use ahash::AHashMap;
use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::agent::store::{lock_slot, AgentStore};
use crate::agent::WriteAuthority;
use crate::core::config::SyncConfig;
use crate::core::types::{planar_distance, AgentId};

struct FallbackState {
    /// Current wander target per server-simulated agent; absent means
    /// "pick a fresh one next step"
    wander_targets: AHashMap<AgentId, Vec3>,
    /// Unspent simulation time, drained in fixed steps
    accumulator: Duration,
    rng: ChaCha8Rng,
}

/// Low-frequency degenerate motion model for unowned agents
pub struct FallbackSimulator {
    store: Arc<AgentStore>,
    config: Arc<SyncConfig>,
    state: Mutex<FallbackState>,
}

impl FallbackSimulator {
    pub fn new(store: Arc<AgentStore>, config: Arc<SyncConfig>, seed: u64) -> Self {
        Self {
            store,
            config,
            state: Mutex::new(FallbackState {
                wander_targets: AHashMap::new(),
                accumulator: Duration::ZERO,
                rng: ChaCha8Rng::seed_from_u64(seed),
            }),
        }
    }

    /// An owner took the agent back; forget its wander state.
    ///
    /// The authority transition itself already happened under the agent's
    /// lock, so by the time this runs the step loop can no longer touch
    /// the agent.
    pub fn on_reclaimed(&self, agent: AgentId) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.wander_targets.remove(&agent);
    }

    /// The agent became unclaimed (release or timeout); drop any stale
    /// wander target so a later promotion starts fresh
    pub fn on_unclaimed(&self, agent: AgentId) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.wander_targets.remove(&agent);
    }

    /// Promote grace-expired unclaimed agents into server simulation.
    ///
    /// Oldest-unclaimed-first when the capacity cap limits how many can
    /// be taken on. Returns the number promoted.
    pub fn promote_due(&self, now: Instant) -> usize {
        let grace = self.config.fallback_grace();
        let mut candidates: Vec<(AgentId, Instant)> = Vec::new();
        let mut simulated = 0usize;

        for (id, slot) in self.store.slots() {
            let record = lock_slot(&slot);
            match record.authority {
                WriteAuthority::ServerSimulated => simulated += 1,
                WriteAuthority::Unclaimed { since } => {
                    let due = now
                        .checked_duration_since(since)
                        .map(|age| age >= grace)
                        .unwrap_or(false);
                    if due && record.is_alive && !record.cleaned_up {
                        candidates.push((id, since));
                    }
                }
                WriteAuthority::Owned { .. } => {}
            }
        }

        let capacity_left = self.config.fallback_capacity.saturating_sub(simulated);
        if capacity_left == 0 || candidates.is_empty() {
            return 0;
        }
        candidates.sort_by_key(|&(_, since)| since);

        let mut promoted = 0;
        for (id, since) in candidates.into_iter().take(capacity_left) {
            let Some(slot) = self.store.get(id) else {
                continue;
            };
            let mut record = lock_slot(&slot);
            // Re-check under the lock: an owner may have reclaimed the
            // agent between the scan and now
            if record.authority == (WriteAuthority::Unclaimed { since }) && record.is_mutable() {
                record.authority = WriteAuthority::ServerSimulated;
                promoted += 1;
                tracing::debug!(agent = %id, "promoted to server simulation");
            }
        }
        promoted
    }

    /// Feed elapsed time into the fixed-step accumulator, advancing the
    /// motion model zero or more whole steps
    pub fn step(&self, elapsed: Duration) {
        let step = self.config.fallback_step();
        let mut pending = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state.accumulator += elapsed;
            let whole = state.accumulator.as_secs_f32() / step.as_secs_f32();
            let steps = whole.floor() as u32;
            if steps > 0 {
                state.accumulator -= step * steps;
            }
            steps
        };

        while pending > 0 {
            self.advance_all(step.as_secs_f32());
            pending -= 1;
        }
    }

    /// Advance every server-simulated agent by one fixed timestep
    fn advance_all(&self, dt_secs: f32) {
        for (id, slot) in self.store.slots() {
            let mut record = lock_slot(&slot);
            if !record.is_server_simulated() {
                continue;
            }
            if !record.is_mutable() {
                // Death or cleanup removes the agent from the fallback
                // set unconditionally
                record.authority = WriteAuthority::Unclaimed {
                    since: Instant::now(),
                };
                drop(record);
                self.on_unclaimed(id);
                continue;
            }

            let position = record.position;
            let spawn = record.spawn_position;
            let radius = record.max_wander_radius;
            let speed = record.config.move_speed * self.config.fallback_speed_fraction;

            let target = {
                let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
                match state.wander_targets.get(&id) {
                    Some(&t) => t,
                    None => {
                        let t = pick_wander_target(&mut state.rng, spawn, radius);
                        state.wander_targets.insert(id, t);
                        t
                    }
                }
            };

            let distance = planar_distance(position, target);
            if distance < self.config.arrival_epsilon {
                // Arrived; next step picks a fresh target
                drop(record);
                let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
                state.wander_targets.remove(&id);
                continue;
            }

            let step_dist = (speed * dt_secs).min(distance);
            let direction = (target - position) / distance;
            record.position = position + direction * step_dist;
        }
    }

    /// Periodic task body driving promotion and stepping.
    ///
    /// The promotion check and the fixed simulation step run on their own
    /// independent cadences inside one task.
    pub async fn run(self: Arc<Self>) {
        let mut check = tokio::time::interval(self.config.fallback_check());
        let mut step = tokio::time::interval(self.config.fallback_step());
        check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        step.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_step = Instant::now();
        loop {
            tokio::select! {
                _ = check.tick() => {
                    let promoted = self.promote_due(Instant::now());
                    if promoted > 0 {
                        tracing::info!(promoted, "fallback took over orphaned agents");
                    }
                }
                _ = step.tick() => {
                    let now = Instant::now();
                    self.step(now.duration_since(last_step));
                    last_step = now;
                }
            }
        }
    }

    /// Whether the coordinator is currently simulating this agent
    pub fn is_simulating(&self, agent: AgentId) -> bool {
        self.store
            .get(agent)
            .map(|slot| lock_slot(&slot).is_server_simulated())
            .unwrap_or(false)
    }

    /// Number of agents currently server-simulated
    pub fn simulated_count(&self) -> usize {
        self.store
            .slots()
            .iter()
            .filter(|(_, slot)| lock_slot(slot).is_server_simulated())
            .count()
    }
}

/// Uniform random point within `radius` of `spawn` in the horizontal
/// plane, at spawn elevation
fn pick_wander_target(rng: &mut ChaCha8Rng, spawn: Vec3, radius: f32) -> Vec3 {
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    // sqrt for area-uniform sampling instead of center-biased
    let dist = radius * rng.gen_range(0.0f32..1.0).sqrt();
    Vec3::new(
        spawn.x + angle.cos() * dist,
        spawn.y,
        spawn.z + angle.sin() * dist,
    )
}
