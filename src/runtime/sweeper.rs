//! Timeout sweeper: detects silently-dead owners
//!
//! Disconnect notifications are themselves unreliable, so a fixed-period
//! scan backstops them: any owner that has gone quiet past the deadline
//! is treated exactly like an explicit release, and the resulting orphans
//! go out as a single batched announcement so interested participants can
//! pick them up by proximity.

use std::sync::Arc;
use std::time::Instant;

use crate::core::config::SyncConfig;
use crate::ownership::OwnershipRegistry;
use crate::sync::messages::OrphanNotice;
use crate::sync::SyncBroadcaster;

pub struct TimeoutSweeper {
    registry: Arc<OwnershipRegistry>,
    broadcaster: Arc<SyncBroadcaster>,
    config: Arc<SyncConfig>,
}

impl TimeoutSweeper {
    pub fn new(
        registry: Arc<OwnershipRegistry>,
        broadcaster: Arc<SyncBroadcaster>,
        config: Arc<SyncConfig>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            config,
        }
    }

    /// One sweep pass: demote stale owners and announce the orphan batch.
    ///
    /// Returns how many agents were orphaned.
    pub fn sweep_once(&self, now: Instant) -> usize {
        let orphans = self
            .registry
            .sweep_timeouts(now, self.config.ownership_timeout());
        if orphans.is_empty() {
            return 0;
        }
        let notices: Vec<OrphanNotice> = orphans
            .iter()
            .map(|&(agent, last_position)| OrphanNotice {
                agent,
                last_position,
            })
            .collect();
        tracing::info!(count = notices.len(), "swept stale owners");
        self.broadcaster.broadcast_orphans(&notices);
        notices.len()
    }

    /// Periodic task body; runs until the runtime shuts down
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sweep_once(Instant::now());
        }
    }
}
