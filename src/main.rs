//! Drover demo coordinator
//!
//! Runs a synthetic multi-participant scenario against one in-process
//! host: participants stream position batches for their share of the
//! agents, one goes silent halfway through, and the timeout sweeper and
//! fallback simulator pick up the pieces. Prints ownership and traffic
//! stats so the timeout -> orphan -> fallback -> reclaim lifecycle is
//! visible end to end.

use clap::Parser;
use glam::Vec3;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drover::agent::store::SpawnParams;
use drover::core::config::SyncConfig;
use drover::core::error::Result;
use drover::core::types::{AgentId, Orientation, ParticipantId};
use drover::runtime::SimulationHost;
use drover::sync::messages::{AgentPose, OutboundMessage};

#[derive(Parser, Debug)]
#[command(name = "drover", about = "NPC ownership/sync demo coordinator")]
struct Args {
    /// Number of agents to spawn
    #[arg(long, default_value_t = 200)]
    agents: usize,

    /// Number of simulated participants
    #[arg(long, default_value_t = 4)]
    participants: usize,

    /// Number of 100ms reporting ticks to run
    #[arg(long, default_value_t = 100)]
    ticks: usize,

    /// Seed for the fallback wander RNG
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Optional TOML config file
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drover=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SyncConfig::load_from_file(path)?,
        None => SyncConfig::default(),
    };
    if args.config.is_none() {
        // Demo-friendly timings so the lifecycle plays out in seconds
        config.ownership_timeout_secs = 1.0;
        config.sweep_interval_secs = 0.25;
        config.fallback_grace_secs = 1.5;
        config.fallback_check_secs = 0.5;
        config.fallback_step_secs = 0.5;
    }

    let host = Arc::new(SimulationHost::new(config, args.seed)?);
    let _tasks = host.spawn_background_tasks();

    println!("=== DROVER DEMO: {} agents, {} participants ===\n", args.agents, args.participants);

    // Agents in clusters, one cluster per participant
    let mut assignments: Vec<Vec<AgentId>> = vec![Vec::new(); args.participants];
    for i in 0..args.agents {
        let cluster = i % args.participants;
        let center = cluster_center(cluster);
        let offset = Vec3::new((i / args.participants) as f32 * 2.0, 0.0, 0.0);
        let id = host.spawn_agent(SpawnParams::at(center + offset));
        assignments[cluster].push(id);
    }

    // Connect participants at their cluster centers and count inbound
    // traffic per participant
    let mut participants = Vec::new();
    let mut message_counts = Vec::new();
    for cluster in 0..args.participants {
        let participant = ParticipantId::new();
        let mut rx = host.connect(participant);
        host.update_participant_reference(participant, cluster_center(cluster))?;

        let batches = Arc::new(AtomicUsize::new(0));
        let orphan_notes = Arc::new(AtomicUsize::new(0));
        let (b, o) = (batches.clone(), orphan_notes.clone());
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    OutboundMessage::PositionBatch { .. } => {
                        b.fetch_add(1, Ordering::Relaxed);
                    }
                    OutboundMessage::OrphanAnnouncement { orphans } => {
                        o.fetch_add(orphans.len(), Ordering::Relaxed);
                    }
                }
            }
        });

        participants.push(participant);
        message_counts.push((batches, orphan_notes));
    }

    // Reporting loop: each participant walks its agents in a slow circle
    // around spawn. Participant 0 goes silent at the halfway mark.
    let silent_after = args.ticks / 2;
    for tick in 0..args.ticks {
        for (idx, &participant) in participants.iter().enumerate() {
            if idx == 0 && tick >= silent_after {
                continue;
            }
            let angle = tick as f32 * 0.1;
            let batch: Vec<AgentPose> = assignments[idx]
                .iter()
                .enumerate()
                .map(|(n, &agent)| {
                    let center = cluster_center(idx) + Vec3::new(n as f32 * 2.0, 0.0, 0.0);
                    AgentPose {
                        agent,
                        position: center
                            + Vec3::new(angle.cos() * 10.0, 0.0, angle.sin() * 10.0),
                        orientation: Some(Orientation::new(angle, 0.0)),
                    }
                })
                .collect();
            host.submit_position_batch(participant, batch);
        }

        if tick == silent_after {
            println!("tick {:>4}: participant 0 went silent", tick);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // Let the sweeper and fallback catch up with the silent participant
    tokio::time::sleep(Duration::from_secs(3)).await;

    println!("\n=== FINAL STATE ===");
    for (idx, &participant) in participants.iter().enumerate() {
        let owned = host.registry().owned_count(participant);
        let (batches, orphans) = &message_counts[idx];
        println!(
            "participant {}: owns {:>3} agents, received {:>5} position batches, {:>3} orphan notices",
            idx,
            owned,
            batches.load(Ordering::Relaxed),
            orphans.load(Ordering::Relaxed),
        );
    }
    println!(
        "fallback simulating {} of {} agents",
        host.fallback().simulated_count(),
        host.store().len(),
    );

    Ok(())
}

fn cluster_center(cluster: usize) -> Vec3 {
    Vec3::new((cluster % 4) as f32 * 300.0, 0.0, (cluster / 4) as f32 * 300.0)
}
