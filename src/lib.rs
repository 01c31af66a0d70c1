//! Drover - Authoritative NPC simulation ownership and synchronization
//!
//! A coordinator-side subsystem for shared simulated worlds: one
//! authoritative process decides which participant is responsible for
//! advancing each agent's position, reconciles untrusted owner-supplied
//! position streams against soft movement bounds, fans accepted updates
//! out to nearby participants in batches, and keeps orphaned agents
//! moving with a cheap server-side wander model until someone reclaims
//! them.

pub mod agent;
pub mod core;
pub mod fallback;
pub mod ownership;
pub mod runtime;
pub mod sync;
