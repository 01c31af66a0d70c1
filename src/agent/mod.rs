pub mod record;
pub mod store;

pub use record::{AgentConfig, AgentRecord, BehaviorMode, WriteAuthority};
pub use store::{AgentStore, SpawnParams};
