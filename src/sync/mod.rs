pub mod broadcaster;
pub mod messages;

pub use broadcaster::SyncBroadcaster;
pub use messages::{AgentPose, OrphanNotice, OutboundMessage, PendingUpdateBatch};
