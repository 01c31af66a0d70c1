pub mod bounds;
pub mod registry;

pub use bounds::clamp_to_wander_radius;
pub use registry::OwnershipRegistry;
