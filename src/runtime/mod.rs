pub mod host;
pub mod sweeper;

pub use host::SimulationHost;
pub use sweeper::TimeoutSweeper;
