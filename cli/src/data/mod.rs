pub mod activity;
pub mod history;
pub mod memory;
pub mod snapshot;
pub mod statistics;

pub use activity::ProcessActivitySampler;
pub use history::LoadHistory;
pub use memory::{memory_snapshot, MemorySessionStatistics};
pub use snapshot::SnapshotBuilder;
pub use statistics::{LoadSmoother, SessionStatistics};

#[cfg(all(target_os = "linux", feature = "linux"))]
pub type PlatformHardware = corescope_platform::linux::LinuxHardware;

#[cfg(not(all(target_os = "linux", feature = "linux")))]
pub type PlatformHardware = corescope_platform::PortableHardware;

#[cfg(test)]
pub use fake::FakeHardware;
