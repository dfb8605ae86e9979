//! CPU, process and memory readings for corescope.
//!
//! [`HardwareProvider`] is the seam between the aggregation core and the
//! operating system. Every platform gets a sysinfo-backed provider; Linux can
//! read raw tick and kernel counters from procfs instead.
//!
//! # Features
//!
//! - `linux` - Enable the procfs/sysfs provider

mod hardware;
mod portable;
mod sysinfo_source;
mod types;

pub use hardware::HardwareProvider;
pub use portable::PortableHardware;
pub use sysinfo_source::SysinfoSource;
pub use types::{
    normalize_vendor, CpuFrequency, CpuIdentity, CpuTicks, DiskUsage, MemoryInfo, ProcessSample,
    SystemCounters, TickCounts,
};

#[cfg(target_os = "linux")]
#[cfg(feature = "linux")]
pub mod linux;
