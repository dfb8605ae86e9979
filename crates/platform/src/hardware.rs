//! Hardware provider trait.

use color_eyre::eyre::Result;

use crate::types::{
    CpuFrequency, CpuIdentity, CpuTicks, DiskUsage, MemoryInfo, ProcessSample, SystemCounters,
};

/// Trait for platform-specific CPU, process and memory sources.
///
/// Every reading is a fresh sample. Callers own the previous sample and
/// compute deltas themselves.
pub trait HardwareProvider: Send {
    /// Create a new provider instance.
    fn new() -> Result<Self>
    where
        Self: Sized;

    /// Processor identity, read once at construction.
    fn identity(&self) -> CpuIdentity;

    /// Cumulative busy/total ticks, system wide and per logical core.
    fn cpu_ticks(&mut self) -> Result<CpuTicks>;

    fn frequency(&mut self) -> Result<CpuFrequency>;

    /// Context switch and interrupt counters.
    ///
    /// `None` when the platform does not expose them.
    fn system_counters(&mut self) -> Result<Option<SystemCounters>>;

    fn processes(&mut self) -> Result<Vec<ProcessSample>>;

    fn memory(&mut self) -> Result<MemoryInfo>;

    fn disks(&mut self) -> Result<Vec<DiskUsage>>;

    /// Check if this provider can read the current system.
    fn is_supported() -> bool
    where
        Self: Sized,
    {
        true
    }
}
