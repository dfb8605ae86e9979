//! Provider built only on `sysinfo`.
//!
//! sysinfo exposes usage percentages rather than raw ticks, so this provider
//! integrates them over wall time into synthetic cumulative counters. Kernel
//! counters are not available.

use std::time::Instant;

use color_eyre::eyre::Result;

use crate::hardware::HardwareProvider;
use crate::sysinfo_source::SysinfoSource;
use crate::types::{
    CpuFrequency, CpuIdentity, CpuTicks, DiskUsage, MemoryInfo, ProcessSample, SystemCounters,
    TickCounts,
};

pub struct PortableHardware {
    source: SysinfoSource,
    ticks: CpuTicks,
    last_sample: Instant,
}

impl HardwareProvider for PortableHardware {
    fn new() -> Result<Self> {
        let mut source = SysinfoSource::new();
        // Prime usage so the first delta has a baseline.
        let (_, per_core) = source.cpu_usage();

        Ok(Self {
            source,
            ticks: CpuTicks {
                system: TickCounts::default(),
                per_core: vec![TickCounts::default(); per_core.len()],
            },
            last_sample: Instant::now(),
        })
    }

    fn identity(&self) -> CpuIdentity {
        self.source.identity().clone()
    }

    fn cpu_ticks(&mut self) -> Result<CpuTicks> {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_sample).as_millis() as u64;
        self.last_sample = now;

        let (system, per_core) = self.source.cpu_usage();
        accumulate(&mut self.ticks.system, system, elapsed_ms);

        self.ticks
            .per_core
            .resize(per_core.len(), TickCounts::default());
        for (ticks, usage) in self.ticks.per_core.iter_mut().zip(per_core) {
            accumulate(ticks, usage, elapsed_ms);
        }

        Ok(self.ticks.clone())
    }

    fn frequency(&mut self) -> Result<CpuFrequency> {
        let per_core_hz = self.source.core_frequencies_hz();
        // sysinfo has no rated maximum; the fastest core seen now is the best guess.
        let max_hz = per_core_hz.iter().copied().max().unwrap_or(0);
        Ok(CpuFrequency {
            per_core_hz,
            max_hz,
        })
    }

    fn system_counters(&mut self) -> Result<Option<SystemCounters>> {
        Ok(None)
    }

    fn processes(&mut self) -> Result<Vec<ProcessSample>> {
        Ok(self.source.processes())
    }

    fn memory(&mut self) -> Result<MemoryInfo> {
        Ok(self.source.memory())
    }

    fn disks(&mut self) -> Result<Vec<DiskUsage>> {
        Ok(self.source.disks())
    }
}

/// Adds `elapsed_ms` of wall time, `usage_percent` of it busy.
fn accumulate(ticks: &mut TickCounts, usage_percent: f32, elapsed_ms: u64) {
    let ratio = if usage_percent.is_finite() {
        (usage_percent as f64 / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    };
    ticks.total += elapsed_ms;
    ticks.busy += (elapsed_ms as f64 * ratio).round() as u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_tracks_usage_share() {
        let mut ticks = TickCounts::default();
        let before = ticks;
        accumulate(&mut ticks, 25.0, 1000);
        assert_eq!(ticks, TickCounts::new(250, 1000));
        assert!((ticks.load_since(&before) - 0.25).abs() < 1e-9);

        accumulate(&mut ticks, f32::NAN, 1000);
        assert_eq!(ticks, TickCounts::new(250, 2000));

        accumulate(&mut ticks, 150.0, 100);
        assert_eq!(ticks, TickCounts::new(350, 2100));
    }
}
