//! Shared types for CPU, process and memory counters.

use std::path::PathBuf;

/// Cumulative busy/total tick counts for one CPU (or the whole system).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickCounts {
    pub busy: u64,
    pub total: u64,
}

impl TickCounts {
    pub fn new(busy: u64, total: u64) -> Self {
        Self {
            busy: busy.min(total),
            total,
        }
    }

    /// Fraction of ticks spent busy since `previous`, in `[0, 1]`.
    ///
    /// Returns 0 when no ticks elapsed or the counters went backwards.
    pub fn load_since(&self, previous: &TickCounts) -> f64 {
        let total = self.total.saturating_sub(previous.total);
        if total == 0 {
            return 0.0;
        }
        let busy = self.busy.saturating_sub(previous.busy);
        (busy as f64 / total as f64).clamp(0.0, 1.0)
    }
}

/// System-wide and per-logical-core tick counters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuTicks {
    pub system: TickCounts,
    pub per_core: Vec<TickCounts>,
}

impl CpuTicks {
    /// System and per-core load between two readings.
    ///
    /// Cores missing from `previous` (hotplug) report 0 for this round.
    pub fn load_since(&self, previous: &CpuTicks) -> (f64, Vec<f64>) {
        let per_core = self
            .per_core
            .iter()
            .enumerate()
            .map(|(i, current)| {
                previous
                    .per_core
                    .get(i)
                    .map(|prev| current.load_since(prev))
                    .unwrap_or(0.0)
            })
            .collect();
        (self.system.load_since(&previous.system), per_core)
    }
}

/// Static processor identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuIdentity {
    /// Raw vendor id, e.g. `GenuineIntel`.
    pub vendor: String,
    pub model: String,
    pub physical_cores: usize,
    pub logical_cores: usize,
}

impl Default for CpuIdentity {
    fn default() -> Self {
        Self {
            vendor: String::new(),
            model: String::new(),
            physical_cores: 1,
            logical_cores: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuFrequency {
    /// Current clock of each logical core in Hz.
    pub per_core_hz: Vec<u64>,
    /// Rated maximum clock in Hz, 0 if unknown.
    pub max_hz: u64,
}

impl CpuFrequency {
    pub fn average_hz(&self) -> f64 {
        if self.per_core_hz.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.per_core_hz.iter().sum();
        sum as f64 / self.per_core_hz.len() as f64
    }
}

/// Cumulative kernel activity counters since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemCounters {
    pub context_switches: u64,
    pub interrupts: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub path: Option<PathBuf>,
    /// Cumulative CPU time in milliseconds.
    pub cpu_time_ms: u64,
    /// Platform ranking used to order the list, higher first.
    pub rank_hint: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskUsage {
    pub name: String,
    pub file_system: String,
    pub mount_point: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl DiskUsage {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }

    pub fn usage_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes() as f64 * 100.0 / self.total_bytes as f64
    }

    /// Sum of every store, labelled "All Drives".
    pub fn combined(disks: &[DiskUsage]) -> DiskUsage {
        DiskUsage {
            name: "All Drives".to_string(),
            file_system: "Combined".to_string(),
            mount_point: "All".to_string(),
            total_bytes: disks.iter().map(|d| d.total_bytes).sum(),
            available_bytes: disks.iter().map(|d| d.available_bytes).sum(),
        }
    }
}

/// Maps CPUID vendor strings to their marketing names.
pub fn normalize_vendor(raw: &str) -> String {
    match raw.trim() {
        "" => "Unknown".to_string(),
        "GenuineIntel" => "Intel".to_string(),
        "AuthenticAMD" => "AMD".to_string(),
        "CentaurHauls" => "Centaur".to_string(),
        "CyrixInstead" => "Cyrix".to_string(),
        "Qualcomm Technologies, Inc." => "Qualcomm".to_string(),
        other => other.to_string(),
    }
}
