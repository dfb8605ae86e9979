use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::{ChannelState, CoreType};

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadLevel {
    #[default]
    Low,
    Moderate,
    High,
    Critical,
}

impl LoadLevel {
    pub fn from_ratio(load: f64) -> Self {
        if load < 0.3 {
            LoadLevel::Low
        } else if load < 0.6 {
            LoadLevel::Moderate
        } else if load < 0.85 {
            LoadLevel::High
        } else {
            LoadLevel::Critical
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LoadLevel::Low => "Low",
            LoadLevel::Moderate => "Moderate",
            LoadLevel::High => "High",
            LoadLevel::Critical => "Critical",
        }
    }
}

/// One poll's worth of CPU state.
///
/// Every per-core vector has exactly `logical_cores` entries. Sources that
/// report fewer cores are zero padded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    pub vendor: String,
    pub model: String,
    pub physical_cores: usize,
    pub logical_cores: usize,
    pub current_frequency_ghz: f64,
    pub max_frequency_ghz: f64,
    /// Ratio in `[0, 1]`.
    pub system_load: f64,
    pub per_core_load: Vec<f64>,
    pub per_core_temperature_c: Vec<f64>,
    pub per_core_frequency_ghz: Vec<f64>,
    pub per_core_voltage: Vec<f64>,
    pub core_types: Vec<CoreType>,
    pub max_temperature_c: f64,
    /// Mean over cores reporting a positive temperature.
    pub average_temperature_c: f64,
    pub package_temperature_c: f64,
    pub temperature_source: ChannelState,
    pub thermal_throttle_active: bool,
    pub power_throttle_active: bool,
    pub package_power_watts: f64,
    /// Session high-water mark per core.
    pub per_core_max_observed_temperature_c: Vec<f64>,
}

impl Default for HardwareSnapshot {
    fn default() -> Self {
        Self {
            vendor: UNKNOWN.to_string(),
            model: UNKNOWN.to_string(),
            physical_cores: 1,
            logical_cores: 1,
            current_frequency_ghz: 0.0,
            max_frequency_ghz: 0.0,
            system_load: 0.0,
            per_core_load: vec![0.0],
            per_core_temperature_c: vec![0.0],
            per_core_frequency_ghz: vec![0.0],
            per_core_voltage: vec![0.0],
            core_types: vec![CoreType::Performance],
            max_temperature_c: 0.0,
            average_temperature_c: 0.0,
            package_temperature_c: 0.0,
            temperature_source: ChannelState::Stopped,
            thermal_throttle_active: false,
            power_throttle_active: false,
            package_power_watts: 0.0,
            per_core_max_observed_temperature_c: vec![0.0],
        }
    }
}

impl HardwareSnapshot {
    pub fn load_percent(&self) -> f64 {
        self.system_load * 100.0
    }

    pub fn load_level(&self) -> LoadLevel {
        LoadLevel::from_ratio(self.system_load)
    }

    pub fn has_hyperthreading(&self) -> bool {
        self.logical_cores > self.physical_cores
    }

    pub fn core_description(&self) -> String {
        format!(
            "{} cores \u{2022} {} threads",
            self.physical_cores, self.logical_cores
        )
    }

    pub fn formatted_frequency(&self) -> String {
        format_ghz(self.current_frequency_ghz)
    }

    pub fn formatted_max_frequency(&self) -> String {
        format_ghz(self.max_frequency_ghz)
    }

    pub fn formatted_temperature(&self) -> String {
        format_celsius(self.max_temperature_c)
    }

    pub fn formatted_average_temperature(&self) -> String {
        format_celsius(self.average_temperature_c)
    }
}

fn format_ghz(ghz: f64) -> String {
    if ghz > 0.0 {
        format!("{:.2} GHz", ghz)
    } else {
        "N/A".to_string()
    }
}

fn format_celsius(temp: f64) -> String {
    if temp > 0.0 {
        format!("{:.0}\u{b0}C", temp)
    } else {
        "N/A".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessActivity {
    pub name: String,
    /// Share of the whole machine in `[0, 100]`.
    pub cpu_percent: f64,
    pub pid: u32,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct StatRange {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatisticsSummary {
    pub sample_count: u64,
    pub load_percent: StatRange,
    pub temperature_c: StatRange,
    pub frequency_ghz: StatRange,
    pub voltage: StatRange,
    pub power_watts: StatRange,
    pub max_observed_temperature_c: f64,
    pub throttle_event_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
}

impl MemorySnapshot {
    pub fn new(total: u64, available: u64, swap_total: u64, swap_used: u64) -> Self {
        Self {
            total_bytes: total,
            available_bytes: available.min(total),
            used_bytes: total.saturating_sub(available),
            swap_total_bytes: swap_total,
            swap_used_bytes: swap_used.min(swap_total),
        }
    }

    pub fn usage_percent(&self) -> f64 {
        percent_of(self.used_bytes, self.total_bytes)
    }

    pub fn swap_free_bytes(&self) -> u64 {
        self.swap_total_bytes.saturating_sub(self.swap_used_bytes)
    }

    pub fn swap_usage_percent(&self) -> f64 {
        percent_of(self.swap_used_bytes, self.swap_total_bytes)
    }

    pub fn used_mib(&self) -> f64 {
        self.used_bytes as f64 / (1024.0 * 1024.0)
    }
}

fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MemoryStatisticsSummary {
    pub sample_count: u64,
    pub usage_percent: StatRange,
    pub swap_percent: StatRange,
    pub used_mib: StatRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SystemRates {
    pub context_switches_per_sec: f64,
    pub interrupts_per_sec: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub elapsed_secs: f64,
    pub load_percent: f64,
}

/// Everything consumers see after one poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorFrame {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub snapshot: HardwareSnapshot,
    /// EWMA-smoothed `system_load`.
    pub smoothed_load: f64,
    pub statistics: StatisticsSummary,
    pub memory: MemorySnapshot,
    pub memory_statistics: MemoryStatisticsSummary,
    pub rates: SystemRates,
    pub top_processes: Vec<ProcessActivity>,
    pub history: Vec<HistoryPoint>,
}

impl MonitorFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
