use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::monitor::clamp_interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" | "none" => LogLevel::Off,
            "error" => LogLevel::Error,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Warn,
        }
    }

    pub fn as_tracing_level(&self) -> Option<tracing::Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(tracing::Level::ERROR),
            LogLevel::Warn => Some(tracing::Level::WARN),
            LogLevel::Info => Some(tracing::Level::INFO),
            LogLevel::Debug => Some(tracing::Level::DEBUG),
            LogLevel::Trace => Some(tracing::Level::TRACE),
        }
    }
}

#[cfg(windows)]
pub const DEFAULT_HELPER_EXECUTABLE: &str = "MonitorBridge.exe";
#[cfg(not(windows))]
pub const DEFAULT_HELPER_EXECUTABLE: &str = "monitor-bridge";

fn default_helper_executable() -> String {
    DEFAULT_HELPER_EXECUTABLE.to_string()
}

/// Sensor helper process settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    pub enabled: bool,
    /// File name looked up in the helper search directories.
    #[serde(default = "default_helper_executable")]
    pub executable: String,
    /// Explicit helper path. Skips the search when set.
    pub command: Option<PathBuf>,
    pub args: Vec<String>,
    /// Helper frequency units per GHz.
    pub frequency_divisor: f64,
    /// Helper voltage units per volt.
    pub voltage_divisor: f64,
    pub stop_timeout_ms: u64,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            executable: default_helper_executable(),
            command: None,
            args: Vec::new(),
            frequency_divisor: 1000.0,
            voltage_divisor: 1000.0,
            stop_timeout_ms: 1000,
        }
    }
}

impl HelperConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub poll_interval_secs: f64,
    pub history_window_secs: u32,
    pub process_count: usize,
    #[serde(default)]
    pub excluded_processes: Vec<String>,
    pub log_level: LogLevel,
    #[serde(default)]
    pub helper: HelperConfig,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1.0,
            history_window_secs: 60,
            process_count: 10,
            excluded_processes: Vec::new(),
            log_level: LogLevel::Warn,
            helper: HelperConfig::default(),
        }
    }
}

/// Pseudo-processes that never represent real work.
const IDLE_PROCESSES: &[&str] = &[
    "Idle",
    "System Idle Process",
    "System",
    "Registry",
    "Memory Compression",
    "Secure System",
    "swapper",
    "kernel_task",
];

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("corescope")
}

pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("~/.cache"))
        .join("corescope")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn ensure_dirs() -> std::io::Result<()> {
    fs::create_dir_all(config_dir())?;
    fs::create_dir_all(cache_dir())?;
    Ok(())
}

impl UserConfig {
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Invalid config, using defaults"
                );
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        let _ = ensure_dirs();
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        fs::write(path, content)
    }

    /// Applies command line overrides. Returns true if the interval came from the CLI.
    pub fn merge_with_args(&mut self, interval_secs: Option<f64>) -> bool {
        let interval_from_cli = interval_secs.is_some();
        if let Some(secs) = interval_secs {
            self.poll_interval_secs = secs;
        }
        interval_from_cli
    }

    pub fn poll_interval(&self) -> Duration {
        clamp_interval(self.poll_interval_secs)
    }

    pub fn history_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.history_window_secs))
    }

    pub fn effective_excluded_processes(&self) -> Vec<&str> {
        let mut excluded: Vec<&str> = IDLE_PROCESSES.to_vec();
        excluded.extend(self.excluded_processes.iter().map(|s| s.as_str()));
        excluded
    }
}
