use std::fs;
use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};

use super::proc_stat::{parse_proc_stat, ProcStat};
use crate::hardware::HardwareProvider;
use crate::sysinfo_source::SysinfoSource;
use crate::types::{
    CpuFrequency, CpuIdentity, CpuTicks, DiskUsage, MemoryInfo, ProcessSample, SystemCounters,
};

const PROC_STAT_PATH: &str = "/proc/stat";
const CPU_SYSFS_PATH: &str = "/sys/devices/system/cpu";

/// Reads ticks and kernel counters from procfs, everything else via sysinfo.
pub struct LinuxHardware {
    source: SysinfoSource,
    max_frequency_hz: u64,
    /// Counters read alongside the last tick sample.
    last_counters: Option<SystemCounters>,
}

impl HardwareProvider for LinuxHardware {
    fn new() -> Result<Self> {
        let source = SysinfoSource::new();
        let max_frequency_hz = discover_max_frequency_hz(source.identity().logical_cores);
        tracing::debug!(max_frequency_hz, "Read cpufreq limits");

        Ok(Self {
            source,
            max_frequency_hz,
            last_counters: None,
        })
    }

    fn identity(&self) -> CpuIdentity {
        self.source.identity().clone()
    }

    fn cpu_ticks(&mut self) -> Result<CpuTicks> {
        let stat = read_proc_stat()?;
        self.last_counters = Some(stat.counters);
        Ok(stat.ticks)
    }

    fn frequency(&mut self) -> Result<CpuFrequency> {
        let per_core_hz = self.source.core_frequencies_hz();
        let max_hz = if self.max_frequency_hz > 0 {
            self.max_frequency_hz
        } else {
            per_core_hz.iter().copied().max().unwrap_or(0)
        };
        Ok(CpuFrequency {
            per_core_hz,
            max_hz,
        })
    }

    fn system_counters(&mut self) -> Result<Option<SystemCounters>> {
        match self.last_counters.take() {
            Some(counters) => Ok(Some(counters)),
            None => Ok(Some(read_proc_stat()?.counters)),
        }
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

    fn is_supported() -> bool {
        Path::new(PROC_STAT_PATH).exists()
    }
}

fn read_proc_stat() -> Result<ProcStat> {
    let content = fs::read_to_string(PROC_STAT_PATH)
        .wrap_err_with(|| format!("Failed to read {}", PROC_STAT_PATH))?;
    parse_proc_stat(&content)
}

/// Highest `cpuinfo_max_freq` across cores, in Hz. 0 when cpufreq is absent.
fn discover_max_frequency_hz(logical_cores: usize) -> u64 {
    let cpu_path = Path::new(CPU_SYSFS_PATH);
    if !cpu_path.exists() {
        return 0;
    }

    (0..logical_cores)
        .filter_map(|core| {
            let path = cpu_path.join(format!("cpu{}/cpufreq/cpuinfo_max_freq", core));
            fs::read_to_string(path).ok()
        })
        .filter_map(|content| content.trim().parse::<u64>().ok())
        .map(|khz| khz * 1000)
        .max()
        .unwrap_or(0)
}
