use corescope_platform::MemoryInfo;
use corescope_protocol::{MemorySnapshot, MemoryStatisticsSummary};

use super::statistics::RunningStat;

pub fn memory_snapshot(info: &MemoryInfo) -> MemorySnapshot {
    MemorySnapshot::new(
        info.total_bytes,
        info.available_bytes,
        info.swap_total_bytes,
        info.swap_used_bytes,
    )
}

/// Session min/avg/max of RAM and swap usage.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStatistics {
    sample_count: u64,
    usage_percent: RunningStat,
    swap_percent: RunningStat,
    used_mib: RunningStat,
}

impl MemorySessionStatistics {
    pub fn update(&mut self, memory: &MemorySnapshot) {
        self.sample_count += 1;
        self.usage_percent.record(memory.usage_percent());
        self.swap_percent.record(memory.swap_usage_percent());
        self.used_mib.record(memory.used_mib());
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn summary(&self) -> MemoryStatisticsSummary {
        MemoryStatisticsSummary {
            sample_count: self.sample_count,
            usage_percent: self.usage_percent.range(),
            swap_percent: self.swap_percent.range(),
            used_mib: self.used_mib.range(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_snapshot_from_platform_info() {
        let memory = memory_snapshot(&MemoryInfo {
            total_bytes: 8 * GIB,
            available_bytes: 2 * GIB,
            swap_total_bytes: 4 * GIB,
            swap_used_bytes: GIB,
        });
        assert_eq!(memory.used_bytes, 6 * GIB);
        assert_eq!(memory.swap_free_bytes(), 3 * GIB);
        assert!((memory.swap_usage_percent() - 25.0).abs() < 1e-9);
        assert_eq!(memory.used_mib(), 6144.0);
    }

    #[test]
    fn test_statistics_and_reset() {
        let mut stats = MemorySessionStatistics::default();
        stats.update(&MemorySnapshot::new(100, 50, 0, 0));
        stats.update(&MemorySnapshot::new(100, 10, 10, 5));

        let summary = stats.summary();
        assert_eq!(summary.sample_count, 2);
        assert_eq!(summary.usage_percent.min, 50.0);
        assert_eq!(summary.usage_percent.max, 90.0);
        assert_eq!(summary.swap_percent.avg, 25.0);

        stats.reset();
        assert_eq!(stats.summary(), MemoryStatisticsSummary::default());
    }
}
