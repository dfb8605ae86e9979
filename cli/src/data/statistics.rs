use corescope_protocol::{HardwareSnapshot, StatRange, StatisticsSummary};

/// Weight kept from the previous smoothed value.
pub const HISTORY_WEIGHT: f64 = 0.2;

/// One EWMA step: `previous * 0.2 + raw * 0.8`.
pub fn smooth_load(previous: f64, raw: f64) -> f64 {
    previous * HISTORY_WEIGHT + raw * (1.0 - HISTORY_WEIGHT)
}

/// EWMA over successive load ratios, starting from 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadSmoother {
    current: f64,
}

impl LoadSmoother {
    pub fn update(&mut self, raw: f64) -> f64 {
        let raw = if raw.is_finite() { raw } else { 0.0 };
        self.current = smooth_load(self.current, raw);
        self.current
    }
}

/// Running sum/min/max for one quantity.
#[derive(Debug, Clone, Copy)]
pub struct RunningStat {
    sum: f64,
    min: f64,
    max: f64,
    count: u64,
}

impl Default for RunningStat {
    fn default() -> Self {
        Self {
            sum: 0.0,
            min: f64::INFINITY,
            max: 0.0,
            count: 0,
        }
    }
}

impl RunningStat {
    pub fn record(&mut self, value: f64) {
        let value = if value.is_finite() { value } else { 0.0 };
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.count += 1;
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn range(&self) -> StatRange {
        StatRange {
            min: self.min(),
            avg: self.avg(),
            max: self.max(),
        }
    }
}

/// Accumulates per-session statistics from successive snapshots.
#[derive(Debug, Clone, Default)]
pub struct SessionStatistics {
    sample_count: u64,
    load_percent: RunningStat,
    temperature: RunningStat,
    frequency: RunningStat,
    voltage: RunningStat,
    power: RunningStat,
    max_observed_temperature: f64,
    throttle_event_count: u32,
    was_throttling: bool,
}

impl SessionStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one sample. `smoothed_load` is a ratio in `[0, 1]`.
    pub fn update(&mut self, snapshot: &HardwareSnapshot, smoothed_load: f64, package_power: f64) {
        self.sample_count += 1;
        self.load_percent.record(smoothed_load * 100.0);
        self.temperature.record(snapshot.average_temperature_c);
        self.frequency.record(snapshot.current_frequency_ghz);
        self.voltage.record(mean(&snapshot.per_core_voltage));
        self.power.record(package_power);

        if snapshot.max_temperature_c > self.max_observed_temperature {
            self.max_observed_temperature = snapshot.max_temperature_c;
        }

        self.update_throttling(snapshot.thermal_throttle_active);
    }

    /// Counts false to true transitions only.
    pub fn update_throttling(&mut self, is_throttling: bool) {
        if is_throttling && !self.was_throttling {
            self.throttle_event_count += 1;
        }
        self.was_throttling = is_throttling;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn load_percent(&self) -> StatRange {
        self.load_percent.range()
    }

    pub fn temperature(&self) -> StatRange {
        self.temperature.range()
    }

    pub fn frequency(&self) -> StatRange {
        self.frequency.range()
    }

    pub fn voltage(&self) -> StatRange {
        self.voltage.range()
    }

    pub fn power(&self) -> StatRange {
        self.power.range()
    }

    pub fn max_observed_temperature(&self) -> f64 {
        self.max_observed_temperature
    }

    pub fn throttle_event_count(&self) -> u32 {
        self.throttle_event_count
    }

    pub fn summary(&self) -> StatisticsSummary {
        StatisticsSummary {
            sample_count: self.sample_count(),
            load_percent: self.load_percent(),
            temperature_c: self.temperature(),
            frequency_ghz: self.frequency(),
            voltage: self.voltage(),
            power_watts: self.power(),
            max_observed_temperature_c: self.max_observed_temperature(),
            throttle_event_count: self.throttle_event_count(),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
