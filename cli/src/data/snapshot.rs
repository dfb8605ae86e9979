use std::sync::Arc;

use corescope_platform::{normalize_vendor, CpuIdentity, CpuTicks, HardwareProvider};
use corescope_protocol::{ChannelState, CoreType, HardwareSnapshot, UNKNOWN};
use tracing::warn;

use crate::helper::{HelperReader, HelperReadings};

const HZ_PER_GHZ: f64 = 1e9;

/// Builds one [`HardwareSnapshot`] per poll from the OS provider and the
/// latest helper readings.
pub struct SnapshotBuilder<P> {
    provider: P,
    helper: Option<HelperReader>,
    identity: CpuIdentity,
    previous_ticks: Option<CpuTicks>,
    max_observed: Vec<f64>,
}

impl<P: HardwareProvider> SnapshotBuilder<P> {
    /// Takes the first tick reading so the first poll has a baseline.
    pub fn new(mut provider: P, helper: Option<HelperReader>) -> Self {
        let identity = provider.identity();
        let previous_ticks = match provider.cpu_ticks() {
            Ok(ticks) => Some(ticks),
            Err(e) => {
                warn!(error = %e, "Failed to read initial CPU ticks");
                None
            }
        };

        Self {
            provider,
            helper,
            identity,
            previous_ticks,
            max_observed: Vec::new(),
        }
    }

    pub fn identity(&self) -> &CpuIdentity {
        &self.identity
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Swaps the helper feed. `None` leaves temperatures unreported.
    pub fn set_helper(&mut self, helper: Option<HelperReader>) {
        self.helper = helper;
    }

    pub fn reset_max_observed(&mut self) {
        self.max_observed.clear();
    }

    pub fn poll(&mut self) -> HardwareSnapshot {
        let logical_cores = self.identity.logical_cores.max(1);
        let physical_cores = self.identity.physical_cores.clamp(1, logical_cores);

        let (system_load, per_core_load) = self.sample_load();
        let (mut current_frequency_ghz, max_frequency_ghz, mut per_core_frequency_ghz) =
            self.sample_frequency();

        let helper = self
            .helper
            .as_ref()
            .map(HelperReader::latest)
            .unwrap_or_else(|| Arc::new(HelperReadings::default()));
        let monitoring = helper.state.is_monitoring();

        if monitoring && helper.frequencies_ghz.iter().any(|f| *f > 0.0) {
            per_core_frequency_ghz = helper.frequencies_ghz.clone();
            current_frequency_ghz = average_positive(&helper.frequencies_ghz);
        }

        let (per_core_temperature_c, per_core_voltage, core_types) = if monitoring {
            (
                helper.temperatures_c.clone(),
                helper.voltages.clone(),
                helper.core_types.clone(),
            )
        } else {
            (Vec::new(), Vec::new(), Vec::new())
        };

        let per_core_temperature_c = fit(per_core_temperature_c, logical_cores, 0.0);
        let per_core_observed = self.observe(&per_core_temperature_c);

        HardwareSnapshot {
            vendor: normalize_vendor(&self.identity.vendor),
            model: non_empty(&self.identity.model),
            physical_cores,
            logical_cores,
            current_frequency_ghz: clean(current_frequency_ghz),
            max_frequency_ghz: clean(max_frequency_ghz),
            system_load: system_load.clamp(0.0, 1.0),
            per_core_load: fit(per_core_load, logical_cores, 0.0),
            max_temperature_c: max_temperature(&per_core_temperature_c),
            average_temperature_c: average_temperature(&per_core_temperature_c),
            per_core_temperature_c,
            per_core_frequency_ghz: fit(per_core_frequency_ghz, logical_cores, 0.0),
            per_core_voltage: fit(per_core_voltage, logical_cores, 0.0),
            core_types: fit(core_types, logical_cores, CoreType::Performance),
            package_temperature_c: if monitoring {
                clean(helper.package_temperature_c)
            } else {
                0.0
            },
            temperature_source: if self.helper.is_some() {
                helper.state.clone()
            } else {
                ChannelState::Stopped
            },
            thermal_throttle_active: monitoring && helper.thermal_throttle,
            power_throttle_active: monitoring && helper.power_throttle,
            package_power_watts: if monitoring {
                clean(helper.package_power_watts)
            } else {
                0.0
            },
            per_core_max_observed_temperature_c: per_core_observed,
        }
    }

    fn sample_load(&mut self) -> (f64, Vec<f64>) {
        let ticks = match self.provider.cpu_ticks() {
            Ok(ticks) => ticks,
            Err(e) => {
                warn!(error = %e, "Failed to read CPU ticks");
                return (0.0, Vec::new());
            }
        };

        let load = match &self.previous_ticks {
            Some(previous) => ticks.load_since(previous),
            None => (0.0, Vec::new()),
        };
        self.previous_ticks = Some(ticks);
        load
    }

    fn sample_frequency(&mut self) -> (f64, f64, Vec<f64>) {
        match self.provider.frequency() {
            Ok(frequency) => (
                frequency.average_hz() / HZ_PER_GHZ,
                frequency.max_hz as f64 / HZ_PER_GHZ,
                frequency
                    .per_core_hz
                    .iter()
                    .map(|hz| *hz as f64 / HZ_PER_GHZ)
                    .collect(),
            ),
            Err(e) => {
                warn!(error = %e, "Failed to read CPU frequency");
                (0.0, 0.0, Vec::new())
            }
        }
    }

    /// Folds `current` into the per-core high-water marks.
    fn observe(&mut self, current: &[f64]) -> Vec<f64> {
        self.max_observed.resize(current.len(), 0.0);
        for (observed, temp) in self.max_observed.iter_mut().zip(current) {
            if *temp > *observed {
                *observed = *temp;
            }
        }
        self.max_observed.clone()
    }
}

/// Largest per-core temperature, 0 when none report.
pub fn max_temperature(temps: &[f64]) -> f64 {
    temps.iter().copied().fold(0.0, f64::max)
}

/// Mean over cores reporting a positive temperature.
pub fn average_temperature(temps: &[f64]) -> f64 {
    average_positive(temps)
}

fn average_positive(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| **v > 0.0)
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Resizes to exactly `len`, zero padding a short source.
fn fit<T: Clone>(mut values: Vec<T>, len: usize, fill: T) -> Vec<T> {
    values.resize(len, fill);
    values
}

fn clean(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn non_empty(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        UNKNOWN.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FakeHardware;
    use crate::helper::{readings_channel, HelperPublisher, HelperScale};
    use corescope_platform::{CpuFrequency, TickCounts};

    fn ticks(per_core: &[(u64, u64)]) -> CpuTicks {
        let busy = per_core.iter().map(|(b, _)| b).sum();
        let total = per_core.iter().map(|(_, t)| t).sum();
        CpuTicks {
            system: TickCounts::new(busy, total),
            per_core: per_core
                .iter()
                .map(|(b, t)| TickCounts::new(*b, *t))
                .collect(),
        }
    }

    fn builder_with_helper(
        hardware: FakeHardware,
    ) -> (SnapshotBuilder<FakeHardware>, HelperPublisher) {
        let (publisher, reader) = readings_channel();
        (SnapshotBuilder::new(hardware, Some(reader)), publisher)
    }

    fn monitoring(lines: &[&str]) -> HelperReadings {
        let mut readings = HelperReadings::default();
        for line in lines {
            readings.process_line(line, &HelperScale::default());
        }
        readings
    }

    #[test]
    fn test_temperature_derivation() {
        let temps = [0.0, 80.0, 0.0, 90.0];
        assert_eq!(average_temperature(&temps), 85.0);
        assert_eq!(max_temperature(&temps), 90.0);
        assert_eq!(average_temperature(&[0.0, 0.0]), 0.0);
        assert_eq!(max_temperature(&[]), 0.0);
    }

    #[test]
    fn test_load_from_tick_deltas() {
        let hardware = FakeHardware::with_cores(2).with_ticks(vec![
            ticks(&[(0, 100), (0, 100)]),
            ticks(&[(50, 200), (100, 200)]),
        ]);
        let mut builder = SnapshotBuilder::new(hardware, None);

        let snapshot = builder.poll();
        assert_eq!(snapshot.per_core_load, vec![0.5, 1.0]);
        assert!((snapshot.system_load - 0.75).abs() < 1e-9);
        assert_eq!(snapshot.load_level(), corescope_protocol::LoadLevel::High);
    }

    #[test]
    fn test_without_helper_everything_is_zeroed() {
        let mut builder = SnapshotBuilder::new(FakeHardware::with_cores(4), None);
        let snapshot = builder.poll();

        assert_eq!(snapshot.vendor, "Intel");
        assert_eq!(snapshot.per_core_temperature_c, vec![0.0; 4]);
        assert_eq!(snapshot.per_core_voltage, vec![0.0; 4]);
        assert_eq!(snapshot.core_types, vec![CoreType::Performance; 4]);
        assert_eq!(snapshot.temperature_source, ChannelState::Stopped);
        assert_eq!(snapshot.current_frequency_ghz, 3.0);
        assert_eq!(snapshot.max_frequency_ghz, 4.5);
    }

    #[test]
    fn test_helper_values_are_padded_to_logical_cores() {
        let (mut builder, publisher) = builder_with_helper(FakeHardware::with_cores(4));
        publisher.publish(&monitoring(&[
            "INIT,2,100,Test CPU",
            "DATA,50,60,4500,1200,70,4300,1100,1,0,42",
        ]));

        let snapshot = builder.poll();
        assert_eq!(snapshot.per_core_temperature_c, vec![60.0, 70.0, 0.0, 0.0]);
        assert_eq!(snapshot.per_core_frequency_ghz, vec![4.5, 4.3, 0.0, 0.0]);
        assert_eq!(snapshot.per_core_voltage, vec![1.2, 1.1, 0.0, 0.0]);
        assert_eq!(snapshot.core_types.len(), 4);
        assert!((snapshot.current_frequency_ghz - 4.4).abs() < 1e-9);
        assert_eq!(snapshot.max_temperature_c, 70.0);
        assert_eq!(snapshot.average_temperature_c, 65.0);
        assert_eq!(snapshot.package_temperature_c, 50.0);
        assert!(snapshot.thermal_throttle_active);
        assert!(!snapshot.power_throttle_active);
        assert_eq!(snapshot.package_power_watts, 42.0);
        assert_eq!(
            snapshot.temperature_source,
            ChannelState::Monitoring("Test CPU".into())
        );
    }

    #[test]
    fn test_longer_helper_arrays_are_truncated() {
        let (mut builder, publisher) = builder_with_helper(FakeHardware::with_cores(1));
        publisher.publish(&monitoring(&["INIT,3,100,CPU", "DATA,0,40,0,0,50,0,0,60,0,0"]));

        let snapshot = builder.poll();
        assert_eq!(snapshot.per_core_temperature_c, vec![40.0]);
        assert_eq!(snapshot.per_core_load.len(), 1);
        assert_eq!(snapshot.per_core_max_observed_temperature_c.len(), 1);
    }

    #[test]
    fn test_zero_helper_frequencies_keep_os_values() {
        let (mut builder, publisher) = builder_with_helper(FakeHardware::with_cores(2));
        publisher.publish(&monitoring(&["INIT,2,100,CPU", "DATA,0,40,0,0,50,0,0"]));

        let snapshot = builder.poll();
        assert_eq!(snapshot.per_core_frequency_ghz, vec![3.0, 3.0]);
    }

    #[test]
    fn test_stale_values_ignored_after_exit() {
        let (mut builder, publisher) = builder_with_helper(FakeHardware::with_cores(2));
        publisher.publish(&monitoring(&["INIT,2,100,CPU", "DATA,0,40,0,0,50,0,0,1,1,30"]));
        publisher.set_state(ChannelState::Exited);

        let snapshot = builder.poll();
        assert_eq!(snapshot.per_core_temperature_c, vec![0.0, 0.0]);
        assert!(!snapshot.thermal_throttle_active);
        assert_eq!(snapshot.package_power_watts, 0.0);
        assert_eq!(snapshot.temperature_source, ChannelState::Exited);
    }

    #[test]
    fn test_max_observed_is_monotonic_until_reset() {
        let (mut builder, publisher) = builder_with_helper(FakeHardware::with_cores(2));
        let mut readings = monitoring(&["INIT,2,100,CPU"]);
        let mut previous = vec![0.0; 2];

        for line in [
            "DATA,0,50,0,0,60,0,0",
            "DATA,0,70,0,0,40,0,0",
            "DATA,0,30,0,0,20,0,0",
            "DATA,0,65,0,0,90,0,0",
        ] {
            readings.process_line(line, &HelperScale::default());
            publisher.publish(&readings);
            let observed = builder.poll().per_core_max_observed_temperature_c;
            assert!(observed.iter().zip(&previous).all(|(now, before)| now >= before));
            previous = observed;
        }
        assert_eq!(previous, vec![70.0, 90.0]);

        builder.reset_max_observed();
        assert_eq!(builder.poll().per_core_max_observed_temperature_c, vec![65.0, 90.0]);
    }

    #[test]
    fn test_degenerate_identity_is_sanitized() {
        let hardware = FakeHardware {
            identity: CpuIdentity {
                vendor: String::new(),
                model: "  ".into(),
                physical_cores: 8,
                logical_cores: 0,
            },
            frequency: CpuFrequency::default(),
            ..FakeHardware::with_cores(1)
        };
        let snapshot = SnapshotBuilder::new(hardware, None).poll();
        assert_eq!(snapshot.vendor, "Unknown");
        assert_eq!(snapshot.model, "Unknown");
        assert_eq!(snapshot.logical_cores, 1);
        assert_eq!(snapshot.physical_cores, 1);
        assert_eq!(snapshot.per_core_frequency_ghz, vec![0.0]);
    }
}
