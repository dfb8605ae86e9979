//! Latest values decoded from the helper stream.

use std::sync::Arc;

use corescope_protocol::{ChannelState, CoreType, DataRecord, HelperLine, InitRecord};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const DEFAULT_DIVISOR: f64 = 1000.0;

/// Converts helper units to GHz and volts.
///
/// The helper's frequency unit has not been consistent across releases, so
/// both factors come from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HelperScale {
    frequency_divisor: f64,
    voltage_divisor: f64,
}

impl HelperScale {
    pub fn new(frequency_divisor: f64, voltage_divisor: f64) -> Self {
        Self {
            frequency_divisor: sanitize_divisor(frequency_divisor),
            voltage_divisor: sanitize_divisor(voltage_divisor),
        }
    }

    pub fn frequency_ghz(&self, raw: f64) -> f64 {
        non_negative(raw / self.frequency_divisor)
    }

    pub fn volts(&self, raw: f64) -> f64 {
        non_negative(raw / self.voltage_divisor)
    }
}

impl Default for HelperScale {
    fn default() -> Self {
        Self::new(DEFAULT_DIVISOR, DEFAULT_DIVISOR)
    }
}

fn sanitize_divisor(divisor: f64) -> f64 {
    if divisor.is_finite() && divisor > 0.0 {
        divisor
    } else {
        DEFAULT_DIVISOR
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Everything the helper has told us so far.
///
/// Published as a whole value after every applied line; readers never see a
/// partially updated array.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HelperReadings {
    pub state: ChannelState,
    pub cpu_name: Option<String>,
    pub tj_max: Option<i32>,
    pub package_temperature_c: f64,
    pub temperatures_c: Vec<f64>,
    pub frequencies_ghz: Vec<f64>,
    pub voltages: Vec<f64>,
    pub core_types: Vec<CoreType>,
    pub thermal_throttle: bool,
    pub power_throttle: bool,
    pub package_power_watts: f64,
}

impl HelperReadings {
    pub fn with_state(state: ChannelState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// Core count announced by the last `INIT`.
    pub fn core_count(&self) -> usize {
        self.temperatures_c.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.cpu_name.is_some()
    }

    /// Decodes and applies one raw line. Returns true if anything changed.
    pub fn process_line(&mut self, raw: &str, scale: &HelperScale) -> bool {
        match HelperLine::parse(raw) {
            Ok(HelperLine::Init(init)) => {
                self.apply_init(init);
                true
            }
            Ok(HelperLine::Data(record)) => self.apply_data(&record, scale),
            Ok(HelperLine::Unrecognized(line)) => {
                if !line.is_empty() {
                    debug!(line = %line, "Unrecognized helper output");
                }
                false
            }
            Err(e) => {
                warn!(error = %e, line = raw.trim_end(), "Dropping malformed helper line");
                false
            }
        }
    }

    fn apply_init(&mut self, init: InitRecord) {
        let count = init.core_count;
        info!(
            core_count = count,
            tj_max = init.tj_max,
            cpu = %init.cpu_name,
            "Helper initialized"
        );

        self.temperatures_c = vec![0.0; count];
        self.frequencies_ghz = vec![0.0; count];
        self.voltages = vec![0.0; count];
        self.core_types = vec![CoreType::Performance; count];
        self.package_temperature_c = 0.0;
        self.package_power_watts = 0.0;
        self.thermal_throttle = false;
        self.power_throttle = false;
        self.tj_max = Some(init.tj_max);
        self.state = ChannelState::Monitoring(init.cpu_name.clone());
        self.cpu_name = Some(init.cpu_name);
    }

    fn apply_data(&mut self, record: &DataRecord, scale: &HelperScale) -> bool {
        if !self.is_initialized() {
            debug!("Ignoring DATA before INIT");
            return false;
        }

        if !record.malformed_fields().is_empty() {
            debug!(fields = ?record.malformed_fields(), "Skipping non-numeric helper fields");
        }

        if let Some(temp) = record.package_temperature() {
            self.package_temperature_c = temp;
        }

        // Build replacements first so a short line only touches what it carries.
        let mut temperatures = self.temperatures_c.clone();
        let mut frequencies = self.frequencies_ghz.clone();
        let mut voltages = self.voltages.clone();

        for core in 0..self.core_count() {
            let fields = record.core(core);
            if let Some(temp) = fields.temperature {
                temperatures[core] = temp;
            }
            if let Some(freq) = fields.frequency {
                frequencies[core] = scale.frequency_ghz(freq);
            }
            if let Some(volt) = fields.voltage {
                voltages[core] = scale.volts(volt);
            }
        }

        self.temperatures_c = temperatures;
        self.frequencies_ghz = frequencies;
        self.voltages = voltages;

        let trailer = record.trailer(self.core_count());
        if let Some(flag) = trailer.thermal_throttle {
            self.thermal_throttle = flag;
        }
        if let Some(flag) = trailer.power_throttle {
            self.power_throttle = flag;
        }
        if let Some(watts) = trailer.package_power_watts {
            self.package_power_watts = watts.max(0.0);
        }

        true
    }
}

/// Single writer side of the readings channel.
#[derive(Debug, Clone)]
pub struct HelperPublisher {
    tx: watch::Sender<Arc<HelperReadings>>,
}

impl HelperPublisher {
    pub fn publish(&self, readings: &HelperReadings) {
        self.tx.send_replace(Arc::new(readings.clone()));
    }

    /// Replaces only the state, keeping the last decoded values.
    pub fn set_state(&self, state: ChannelState) {
        self.tx.send_if_modified(|current| {
            if current.state == state {
                return false;
            }
            info!(from = %current.state, to = %state, "Helper state changed");
            let mut next = HelperReadings::clone(current);
            next.state = state;
            *current = Arc::new(next);
            true
        });
    }

    pub fn reader(&self) -> HelperReader {
        HelperReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Cheap, cloneable view of the latest readings.
#[derive(Debug, Clone)]
pub struct HelperReader {
    rx: watch::Receiver<Arc<HelperReadings>>,
}

impl HelperReader {
    pub fn latest(&self) -> Arc<HelperReadings> {
        self.rx.borrow().clone()
    }

    pub fn state(&self) -> ChannelState {
        self.rx.borrow().state.clone()
    }

    /// Waits for the next publish. Errors once the publisher is gone.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}

pub fn readings_channel() -> (HelperPublisher, HelperReader) {
    let (tx, rx) = watch::channel(Arc::new(HelperReadings::default()));
    (HelperPublisher { tx }, HelperReader { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized(cores: usize) -> HelperReadings {
        let mut readings = HelperReadings::default();
        assert!(readings.process_line(
            &format!("INIT,{},100,Test CPU", cores),
            &HelperScale::default()
        ));
        readings
    }

    #[test]
    fn test_init_sizes_every_array() {
        for cores in [0, 1, 6, 24] {
            let readings = initialized(cores);
            assert_eq!(readings.temperatures_c.len(), cores);
            assert_eq!(readings.frequencies_ghz.len(), cores);
            assert_eq!(readings.voltages.len(), cores);
            assert_eq!(readings.core_types.len(), cores);
            assert!(readings.core_types.iter().all(|t| t.as_str() == "P"));
            assert_eq!(
                readings.state,
                ChannelState::Monitoring("Test CPU".to_string())
            );
        }
    }

    #[test]
    fn test_reinit_resizes_and_clears() {
        let scale = HelperScale::default();
        let mut readings = initialized(4);
        readings.process_line(
            "DATA,40,50,4000,1100,51,4000,1100,52,4000,1100,53,4000,1100,0,0,30",
            &scale,
        );
        readings.process_line("INIT,2,95,Other CPU", &scale);
        assert_eq!(readings.temperatures_c, vec![0.0, 0.0]);
        assert_eq!(readings.tj_max, Some(95));
    }

    #[test]
    fn test_reinit_resets_package_readings() {
        let scale = HelperScale::default();
        let mut readings = initialized(1);
        readings.process_line("DATA,72,70,4000,1100,1,1,88.5", &scale);
        assert!(readings.thermal_throttle);
        assert!(readings.power_throttle);
        assert_eq!(readings.package_temperature_c, 72.0);

        readings.process_line("INIT,1,100,Test CPU", &scale);
        assert!(!readings.thermal_throttle);
        assert!(!readings.power_throttle);
        assert_eq!(readings.package_power_watts, 0.0);
        assert_eq!(readings.package_temperature_c, 0.0);
    }

    #[test]
    fn test_data_applies_scale() {
        let scale = HelperScale::default();
        let mut readings = initialized(2);
        readings.process_line("DATA,45,50,4200,1150,60,3800,1000,1,0,65.5", &scale);

        assert_eq!(readings.package_temperature_c, 45.0);
        assert_eq!(readings.temperatures_c, vec![50.0, 60.0]);
        assert_eq!(readings.frequencies_ghz, vec![4.2, 3.8]);
        assert_eq!(readings.voltages, vec![1.15, 1.0]);
        assert!(readings.thermal_throttle);
        assert!(!readings.power_throttle);
        assert_eq!(readings.package_power_watts, 65.5);
    }

    #[test]
    fn test_short_data_retains_prior_values() {
        let scale = HelperScale::default();
        let mut readings = initialized(3);
        readings.process_line("DATA,45,50,4000,1100,51,4100,1110,52,4200,1120,1,1,70", &scale);
        let before = readings.clone();

        // Only core 0's temperature and frequency.
        assert!(readings.process_line("DATA,46,70,4500", &scale));

        assert_eq!(readings.temperatures_c, vec![70.0, 51.0, 52.0]);
        assert_eq!(readings.frequencies_ghz, vec![4.5, 4.1, 4.2]);
        assert_eq!(readings.voltages, before.voltages);
        assert!(readings.thermal_throttle);
        assert!(readings.power_throttle);
        assert_eq!(readings.package_power_watts, 70.0);
    }

    #[test]
    fn test_bad_field_keeps_rest_of_line() {
        let scale = HelperScale::default();
        let mut readings = initialized(2);
        readings.process_line("DATA,45,50,oops,1100,60,3000,1000,0,0,20", &scale);
        assert_eq!(readings.temperatures_c, vec![50.0, 60.0]);
        assert_eq!(readings.frequencies_ghz, vec![0.0, 3.0]);
        assert_eq!(readings.package_power_watts, 20.0);
    }

    #[test]
    fn test_data_before_init_is_ignored() {
        let mut readings = HelperReadings::default();
        assert!(!readings.process_line("DATA,45,50,4000,1100", &HelperScale::default()));
        assert_eq!(readings, HelperReadings::default());
    }

    #[test]
    fn test_noise_and_malformed_init_do_not_change_state() {
        let scale = HelperScale::default();
        let mut readings = initialized(2);
        let before = readings.clone();
        assert!(!readings.process_line("ERROR: driver not loaded", &scale));
        assert!(!readings.process_line("INIT,two,100,CPU", &scale));
        assert_eq!(readings, before);
    }

    #[test]
    fn test_scale_rejects_bad_divisors() {
        let scale = HelperScale::new(0.0, f64::NAN);
        assert_eq!(scale, HelperScale::default());
        assert_eq!(HelperScale::new(1.0, 1.0).frequency_ghz(-5.0), 0.0);
    }

    #[test]
    fn test_publisher_replaces_whole_value() {
        let (publisher, reader) = readings_channel();
        let held = reader.latest();

        let readings = initialized(2);
        publisher.publish(&readings);
        assert_eq!(*reader.latest(), readings);
        assert_eq!(*held, HelperReadings::default());

        publisher.set_state(ChannelState::Exited);
        let latest = reader.latest();
        assert_eq!(latest.state, ChannelState::Exited);
        assert_eq!(latest.temperatures_c.len(), 2);
    }
}
