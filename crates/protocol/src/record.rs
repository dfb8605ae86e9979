//! Decoding of the helper's stdout lines.
//!
//! Each line is a comma separated record. `INIT` announces the core layout,
//! `DATA` carries one reading per core. Anything else is diagnostic noise from
//! the helper (its stderr is merged into the same stream) and is surfaced as
//! [`HelperLine::Unrecognized`].

use thiserror::Error;

pub const INIT_TAG: &str = "INIT";
pub const DATA_TAG: &str = "DATA";

/// Line index of the first per-core field in a `DATA` record.
pub const DATA_CORE_OFFSET: usize = 2;
/// Temperature, frequency and voltage.
pub const FIELDS_PER_CORE: usize = 3;
/// Thermal throttle, power throttle and package power.
pub const DATA_TRAILER_FIELDS: usize = 3;

pub const DEFAULT_CPU_NAME: &str = "Unknown CPU";

/// Upper bound on an announced core count; anything larger is a corrupt line.
pub const MAX_CORE_COUNT: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("{record} record is missing the {field} field")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    #[error("{field} is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("core count {0} exceeds the supported maximum of {max}", max = MAX_CORE_COUNT)]
    CoreCountOutOfRange(usize),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// One decoded line of helper output.
#[derive(Debug, Clone, PartialEq)]
pub enum HelperLine {
    Init(InitRecord),
    Data(DataRecord),
    Unrecognized(String),
}

impl HelperLine {
    /// Decodes a single line.
    ///
    /// Only `INIT` can fail as a whole: its core count and TjMax are required.
    /// `DATA` never fails; unparsable fields are recorded as missing.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']).trim();
        let tag = line.split(',').next().unwrap_or_default().trim();

        match tag {
            INIT_TAG => InitRecord::parse(line).map(HelperLine::Init),
            DATA_TAG => Ok(HelperLine::Data(DataRecord::parse(line))),
            _ => Ok(HelperLine::Unrecognized(line.to_string())),
        }
    }
}

/// `INIT,<coreCount>,<tjMax>,<cpuName>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitRecord {
    pub core_count: usize,
    pub tj_max: i32,
    pub cpu_name: String,
}

impl InitRecord {
    fn parse(line: &str) -> Result<Self> {
        // The name is last and may itself contain commas.
        let mut parts = line.splitn(4, ',').skip(1);

        let core_count_raw = parts.next().ok_or(ProtocolError::MissingField {
            record: INIT_TAG,
            field: "core count",
        })?;
        let core_count: usize =
            core_count_raw
                .trim()
                .parse()
                .map_err(|_| ProtocolError::InvalidNumber {
                    field: "core count",
                    value: core_count_raw.to_string(),
                })?;
        if core_count > MAX_CORE_COUNT {
            return Err(ProtocolError::CoreCountOutOfRange(core_count));
        }

        let tj_max_raw = parts.next().ok_or(ProtocolError::MissingField {
            record: INIT_TAG,
            field: "TjMax",
        })?;
        let tj_max: i32 = tj_max_raw
            .trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidNumber {
                field: "TjMax",
                value: tj_max_raw.to_string(),
            })?;

        let cpu_name = parts
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_CPU_NAME)
            .to_string();

        Ok(Self {
            core_count,
            tj_max,
            cpu_name,
        })
    }
}

/// Readings for one core. `None` means the field was absent or unparsable.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CoreFields {
    pub temperature: Option<f64>,
    pub frequency: Option<f64>,
    pub voltage: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DataTrailer {
    pub thermal_throttle: Option<bool>,
    pub power_throttle: Option<bool>,
    pub package_power_watts: Option<f64>,
}

/// `DATA,<pkgTemp>,<c0Temp>,<c0Freq>,<c0Volt>,...,<thermal>,<power>,<watts>`
///
/// The record does not know how many cores it describes; callers interpret it
/// against the core count announced by the last `INIT`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataRecord {
    /// Indexed by line position; slot 0 is the tag and always `None`.
    values: Vec<Option<f64>>,
    malformed: Vec<usize>,
}

impl DataRecord {
    fn parse(line: &str) -> Self {
        let mut values = Vec::new();
        let mut malformed = Vec::new();

        for (index, raw) in line.split(',').enumerate() {
            if index == 0 {
                values.push(None);
                continue;
            }
            let raw = raw.trim();
            let value = raw.parse::<f64>().ok().filter(|v| v.is_finite());
            if value.is_none() && !raw.is_empty() {
                malformed.push(index);
            }
            values.push(value);
        }

        Self { values, malformed }
    }

    /// Number of comma separated fields, tag included.
    pub fn field_count(&self) -> usize {
        self.values.len()
    }

    /// Line positions whose text was present but not numeric.
    pub fn malformed_fields(&self) -> &[usize] {
        &self.malformed
    }

    pub fn expected_field_count(core_count: usize) -> usize {
        DATA_CORE_OFFSET + core_count * FIELDS_PER_CORE + DATA_TRAILER_FIELDS
    }

    fn value(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    pub fn package_temperature(&self) -> Option<f64> {
        self.value(1)
    }

    pub fn core(&self, core: usize) -> CoreFields {
        let base = DATA_CORE_OFFSET + core * FIELDS_PER_CORE;
        CoreFields {
            temperature: self.value(base),
            frequency: self.value(base + 1),
            voltage: self.value(base + 2),
        }
    }

    pub fn trailer(&self, core_count: usize) -> DataTrailer {
        let base = DATA_CORE_OFFSET + core_count * FIELDS_PER_CORE;
        DataTrailer {
            thermal_throttle: self.value(base).map(|flag| flag != 0.0),
            power_throttle: self.value(base + 1).map(|flag| flag != 0.0),
            package_power_watts: self.value(base + 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(line: &str) -> DataRecord {
        match HelperLine::parse(line).unwrap() {
            HelperLine::Data(record) => record,
            other => panic!("expected DATA, got {:?}", other),
        }
    }

    #[test]
    fn test_init_parses_all_fields() {
        let line = HelperLine::parse("INIT,8,100,Intel(R) Core(TM) i7-9700K\r\n").unwrap();
        assert_eq!(
            line,
            HelperLine::Init(InitRecord {
                core_count: 8,
                tj_max: 100,
                cpu_name: "Intel(R) Core(TM) i7-9700K".to_string(),
            })
        );
    }

    #[test]
    fn test_init_name_keeps_commas_and_defaults() {
        match HelperLine::parse("INIT,2,95,Vendor, Inc. CPU").unwrap() {
            HelperLine::Init(init) => assert_eq!(init.cpu_name, "Vendor, Inc. CPU"),
            other => panic!("unexpected {:?}", other),
        }
        match HelperLine::parse("INIT,2,95").unwrap() {
            HelperLine::Init(init) => assert_eq!(init.cpu_name, DEFAULT_CPU_NAME),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_init_rejects_non_numeric_fields() {
        assert!(matches!(
            HelperLine::parse("INIT,eight,100,CPU"),
            Err(ProtocolError::InvalidNumber {
                field: "core count",
                ..
            })
        ));
        assert!(matches!(
            HelperLine::parse("INIT,8,hot,CPU"),
            Err(ProtocolError::InvalidNumber { field: "TjMax", .. })
        ));
        assert!(matches!(
            HelperLine::parse("INIT"),
            Err(ProtocolError::MissingField { .. })
        ));
        assert_eq!(
            HelperLine::parse("INIT,100000,100,CPU"),
            Err(ProtocolError::CoreCountOutOfRange(100000))
        );
    }

    #[test]
    fn test_data_core_triplets_and_trailer() {
        let record = data("DATA,48,50,4200,1150,52,4100,1100,1,0,65.5");
        assert_eq!(record.field_count(), DataRecord::expected_field_count(2));
        assert_eq!(record.package_temperature(), Some(48.0));
        assert_eq!(
            record.core(1),
            CoreFields {
                temperature: Some(52.0),
                frequency: Some(4100.0),
                voltage: Some(1100.0),
            }
        );
        assert_eq!(
            record.trailer(2),
            DataTrailer {
                thermal_throttle: Some(true),
                power_throttle: Some(false),
                package_power_watts: Some(65.5),
            }
        );
    }

    #[test]
    fn test_data_bad_field_is_isolated() {
        let record = data("DATA,0,50,abc,1150");
        let core = record.core(0);
        assert_eq!(core.temperature, Some(50.0));
        assert_eq!(core.frequency, None);
        assert_eq!(core.voltage, Some(1150.0));
        assert_eq!(record.malformed_fields(), &[3]);
    }

    #[test]
    fn test_data_short_line_reports_missing_fields() {
        let record = data("DATA,0,50");
        assert_eq!(record.core(0).temperature, Some(50.0));
        assert_eq!(record.core(0).frequency, None);
        assert_eq!(record.core(3), CoreFields::default());
        assert_eq!(record.trailer(4), DataTrailer::default());
    }

    #[test]
    fn test_unrecognized_lines() {
        assert_eq!(
            HelperLine::parse("ERROR: WinRing0 load failed. Run as Admin?").unwrap(),
            HelperLine::Unrecognized("ERROR: WinRing0 load failed. Run as Admin?".into())
        );
        assert_eq!(
            HelperLine::parse("").unwrap(),
            HelperLine::Unrecognized(String::new())
        );
        // Tags are case sensitive.
        assert!(matches!(
            HelperLine::parse("data,1,2").unwrap(),
            HelperLine::Unrecognized(_)
        ));
    }
}
