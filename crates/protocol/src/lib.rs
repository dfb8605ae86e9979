//! Shared types for corescope.
//!
//! This crate holds the decoder for the sensor helper's line protocol and the
//! read model (`HardwareSnapshot`, `MonitorFrame`, ...) that the aggregation
//! core publishes to consumers.

mod channel;
mod record;
mod types;
mod version;

pub use channel::{ChannelState, CoreType};
pub use record::{
    CoreFields, DataRecord, DataTrailer, HelperLine, InitRecord, ProtocolError, DATA_CORE_OFFSET,
    DATA_TAG, DATA_TRAILER_FIELDS, DEFAULT_CPU_NAME, FIELDS_PER_CORE, INIT_TAG, MAX_CORE_COUNT,
};
pub use types::{
    HardwareSnapshot, HistoryPoint, LoadLevel, MemorySnapshot, MemoryStatisticsSummary,
    MonitorFrame, ProcessActivity, StatRange, StatisticsSummary, SystemRates, UNKNOWN,
};
pub use version::{MIN_SUPPORTED_VERSION, PROTOCOL_VERSION};
