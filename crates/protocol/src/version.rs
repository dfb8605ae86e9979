//! Revisions of the helper's line protocol.
//!
//! # Version History
//!
//! | Version | Changes |
//! |---------|---------|
//! | 1 | `INIT,<cores>,<tjMax>,<name>` and `DATA,<pkg>,<t,f,v>...` per-core triplets |
//! | 2 | `DATA` gains trailing `<thermalThrottle>,<powerThrottle>,<packagePower>` |
//!
//! Version 1 helpers are still accepted: their `DATA` lines simply stop after the
//! last core triplet, so the trailing fields are reported as absent and the
//! previously known flags are kept.
//!
//! The helper never announces its revision, so these constants only document
//! what the decoder understands.

/// Newest helper protocol revision the decoder understands.
pub const PROTOCOL_VERSION: u32 = 2;

/// Oldest helper protocol revision the decoder still accepts.
pub const MIN_SUPPORTED_VERSION: u32 = 1;
