//! Client for the out-of-process sensor helper.
//!
//! The helper prints `INIT`/`DATA` lines on stdout. [`HelperClient`] owns the
//! child process, decodes its output on a background task and publishes each
//! new [`HelperReadings`] value through a watch channel.

mod client;
mod locate;
mod readings;

pub use client::{HelperClient, HelperError};
pub use locate::{HelperLaunch, HelperLocator, HelperSource};
pub use readings::{readings_channel, HelperPublisher, HelperReader, HelperReadings, HelperScale};
