//! The polling loop.
//!
//! A single task owns the [`Monitor`] and every piece of mutable session
//! state. Consumers talk to it through a [`MonitorHandle`]: frames come out
//! over a watch channel, commands go in over an mpsc queue.

mod scheduler;
mod service;

pub use scheduler::{clamp_interval, PollScheduler};
pub use service::{spawn, Monitor, MonitorCommand, MonitorError, MonitorHandle};
