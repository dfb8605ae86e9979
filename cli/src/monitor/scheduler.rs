use std::time::Duration;

use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(300);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Converts a configured period in seconds to a usable interval.
pub fn clamp_interval(secs: f64) -> Duration {
    if !secs.is_finite() {
        return DEFAULT_POLL_INTERVAL;
    }
    Duration::from_secs_f64(secs.clamp(0.0, MAX_POLL_INTERVAL.as_secs_f64()))
        .clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

/// One periodic timer. Changing the period replaces it; there is never more
/// than one pending tick.
pub struct PollScheduler {
    interval: Interval,
    period: Duration,
}

impl PollScheduler {
    /// First tick fires immediately.
    pub fn new(period: Duration) -> Self {
        let period = period.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }

    /// Restarts the timer with a new period, first tick one period from now.
    /// Returns false if the period did not change.
    pub fn set_period(&mut self, period: Duration) -> bool {
        let period = period.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        if period == self.period {
            return false;
        }

        debug!(
            from = %humantime::format_duration(self.period),
            to = %humantime::format_duration(period),
            "Poll interval changed"
        );
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = interval;
        self.period = period;
        true
    }
}
