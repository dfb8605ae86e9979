use std::collections::VecDeque;
use std::time::Duration;

use corescope_protocol::HistoryPoint;

/// Smoothed load points within a sliding time window.
#[derive(Debug, Clone)]
pub struct LoadHistory {
    window: Duration,
    points: VecDeque<HistoryPoint>,
}

impl LoadHistory {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            points: VecDeque::new(),
        }
    }

    /// Appends a point and drops those older than the window.
    pub fn record(&mut self, elapsed: Duration, load_percent: f64) {
        let elapsed_secs = elapsed.as_secs_f64();
        self.points.push_back(HistoryPoint {
            elapsed_secs,
            load_percent,
        });
        self.trim(elapsed_secs);
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
        if let Some(last) = self.points.back().map(|p| p.elapsed_secs) {
            self.trim(last);
        }
    }

    pub fn points(&self) -> Vec<HistoryPoint> {
        self.points.iter().copied().collect()
    }

    fn trim(&mut self, now_secs: f64) {
        let cutoff = now_secs - self.window.as_secs_f64();
        while self
            .points
            .front()
            .is_some_and(|point| point.elapsed_secs < cutoff)
        {
            self.points.pop_front();
        }
    }
}
