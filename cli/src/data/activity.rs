use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use corescope_platform::{ProcessSample, SystemCounters};
use corescope_protocol::{ProcessActivity, SystemRates};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Baseline {
    cpu_time_ms: u64,
    at: Instant,
}

/// Derives per-second kernel rates and per-process CPU share from
/// cumulative counters.
pub struct ProcessActivitySampler {
    excluded: Vec<String>,
    baselines: HashMap<u32, Baseline>,
    last_counters: Option<(SystemCounters, Instant)>,
    rates: SystemRates,
}

impl ProcessActivitySampler {
    pub fn new<S: AsRef<str>>(excluded: &[S]) -> Self {
        Self {
            excluded: lowercase_all(excluded),
            baselines: HashMap::new(),
            last_counters: None,
            rates: SystemRates::default(),
        }
    }

    /// Replaces the exclusion list, keeping baselines.
    pub fn set_excluded<S: AsRef<str>>(&mut self, excluded: &[S]) {
        self.excluded = lowercase_all(excluded);
    }

    fn is_excluded(&self, name: &str) -> bool {
        let name_lower = name.to_lowercase();
        self.excluded.iter().any(|excluded| *excluded == name_lower)
    }

    pub fn rates(&self) -> SystemRates {
        self.rates
    }

    /// Updates context switch and interrupt rates.
    ///
    /// A non-positive elapsed time keeps both the previous rates and the
    /// previous baseline.
    pub fn record_counters(&mut self, counters: SystemCounters, now: Instant) -> SystemRates {
        let Some((previous, at)) = self.last_counters else {
            self.last_counters = Some((counters, now));
            return self.rates;
        };

        let elapsed = now.saturating_duration_since(at).as_secs_f64();
        if elapsed <= 0.0 {
            debug!("Skipping rate update, no time elapsed");
            return self.rates;
        }

        self.rates = SystemRates {
            context_switches_per_sec: per_second(
                counters.context_switches,
                previous.context_switches,
                elapsed,
            ),
            interrupts_per_sec: per_second(counters.interrupts, previous.interrupts, elapsed),
        };
        self.last_counters = Some((counters, now));
        self.rates
    }

    /// Top `n` processes by CPU share since the previous call.
    ///
    /// A process seen for the first time reports 0%.
    pub fn rank(
        &mut self,
        mut samples: Vec<ProcessSample>,
        n: usize,
        logical_cores: usize,
        now: Instant,
    ) -> Vec<ProcessActivity> {
        samples.sort_by(|a, b| {
            b.rank_hint
                .partial_cmp(&a.rank_hint)
                .unwrap_or(Ordering::Equal)
        });

        let cores = logical_cores.max(1) as f64;
        let mut baselines = HashMap::with_capacity(samples.len());
        let mut ranked = Vec::with_capacity(samples.len());

        for sample in samples {
            if self.is_excluded(&sample.name) {
                continue;
            }

            let cpu_percent = match self.baselines.get(&sample.pid) {
                Some(baseline) => {
                    let wall_ms = now.saturating_duration_since(baseline.at).as_secs_f64() * 1000.0;
                    let busy_ms = sample.cpu_time_ms.saturating_sub(baseline.cpu_time_ms) as f64;
                    sanitize_percent(100.0 * (busy_ms / wall_ms) / cores)
                }
                None => 0.0,
            };

            baselines.insert(
                sample.pid,
                Baseline {
                    cpu_time_ms: sample.cpu_time_ms,
                    at: now,
                },
            );
            ranked.push(ProcessActivity {
                name: sample.name,
                cpu_percent,
                pid: sample.pid,
                path: sample.path.map(|p| p.to_string_lossy().to_string()),
            });
        }

        // Exited processes drop out here.
        self.baselines = baselines;

        ranked.sort_by(|a, b| {
            b.cpu_percent
                .partial_cmp(&a.cpu_percent)
                .unwrap_or(Ordering::Equal)
        });
        ranked.truncate(n);
        ranked
    }
}

fn lowercase_all<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names.iter().map(|name| name.as_ref().to_lowercase()).collect()
}

fn per_second(current: u64, previous: u64, elapsed_secs: f64) -> f64 {
    current.saturating_sub(previous) as f64 / elapsed_secs
}

/// Clamps to `[0, 100]`; NaN and infinities become 0.
fn sanitize_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
