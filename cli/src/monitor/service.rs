use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use corescope_platform::HardwareProvider;
use corescope_protocol::{MemorySnapshot, MonitorFrame, ProcessActivity};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use super::scheduler::{clamp_interval, PollScheduler};
use crate::config::UserConfig;
use crate::data::{
    memory_snapshot, LoadHistory, LoadSmoother, MemorySessionStatistics, ProcessActivitySampler,
    SessionStatistics, SnapshotBuilder,
};
use crate::helper::HelperReader;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("monitor task has stopped")]
    Closed,
}

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Debug)]
pub enum MonitorCommand {
    ResetSession,
    SetPollInterval(Duration),
    SetHelper(Option<HelperReader>),
    TopProcesses {
        count: usize,
        reply: oneshot::Sender<Vec<ProcessActivity>>,
    },
    Shutdown,
}

/// The aggregation pipeline for one session.
///
/// Not thread safe by itself; [`spawn`] gives it a single owning task.
pub struct Monitor<P> {
    builder: SnapshotBuilder<P>,
    smoother: LoadSmoother,
    statistics: SessionStatistics,
    memory_statistics: MemorySessionStatistics,
    activity: ProcessActivitySampler,
    history: LoadHistory,
    poll_interval: Duration,
    process_count: usize,
    sequence: u64,
    started: Instant,
}

impl<P: HardwareProvider> Monitor<P> {
    pub fn new(provider: P, helper: Option<HelperReader>, config: &UserConfig) -> Self {
        Self {
            builder: SnapshotBuilder::new(provider, helper),
            smoother: LoadSmoother::default(),
            statistics: SessionStatistics::new(),
            memory_statistics: MemorySessionStatistics::default(),
            activity: ProcessActivitySampler::new(&config.effective_excluded_processes()),
            history: LoadHistory::new(config.history_window()),
            poll_interval: config.poll_interval(),
            process_count: config.process_count,
            sequence: 0,
            started: Instant::now(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Polls every source once and folds the results into the session.
    pub fn tick(&mut self) -> MonitorFrame {
        let now = Instant::now();

        let snapshot = self.builder.poll();
        let smoothed_load = self.smoother.update(snapshot.system_load);
        self.statistics
            .update(&snapshot, smoothed_load, snapshot.package_power_watts);

        let memory = self.sample_memory();
        self.memory_statistics.update(&memory);

        let rates = match self.builder.provider_mut().system_counters() {
            Ok(Some(counters)) => self.activity.record_counters(counters, now.into_std()),
            Ok(None) => self.activity.rates(),
            Err(e) => {
                warn!(error = %e, "Failed to read system counters");
                self.activity.rates()
            }
        };

        let top_processes = self.sample_processes(self.process_count, now);

        self.history
            .record(now.duration_since(self.started), smoothed_load * 100.0);
        self.sequence += 1;

        MonitorFrame {
            sequence: self.sequence,
            timestamp: Utc::now(),
            snapshot,
            smoothed_load,
            statistics: self.statistics.summary(),
            memory,
            memory_statistics: self.memory_statistics.summary(),
            rates,
            top_processes,
            history: self.history.points(),
        }
    }

    /// Starts a new statistics session. Load smoothing carries over.
    pub fn reset_session(&mut self) {
        self.statistics.reset();
        self.memory_statistics.reset();
        self.builder.reset_max_observed();
        info!("Session statistics reset");
    }

    pub fn top_processes(&mut self, count: usize) -> Vec<ProcessActivity> {
        self.sample_processes(count, Instant::now())
    }

    /// Stores a clamped interval and returns it.
    pub fn set_poll_interval(&mut self, interval: Duration) -> Duration {
        self.poll_interval = clamp_interval(interval.as_secs_f64());
        self.poll_interval
    }

    /// Replaces the helper readings source, e.g. after the helper was rebuilt.
    pub fn set_helper(&mut self, helper: Option<HelperReader>) {
        self.builder.set_helper(helper);
    }

    /// Applies a reloaded configuration. Returns the new poll interval if it changed.
    pub fn apply_config(&mut self, config: &UserConfig) -> Option<Duration> {
        self.process_count = config.process_count;
        self.history.set_window(config.history_window());
        self.activity
            .set_excluded(&config.effective_excluded_processes());

        let interval = config.poll_interval();
        if interval != self.poll_interval {
            self.poll_interval = interval;
            Some(interval)
        } else {
            None
        }
    }

    fn sample_memory(&mut self) -> MemorySnapshot {
        match self.builder.provider_mut().memory() {
            Ok(info) => memory_snapshot(&info),
            Err(e) => {
                warn!(error = %e, "Failed to read memory");
                MemorySnapshot::default()
            }
        }
    }

    fn sample_processes(&mut self, count: usize, now: Instant) -> Vec<ProcessActivity> {
        let logical_cores = self.builder.identity().logical_cores;
        match self.builder.provider_mut().processes() {
            Ok(samples) => self
                .activity
                .rank(samples, count, logical_cores, now.into_std()),
            Err(e) => {
                warn!(error = %e, "Failed to read process list");
                Vec::new()
            }
        }
    }
}

/// Cloneable client for a running monitor task.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<MonitorCommand>,
    frames: watch::Receiver<Option<Arc<MonitorFrame>>>,
}

impl MonitorHandle {
    /// Most recent frame, `None` before the first tick.
    pub fn latest(&self) -> Option<Arc<MonitorFrame>> {
        self.frames.borrow().clone()
    }

    /// Waits for a frame newer than the last one seen by this handle.
    pub async fn changed(&mut self) -> Result<Arc<MonitorFrame>> {
        loop {
            self.frames
                .changed()
                .await
                .map_err(|_| MonitorError::Closed)?;
            if let Some(frame) = self.frames.borrow_and_update().clone() {
                return Ok(frame);
            }
        }
    }

    /// Every new frame as a stream. Ends when the monitor stops.
    pub fn frames(&self) -> impl Stream<Item = Arc<MonitorFrame>> {
        WatchStream::from_changes(self.frames.clone()).filter_map(|frame| frame)
    }

    pub async fn reset_session(&self) -> Result<()> {
        self.send(MonitorCommand::ResetSession).await
    }

    pub async fn set_poll_interval(&self, interval: Duration) -> Result<()> {
        self.send(MonitorCommand::SetPollInterval(interval)).await
    }

    pub async fn set_helper(&self, helper: Option<HelperReader>) -> Result<()> {
        self.send(MonitorCommand::SetHelper(helper)).await
    }

    pub async fn top_processes(&self, count: usize) -> Result<Vec<ProcessActivity>> {
        let (reply, rx) = oneshot::channel();
        self.send(MonitorCommand::TopProcesses { count, reply })
            .await?;
        rx.await.map_err(|_| MonitorError::Closed)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(MonitorCommand::Shutdown).await
    }

    async fn send(&self, command: MonitorCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| MonitorError::Closed)
    }
}

/// Runs `monitor` on its own task.
///
/// `config` delivers reloaded settings. The task ends on
/// [`MonitorHandle::shutdown`] or when every handle is dropped.
pub fn spawn<P>(
    monitor: Monitor<P>,
    config: Option<watch::Receiver<UserConfig>>,
) -> (MonitorHandle, JoinHandle<()>)
where
    P: HardwareProvider + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (frame_tx, frame_rx) = watch::channel(None);

    let task = tokio::spawn(run(monitor, command_rx, config, frame_tx));
    let handle = MonitorHandle {
        commands: command_tx,
        frames: frame_rx,
    };
    (handle, task)
}

async fn run<P: HardwareProvider>(
    mut monitor: Monitor<P>,
    mut commands: mpsc::Receiver<MonitorCommand>,
    mut config: Option<watch::Receiver<UserConfig>>,
    frames: watch::Sender<Option<Arc<MonitorFrame>>>,
) {
    let mut scheduler = PollScheduler::new(monitor.poll_interval());
    info!(
        interval = %humantime::format_duration(scheduler.period()),
        "Monitor started"
    );

    loop {
        tokio::select! {
            _ = scheduler.tick() => {
                let frame = monitor.tick();
                debug!(sequence = frame.sequence, load = frame.smoothed_load, "Frame published");
                frames.send_replace(Some(Arc::new(frame)));
            }
            command = commands.recv() => match command {
                Some(MonitorCommand::ResetSession) => monitor.reset_session(),
                Some(MonitorCommand::SetPollInterval(interval)) => {
                    let interval = monitor.set_poll_interval(interval);
                    scheduler.set_period(interval);
                }
                Some(MonitorCommand::SetHelper(helper)) => monitor.set_helper(helper),
                Some(MonitorCommand::TopProcesses { count, reply }) => {
                    let _ = reply.send(monitor.top_processes(count));
                }
                Some(MonitorCommand::Shutdown) | None => break,
            },
            reloaded = next_config(&mut config) => match reloaded {
                Some(reloaded) => {
                    if let Some(interval) = monitor.apply_config(&reloaded) {
                        scheduler.set_period(interval);
                    }
                    info!("Configuration reloaded");
                }
                None => {
                    debug!("Configuration source closed");
                    config = None;
                }
            },
        }
    }

    info!("Monitor stopped");
}

/// Next configuration value, or `None` once the sender is gone.
/// Pends forever without a source.
async fn next_config(config: &mut Option<watch::Receiver<UserConfig>>) -> Option<UserConfig> {
    match config {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FakeHardware;
    use crate::helper::{readings_channel, HelperReadings, HelperScale};
    use corescope_platform::{ProcessSample, SystemCounters};
    use corescope_protocol::ChannelState;

    fn process(pid: u32, name: &str, cpu_time_ms: u64) -> ProcessSample {
        ProcessSample {
            pid,
            name: name.into(),
            path: Some(format!("/usr/bin/{}", name).into()),
            cpu_time_ms,
            rank_hint: 0.0,
        }
    }

    fn config() -> UserConfig {
        UserConfig {
            poll_interval_secs: 1.0,
            process_count: 2,
            history_window_secs: 5,
            ..UserConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_assembles_frame() {
        let hardware = FakeHardware::with_cores(2)
            .with_counters(vec![
                SystemCounters {
                    context_switches: 0,
                    interrupts: 0,
                },
                SystemCounters {
                    context_switches: 5_000,
                    interrupts: 1_000,
                },
            ])
            .with_processes(vec![
                vec![process(10, "idle", 0), process(11, "build", 0), process(12, "shell", 0)],
                vec![
                    process(10, "Idle", 2_000),
                    process(11, "build", 1_000),
                    process(12, "shell", 100),
                ],
            ]);
        let (publisher, reader) = readings_channel();
        let mut readings = HelperReadings::default();
        readings.process_line("INIT,2,100,Fake", &HelperScale::default());
        readings.process_line("DATA,50,60,0,1000,70,0,1000,1,0,40", &HelperScale::default());
        publisher.publish(&readings);

        let mut monitor = Monitor::new(hardware, Some(reader), &config());
        let first = monitor.tick();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.snapshot.max_temperature_c, 70.0);
        assert_eq!(first.statistics.sample_count, 1);
        assert_eq!(first.statistics.throttle_event_count, 1);
        assert_eq!(first.memory.usage_percent(), 75.0);
        assert!(first.top_processes.iter().all(|p| p.cpu_percent == 0.0));

        tokio::time::advance(Duration::from_secs(1)).await;
        let second = monitor.tick();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.rates.context_switches_per_sec, 5_000.0);
        assert_eq!(second.rates.interrupts_per_sec, 1_000.0);
        assert_eq!(second.top_processes.len(), 2);
        assert_eq!(second.top_processes[0].name, "build");
        assert!((second.top_processes[0].cpu_percent - 50.0).abs() < 1e-9);
        assert!((second.top_processes[1].cpu_percent - 5.0).abs() < 1e-9);
        assert_eq!(second.history.len(), 2);
        assert_eq!(second.statistics.throttle_event_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_session_clears_statistics() {
        let (publisher, reader) = readings_channel();
        let mut readings = HelperReadings::default();
        readings.process_line("INIT,1,100,Fake", &HelperScale::default());
        readings.process_line("DATA,0,90,0,0", &HelperScale::default());
        publisher.publish(&readings);

        let mut monitor = Monitor::new(FakeHardware::with_cores(1), Some(reader), &config());
        monitor.tick();
        monitor.reset_session();

        readings.process_line("DATA,0,40,0,0", &HelperScale::default());
        publisher.publish(&readings);
        let frame = monitor.tick();
        assert_eq!(frame.statistics.sample_count, 1);
        assert_eq!(frame.statistics.max_observed_temperature_c, 40.0);
        assert_eq!(frame.snapshot.per_core_max_observed_temperature_c, vec![40.0]);
        assert_eq!(frame.memory_statistics.sample_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_respects_window() {
        let mut monitor = Monitor::new(FakeHardware::with_cores(1), None, &config());
        for _ in 0..10 {
            monitor.tick();
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        let frame = monitor.tick();
        assert_eq!(frame.history.len(), 6);
        assert_eq!(frame.snapshot.temperature_source, ChannelState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_drives_running_monitor() {
        let hardware = FakeHardware::with_cores(2).with_processes(vec![vec![
            process(1, "a", 0),
            process(2, "b", 0),
            process(3, "c", 0),
        ]]);
        let monitor = Monitor::new(hardware, None, &config());
        let (mut handle, task) = spawn(monitor, None);

        let first = handle.changed().await.unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(handle.latest().unwrap().sequence, 1);

        let start = Instant::now();
        let second = handle.changed().await.unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(start.elapsed(), Duration::from_secs(1));

        let top = handle.top_processes(5).await.unwrap();
        assert_eq!(top.len(), 3);

        handle.reset_session().await.unwrap();
        let third = handle.changed().await.unwrap();
        assert_eq!(third.statistics.sample_count, 1);

        handle.set_poll_interval(Duration::from_secs(4)).await.unwrap();
        let start = Instant::now();
        handle.changed().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(4));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(handle.changed().await, Err(MonitorError::Closed)));
        assert!(matches!(
            handle.reset_session().await,
            Err(MonitorError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_helper_switches_temperature_source() {
        let monitor = Monitor::new(FakeHardware::with_cores(1), None, &config());
        let (mut handle, task) = spawn(monitor, None);
        let first = handle.changed().await.unwrap();
        assert_eq!(first.snapshot.temperature_source, ChannelState::Stopped);
        assert_eq!(first.snapshot.max_temperature_c, 0.0);

        let (publisher, reader) = readings_channel();
        let mut readings = HelperReadings::default();
        readings.process_line("INIT,1,100,Rebuilt", &HelperScale::default());
        readings.process_line("DATA,0,66,0,0", &HelperScale::default());
        publisher.publish(&readings);

        handle.set_helper(Some(reader)).await.unwrap();
        let frame = handle.changed().await.unwrap();
        assert_eq!(
            frame.snapshot.temperature_source,
            ChannelState::Monitoring("Rebuilt".into())
        );
        assert_eq!(frame.snapshot.max_temperature_c, 66.0);

        handle.set_helper(None).await.unwrap();
        let frame = handle.changed().await.unwrap();
        assert_eq!(frame.snapshot.temperature_source, ChannelState::Stopped);
        assert_eq!(frame.snapshot.max_temperature_c, 0.0);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_reload_changes_interval() {
        let (config_tx, config_rx) = watch::channel(config());
        let monitor = Monitor::new(FakeHardware::with_cores(1), None, &config());
        let (mut handle, task) = spawn(monitor, Some(config_rx));
        handle.changed().await.unwrap();

        config_tx.send_modify(|config| config.poll_interval_secs = 2.0);
        tokio::task::yield_now().await;
        let start = Instant::now();
        handle.changed().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));

        // Dropping the source does not stop the monitor.
        drop(config_tx);
        handle.changed().await.unwrap();

        drop(handle);
        task.await.unwrap();
    }
}
