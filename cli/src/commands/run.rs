use std::path::PathBuf;

use color_eyre::eyre::Result;
use corescope_protocol::MonitorFrame;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::Session;
use crate::config::UserConfig;
use crate::monitor::MonitorHandle;

const EXIT_PROCESS_COUNT: usize = 5;

pub fn run(config: UserConfig, config_file: PathBuf, interval_override: Option<f64>) -> Result<()> {
    super::runtime()?.block_on(run_async(config, config_file, interval_override))
}

async fn run_async(
    config: UserConfig,
    config_file: PathBuf,
    interval_override: Option<f64>,
) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "corescope starting");

    let (config_tx, config_rx) = watch::channel(config.clone());
    let mut session = Session::start(&config, Some(config_rx))?;
    let mut signals = Signals::new()?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            frame = session.handle.changed() => match frame {
                Ok(frame) => log_frame(&frame),
                Err(_) => break,
            },
            result = &mut ctrl_c => {
                match result {
                    Ok(()) => info!("Interrupted, shutting down"),
                    Err(e) => warn!(error = %e, "Ctrl-C handler failed, shutting down"),
                }
                break;
            }
            signal = signals.recv() => match signal {
                Signal::Reload => {
                    let mut reloaded = UserConfig::load_from(&config_file);
                    reloaded.merge_with_args(interval_override);
                    info!(path = %config_file.display(), "Reloading configuration");
                    if let Err(e) = session.apply_helper_config(&reloaded.helper).await {
                        warn!(error = %e, "Failed to apply helper settings");
                    }
                    config_tx.send_replace(reloaded);
                }
                Signal::ResetSession => {
                    if session.handle.reset_session().await.is_err() {
                        break;
                    }
                }
            },
        }
    }

    log_exit_summary(&session.handle).await;
    session.stop().await;
    info!("corescope stopped");
    Ok(())
}

fn log_frame(frame: &MonitorFrame) {
    let snapshot = &frame.snapshot;
    let top = frame.top_processes.first();

    info!(
        sequence = frame.sequence,
        load = %format!("{:.1}%", frame.smoothed_load * 100.0),
        level = snapshot.load_level().label(),
        frequency = %snapshot.formatted_frequency(),
        temperature = %snapshot.formatted_temperature(),
        power_watts = snapshot.package_power_watts,
        throttling = snapshot.thermal_throttle_active,
        memory = %format!("{:.1}%", frame.memory.usage_percent()),
        top_process = top.map(|p| p.name.as_str()).unwrap_or("-"),
        source = %snapshot.temperature_source,
        "Sample"
    );
    debug!(
        context_switches_per_sec = frame.rates.context_switches_per_sec,
        interrupts_per_sec = frame.rates.interrupts_per_sec,
        throttle_events = frame.statistics.throttle_event_count,
        "Kernel activity"
    );
}

async fn log_exit_summary(handle: &MonitorHandle) {
    if let Some(frame) = handle.latest() {
        let stats = &frame.statistics;
        info!(
            samples = stats.sample_count,
            load_avg = %format!("{:.1}%", stats.load_percent.avg),
            load_max = %format!("{:.1}%", stats.load_percent.max),
            max_temperature_c = stats.max_observed_temperature_c,
            throttle_events = stats.throttle_event_count,
            "Session summary"
        );
    }

    match handle.top_processes(EXIT_PROCESS_COUNT).await {
        Ok(processes) => {
            for process in processes {
                info!(
                    pid = process.pid,
                    name = %process.name,
                    cpu = %format!("{:.1}%", process.cpu_percent),
                    "Top process"
                );
            }
        }
        Err(e) => warn!(error = %e, "Could not query top processes"),
    }
}

enum Signal {
    Reload,
    ResetSession,
}

/// SIGHUP reloads the config file, SIGUSR1 starts a new session.
/// Neither exists off unix.
struct Signals {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    #[cfg(unix)]
    user1: tokio::signal::unix::Signal,
}

impl Signals {
    #[cfg(unix)]
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            user1: signal(SignalKind::user_defined1())?,
        })
    }

    #[cfg(not(unix))]
    fn new() -> std::io::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> Signal {
        tokio::select! {
            Some(()) = self.hangup.recv() => Signal::Reload,
            Some(()) = self.user1.recv() => Signal::ResetSession,
            else => std::future::pending().await,
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Signal {
        std::future::pending().await
    }
}
