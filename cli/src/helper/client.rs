use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use corescope_protocol::ChannelState;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::locate::{HelperLaunch, HelperSource};
use super::readings::{readings_channel, HelperPublisher, HelperReader, HelperReadings, HelperScale};
use crate::config::HelperConfig;

const LINE_BUFFER: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum HelperError {
    #[error("helper executable not found (searched {})", display_paths(.0))]
    NotFound(Vec<PathBuf>),

    #[error("failed to start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("helper {0} was not captured")]
    MissingPipe(&'static str),

    #[error("helper output unreadable: {0}")]
    Read(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, HelperError>;

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

enum StreamEvent {
    Line(String),
    Failed(io::Error),
}

struct Worker {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns one helper process and decodes its output.
///
/// All failures end up in [`ChannelState`]; nothing here returns an error to
/// the caller. Must be used from within a tokio runtime.
pub struct HelperClient {
    source: HelperSource,
    scale: HelperScale,
    stop_timeout: Duration,
    publisher: HelperPublisher,
    reader: HelperReader,
    worker: Option<Worker>,
}

impl HelperClient {
    pub fn new(source: HelperSource, scale: HelperScale, stop_timeout: Duration) -> Self {
        let (publisher, reader) = readings_channel();
        Self {
            source,
            scale,
            stop_timeout,
            publisher,
            reader,
            worker: None,
        }
    }

    pub fn from_config(config: &HelperConfig) -> io::Result<Self> {
        Ok(Self::new(
            HelperSource::from_config(config)?,
            HelperScale::new(config.frequency_divisor, config.voltage_divisor),
            config.stop_timeout(),
        ))
    }

    pub fn reader(&self) -> HelperReader {
        self.reader.clone()
    }

    pub fn state(&self) -> ChannelState {
        self.reader.state()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.task.is_finished())
    }

    /// Launches the helper in the background. No-op while already running.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("Helper already running");
            return;
        }

        self.publisher
            .publish(&HelperReadings::with_state(ChannelState::Initializing));
        info!("Starting helper");

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_worker(
            self.source.clone(),
            self.scale,
            self.stop_timeout,
            self.publisher.clone(),
            stop_rx,
        ));
        self.worker = Some(Worker { stop_tx, task });
    }

    /// Terminates the helper and lands on `Stopped`. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if let Err(e) = worker.task.await {
                if e.is_panic() {
                    error!(error = %e, "Helper worker panicked");
                }
            }
        }
        self.publisher.set_state(ChannelState::Stopped);
    }
}

impl Drop for HelperClient {
    fn drop(&mut self) {
        // The child is kill_on_drop, so aborting the task reaps it.
        if let Some(worker) = self.worker.take() {
            worker.task.abort();
        }
    }
}

async fn run_worker(
    source: HelperSource,
    scale: HelperScale,
    stop_timeout: Duration,
    publisher: HelperPublisher,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut child = match spawn_helper(&source) {
        Ok(child) => child,
        Err(e) => {
            warn!(error = %e, "Helper unavailable");
            publisher.set_state(ChannelState::Error(e.to_string()));
            return;
        }
    };
    info!(pid = child.id(), "Helper process started");
    publisher.set_state(ChannelState::BridgeStarted);

    let mut lines = match forward_output(&mut child) {
        Ok(lines) => lines,
        Err(e) => {
            publisher.set_state(ChannelState::Error(e.to_string()));
            terminate(&mut child, stop_timeout).await;
            return;
        }
    };

    let mut readings = HelperReadings::with_state(ChannelState::BridgeStarted);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => {
                debug!("Helper stop requested");
                terminate(&mut child, stop_timeout).await;
                return;
            }
            event = lines.recv() => match event {
                Some(StreamEvent::Line(line)) => {
                    if readings.process_line(&line, &scale) {
                        publisher.publish(&readings);
                    }
                }
                Some(StreamEvent::Failed(e)) => {
                    let e = HelperError::Read(e);
                    error!(error = %e, "Helper read loop failed");
                    publisher.set_state(ChannelState::Error(e.to_string()));
                    terminate(&mut child, stop_timeout).await;
                    return;
                }
                None => break,
            }
        }
    }

    // Output is closed. A helper that lingers past that is reaped the same way as on stop.
    tokio::select! {
        biased;
        _ = &mut stop_rx => debug!("Helper stop requested after output closed"),
        result = tokio::time::timeout(stop_timeout, child.wait()) => match result {
            Ok(Ok(status)) => info!(%status, "Helper process exited"),
            Ok(Err(e)) => warn!(error = %e, "Failed to reap helper"),
            Err(_) => warn!("Helper closed its output but kept running"),
        },
    }
    terminate(&mut child, stop_timeout).await;
    publisher.set_state(ChannelState::Exited);
}

fn spawn_helper(source: &HelperSource) -> Result<Child> {
    let launch = source.launch().map_err(HelperError::NotFound)?;
    command_for(&launch)
        .spawn()
        .map_err(|source| HelperError::Spawn {
            program: launch.program.clone(),
            source,
        })
}

fn command_for(launch: &HelperLaunch) -> Command {
    let mut command = Command::new(&launch.program);
    command
        .args(&launch.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = launch.working_dir.as_deref().filter(|d| d.is_dir()) {
        command.current_dir(dir);
    }
    command
}

/// Merges stdout and stderr into one line stream. Closes when both end.
fn forward_output(child: &mut Child) -> Result<mpsc::Receiver<StreamEvent>> {
    let stdout = child.stdout.take().ok_or(HelperError::MissingPipe("stdout"))?;
    let stderr = child.stderr.take().ok_or(HelperError::MissingPipe("stderr"))?;

    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    tokio::spawn(read_lines(stdout, tx.clone()));
    tokio::spawn(read_lines(stderr, tx));
    Ok(rx)
}

async fn read_lines<R>(stream: R, tx: mpsc::Sender<StreamEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                // Diagnostics may arrive in a non-UTF-8 code page.
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(StreamEvent::Line(line)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(StreamEvent::Failed(e)).await;
                break;
            }
        }
    }
}

/// Asks the helper to exit, then kills it after `timeout`.
async fn terminate(child: &mut Child, timeout: Duration) {
    if let Ok(Some(status)) = child.try_wait() {
        debug!(%status, "Helper already exited");
        return;
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: `kill` only sends a signal; `pid` is our own live child.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }

    #[cfg(not(unix))]
    let timeout = Duration::ZERO;

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => debug!(%status, "Helper exited after stop"),
        Ok(Err(e)) => warn!(error = %e, "Failed waiting for helper"),
        Err(_) => {
            warn!(
                timeout = %humantime::format_duration(timeout),
                "Helper ignored stop request, killing"
            );
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill helper");
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> HelperSource {
        HelperSource::Fixed(HelperLaunch {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), script.into()],
            working_dir: None,
        })
    }

    async fn wait_for<F>(reader: &mut HelperReader, mut done: F) -> std::sync::Arc<HelperReadings>
    where
        F: FnMut(&HelperReadings) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let latest = reader.latest();
                if done(&latest) {
                    return latest;
                }
                if reader.changed().await.is_err() {
                    return reader.latest();
                }
            }
        })
        .await
        .expect("helper did not reach expected state")
    }

    #[tokio::test]
    async fn test_streams_readings_and_stops() {
        let mut client = HelperClient::new(
            shell(
                "echo 'INIT,2,100,Shell CPU'; \
                 echo 'DATA,40,55,4200,1100,65,4100,1000,1,0,35.5'; \
                 exec sleep 30",
            ),
            HelperScale::default(),
            Duration::from_millis(500),
        );
        let mut reader = client.reader();
        client.start();
        assert!(client.is_running());

        let readings = wait_for(&mut reader, |r| r.temperatures_c == vec![55.0, 65.0]).await;
        assert_eq!(readings.state, ChannelState::Monitoring("Shell CPU".into()));
        assert_eq!(readings.frequencies_ghz, vec![4.2, 4.1]);
        assert!(readings.thermal_throttle);

        client.stop().await;
        assert_eq!(client.state(), ChannelState::Stopped);
        assert!(!client.is_running());

        // Stop is idempotent.
        client.stop().await;
        assert_eq!(client.state(), ChannelState::Stopped);
    }

    #[tokio::test]
    async fn test_exit_is_reported() {
        let mut client = HelperClient::new(
            shell("echo 'INIT,1,100,Brief'; echo 'some diagnostics' >&2"),
            HelperScale::default(),
            Duration::from_millis(500),
        );
        let mut reader = client.reader();
        client.start();

        let readings = wait_for(&mut reader, |r| r.state == ChannelState::Exited).await;
        assert_eq!(readings.state, ChannelState::Exited);
        assert_eq!(readings.core_types.len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_diagnostics_are_skipped() {
        let mut client = HelperClient::new(
            shell(
                "echo 'INIT,1,100,Lossy'; \
                 printf 'diag \\260C\\n' >&2; \
                 sleep 0.2; \
                 echo 'DATA,40,61,3900,1000,0,0,0'; \
                 exec sleep 30",
            ),
            HelperScale::default(),
            Duration::from_millis(500),
        );
        let mut reader = client.reader();
        client.start();

        let readings = wait_for(&mut reader, |r| {
            r.temperatures_c == vec![61.0] || r.state.is_terminal()
        })
        .await;
        assert_eq!(readings.state, ChannelState::Monitoring("Lossy".into()));
        assert_eq!(readings.temperatures_c, vec![61.0]);

        client.stop().await;
    }

    #[tokio::test]
    async fn test_helper_that_closes_output_is_reaped() {
        let mut client = HelperClient::new(
            shell("echo 'INIT,1,100,Detached'; exec >/dev/null 2>&1; exec sleep 20"),
            HelperScale::default(),
            Duration::from_millis(200),
        );
        let mut reader = client.reader();
        client.start();

        let readings = wait_for(&mut reader, |r| r.state == ChannelState::Exited).await;
        assert_eq!(readings.state, ChannelState::Exited);

        tokio::time::timeout(Duration::from_secs(5), client.stop())
            .await
            .expect("stop should not wait for a lingering helper");
        assert_eq!(client.state(), ChannelState::Stopped);
    }

    #[tokio::test]
    async fn test_missing_executable_is_an_error_state() {
        let dir = tempfile::tempdir().unwrap();
        let source = HelperSource::Search {
            locator: crate::helper::HelperLocator::new(dir.path().join("app"), "missing-bridge"),
            args: Vec::new(),
        };
        let mut client =
            HelperClient::new(source, HelperScale::default(), Duration::from_millis(100));
        let mut reader = client.reader();
        client.start();

        let readings = wait_for(&mut reader, |r| matches!(r.state, ChannelState::Error(_))).await;
        match &readings.state {
            ChannelState::Error(message) => assert!(message.contains("not found")),
            other => panic!("unexpected state {:?}", other),
        }
        assert!(readings.temperatures_c.is_empty());
    }

    #[tokio::test]
    async fn test_stubborn_helper_is_killed() {
        let mut client = HelperClient::new(
            shell("trap '' TERM; echo 'INIT,1,100,Stubborn'; while true; do sleep 1; done"),
            HelperScale::default(),
            Duration::from_millis(200),
        );
        let mut reader = client.reader();
        client.start();
        wait_for(&mut reader, |r| r.state.is_monitoring()).await;

        tokio::time::timeout(Duration::from_secs(5), client.stop())
            .await
            .expect("stop should escalate to kill");
        assert_eq!(client.state(), ChannelState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let mut client = HelperClient::new(
            shell("echo 'INIT,1,100,Again'; exec sleep 30"),
            HelperScale::default(),
            Duration::from_millis(500),
        );
        let mut reader = client.reader();

        client.start();
        wait_for(&mut reader, |r| r.state.is_monitoring()).await;
        client.stop().await;

        client.start();
        let readings = wait_for(&mut reader, |r| r.state.is_monitoring()).await;
        assert_eq!(readings.state, ChannelState::Monitoring("Again".into()));
        client.stop().await;
    }
}
