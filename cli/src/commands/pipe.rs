use std::io::Write;
use std::time::Duration;

use color_eyre::eyre::Result;
use corescope_protocol::MonitorFrame;
use tokio_stream::StreamExt;
use tracing::info;

use super::Session;
use crate::config::UserConfig;
use crate::monitor::MonitorHandle;

/// Prints one JSON document per frame. `samples == 0` runs until interrupted.
pub fn run(
    config: UserConfig,
    samples: u32,
    interval_ms: Option<u64>,
    compact: bool,
) -> Result<()> {
    super::runtime()?.block_on(async {
        let session = Session::start(&config, None)?;
        let result = emit(&session.handle, samples, interval_ms, compact).await;
        session.stop().await;
        result
    })
}

async fn emit(
    handle: &MonitorHandle,
    samples: u32,
    interval_ms: Option<u64>,
    compact: bool,
) -> Result<()> {
    let frames = handle.frames();
    tokio::pin!(frames);

    // Clamped to the supported range by the monitor.
    if let Some(ms) = interval_ms {
        handle.set_poll_interval(Duration::from_millis(ms)).await?;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut emitted = 0u32;
    loop {
        tokio::select! {
            frame = frames.next() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                write_frame(&frame, compact)?;

                emitted += 1;
                if samples > 0 && emitted >= samples {
                    return Ok(());
                }
            }
            result = &mut ctrl_c => {
                info!("Interrupted");
                return Ok(result?);
            }
        }
    }
}

fn write_frame(frame: &MonitorFrame, compact: bool) -> Result<()> {
    let doc = if compact {
        frame.to_json()?
    } else {
        frame.to_json_pretty()?
    };

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", doc)?;
    stdout.flush()?;
    Ok(())
}
