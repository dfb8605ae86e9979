pub mod config;
pub mod debug;
pub mod pipe;
pub mod run;

use color_eyre::eyre::Result;
use corescope_platform::HardwareProvider;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{HelperConfig, UserConfig};
use crate::data::PlatformHardware;
use crate::helper::HelperClient;
use crate::monitor::{self, Monitor, MonitorHandle};

/// A running helper plus monitor pair.
pub struct Session {
    pub handle: MonitorHandle,
    helper: Option<HelperClient>,
    helper_config: HelperConfig,
    task: JoinHandle<()>,
}

impl Session {
    /// Starts the helper (when enabled) and the monitor task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &UserConfig,
        updates: Option<watch::Receiver<UserConfig>>,
    ) -> Result<Self> {
        if !PlatformHardware::is_supported() {
            warn!("Platform hardware source reports it is unsupported, readings may be empty");
        }
        let provider = PlatformHardware::new()?;
        let helper = start_helper(&config.helper)?;

        let monitor = Monitor::new(provider, helper.as_ref().map(HelperClient::reader), config);
        let (handle, task) = monitor::spawn(monitor, updates);

        Ok(Self {
            handle,
            helper,
            helper_config: config.helper.clone(),
            task,
        })
    }

    /// Restarts the helper when its settings changed and points the monitor
    /// at the new readings.
    pub async fn apply_helper_config(&mut self, config: &HelperConfig) -> Result<()> {
        if *config == self.helper_config {
            return Ok(());
        }

        info!(enabled = config.enabled, "Helper settings changed, restarting helper");
        if let Some(mut old) = self.helper.take() {
            old.stop().await;
        }
        self.helper_config = config.clone();

        self.helper = start_helper(config)?;
        let reader = self.helper.as_ref().map(HelperClient::reader);
        self.handle.set_helper(reader).await?;
        Ok(())
    }

    /// Stops the monitor, then the helper.
    pub async fn stop(mut self) {
        // Already gone if the task ended on its own.
        let _ = self.handle.shutdown().await;
        if let Err(e) = self.task.await {
            error!(error = %e, "Monitor task failed");
        }

        if let Some(helper) = self.helper.as_mut() {
            helper.stop().await;
        }
    }
}

fn start_helper(config: &HelperConfig) -> Result<Option<HelperClient>> {
    if !config.enabled {
        info!("Helper disabled, temperatures will not be reported");
        return Ok(None);
    }
    let mut client = HelperClient::from_config(config)?;
    client.start();
    Ok(Some(client))
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
