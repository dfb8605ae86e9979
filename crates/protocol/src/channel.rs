use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection state of the sensor helper process.
///
/// Transitions are driven by the helper client's read loop. The only external
/// transition is an explicit stop, which always lands on `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ChannelState {
    #[default]
    Stopped,
    Initializing,
    BridgeStarted,
    /// Receiving data; carries the CPU name announced by `INIT`.
    Monitoring(String),
    Exited,
    Error(String),
}

impl ChannelState {
    pub fn label(&self) -> String {
        match self {
            ChannelState::Stopped => "Stopped".to_string(),
            ChannelState::Initializing => "Initializing...".to_string(),
            ChannelState::BridgeStarted => "Bridge Started".to_string(),
            ChannelState::Monitoring(device) => format!("Monitoring ({})", device),
            ChannelState::Exited => "Bridge Process Exited".to_string(),
            ChannelState::Error(message) => format!("Error: {}", message),
        }
    }

    /// Only a monitoring channel has per-core data worth reading.
    pub fn is_monitoring(&self) -> bool {
        matches!(self, ChannelState::Monitoring(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChannelState::Stopped | ChannelState::Exited | ChannelState::Error(_)
        )
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Core microarchitecture class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CoreType {
    #[default]
    #[serde(rename = "P")]
    Performance,
    #[serde(rename = "E")]
    Efficiency,
}

impl CoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoreType::Performance => "P",
            CoreType::Efficiency => "E",
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "E" | "e" => CoreType::Efficiency,
            _ => CoreType::Performance,
        }
    }
}

impl fmt::Display for CoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
