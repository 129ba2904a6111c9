use std::fmt;

use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    Starting,
    Running,
    Stopping,
    Offline,
    Missing,
    Crashed,
    Unknown,
}

impl From<&str> for ServerState {
    fn from(state: &str) -> Self {
        match state.trim().to_lowercase().as_str() {
            "starting" => ServerState::Starting,
            "running" => ServerState::Running,
            "stopping" => ServerState::Stopping,
            "stopped" | "offline" => ServerState::Offline,
            "missing" => ServerState::Missing,
            "crashed" => ServerState::Crashed,
            _ => ServerState::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for ServerState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ServerState::from(raw.as_str()))
    }
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
            ServerState::Offline => "offline",
            ServerState::Missing => "missing",
            ServerState::Crashed => "crashed",
            ServerState::Unknown => "unknown",
        }
    }

    pub fn is_running(&self) -> bool {
        *self == ServerState::Running
    }

    /// States that end idle tracking without a shutdown.
    pub fn is_transitional_or_down(&self) -> bool {
        matches!(
            self,
            ServerState::Offline
                | ServerState::Starting
                | ServerState::Stopping
                | ServerState::Missing
        )
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
