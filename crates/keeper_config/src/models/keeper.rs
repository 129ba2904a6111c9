use serde::Deserialize;

use super::{
    logging::LoggingConfig, monitor::MonitorConfig, panel::PanelConfig,
    server::ServerMonitorConfig,
};

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct KeeperConfig {
    pub panel: Option<PanelConfig>,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub servers: Vec<ServerMonitorConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KeeperConfig {
    pub fn is_empty(&self) -> bool {
        self.panel.is_none() && self.servers.is_empty()
    }

    pub fn server(&self, uuid: &str) -> Option<&ServerMonitorConfig> {
        self.servers.iter().find(|server| server.uuid == uuid)
    }

    pub fn merge(&mut self, other: KeeperConfig) {
        if let Some(panel) = other.panel {
            self.panel = Some(panel);
        }

        if other.monitor != MonitorConfig::default() {
            self.monitor = other.monitor;
        }

        if !other.servers.is_empty() {
            self.servers = other.servers;
        }

        if other.logging != LoggingConfig::default() {
            self.logging = other.logging;
        }
    }
}
