use std::io;
use thiserror::Error;

use keeper_config::ConfigError;
use keeper_protocol::QueryError;
use keeper_server_manager::ServerManagerError;

#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Panel API error: {0}")]
    Api(#[from] ServerManagerError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Reasons a single server is skipped for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("Server {server_id} is missing {missing}")]
    ConfigurationGap { server_id: String, missing: String },

    #[error("No metadata for server {0} this cycle")]
    NoMetadata(String),
}

impl MonitorError {
    pub fn gap(server_id: impl Into<String>, missing: impl Into<String>) -> Self {
        Self::ConfigurationGap {
            server_id: server_id.into(),
            missing: missing.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KeeperError>;
