use std::{collections::HashSet, fs, path::Path};

use keeper_protocol::ProtocolMethod;
use tracing::{debug, instrument, warn};

use crate::{ConfigError, KeeperConfig, LogType};

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

pub struct FileProvider;

impl FileProvider {
    /// Reads a YAML config and merges it over the defaults.
    #[instrument(name = "file_provider: try_load_config")]
    pub fn try_load_config(path: Option<&str>) -> Result<KeeperConfig, ConfigError> {
        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);
        let content = fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;

        let mut config = KeeperConfig::default();
        if content.trim().is_empty() {
            warn!(log_type = LogType::Config.as_str(), "Config file {} is empty, using defaults", path);
            return Ok(config);
        }

        let loaded: KeeperConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
        config.merge(loaded);

        debug!(
            log_type = LogType::Config.as_str(),
            "Loaded {} server definition(s) from {}",
            config.servers.len(),
            path
        );
        Ok(config)
    }

    /// Checks what the monitor cannot work without.
    pub fn validate(config: &KeeperConfig) -> Result<(), ConfigError> {
        match &config.panel {
            Some(panel) if panel.is_complete() => {}
            Some(_) => {
                return Err(ConfigError::invalid(
                    "panel.url, panel.client_token and panel.application_token are required",
                ));
            }
            None => return Err(ConfigError::invalid("missing panel section")),
        }

        let mut seen = HashSet::new();
        for server in &config.servers {
            if server.uuid.trim().is_empty() {
                return Err(ConfigError::invalid("server entry with an empty uuid"));
            }
            if !seen.insert(server.uuid.as_str()) {
                warn!(
                    log_type = LogType::Config.as_str(),
                    "Server {} is listed more than once, the first entry wins", server.uuid
                );
            }
            if server.to_method() == ProtocolMethod::Rcon && server.command().is_none() {
                warn!(
                    log_type = LogType::Config.as_str(),
                    "RCON server {} has no command, it will report N/A", server.uuid
                );
            }
        }

        Ok(())
    }
}
