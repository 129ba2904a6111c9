use keeper_protocol::ProtocolMethod;
use serde::Deserialize;

pub const DEFAULT_RCON_PORT_VARIABLE: &str = "RCON_PORT";
pub const DEFAULT_RCON_PASSWORD_VARIABLE: &str = "RCON_PASS";
pub const DEFAULT_QUERY_PORT_VARIABLE: &str = "QUERY_PORT";
pub const DEFAULT_MAX_PLAYER_VARIABLE: &str = "MAX_PLAYERS";

/// How to query one panel server for its player count.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerMonitorConfig {
    pub uuid: String,

    pub protocol: ProtocolMethod,

    /// RCON command whose output carries the player count.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub rcon_port_variable: Option<String>,

    #[serde(default)]
    pub rcon_password_variable: Option<String>,

    /// Panel variable holding the query port, may be `SERVER_PORT + <offset>`.
    #[serde(default)]
    pub query_port_variable: Option<String>,

    #[serde(default)]
    pub max_player_variable: Option<String>,

    #[serde(default)]
    pub player_count_extract_regex: Option<String>,
}

impl ServerMonitorConfig {
    pub fn to_method(&self) -> ProtocolMethod {
        self.protocol
    }

    pub fn rcon_port_variable(&self) -> &str {
        non_blank(&self.rcon_port_variable).unwrap_or(DEFAULT_RCON_PORT_VARIABLE)
    }

    pub fn rcon_password_variable(&self) -> &str {
        non_blank(&self.rcon_password_variable).unwrap_or(DEFAULT_RCON_PASSWORD_VARIABLE)
    }

    pub fn query_port_variable(&self) -> &str {
        non_blank(&self.query_port_variable).unwrap_or(DEFAULT_QUERY_PORT_VARIABLE)
    }

    pub fn max_player_variable(&self) -> &str {
        non_blank(&self.max_player_variable).unwrap_or(DEFAULT_MAX_PLAYER_VARIABLE)
    }

    pub fn extract_pattern(&self) -> Option<&str> {
        non_blank(&self.player_count_extract_regex)
    }

    pub fn command(&self) -> Option<&str> {
        non_blank(&self.command)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
