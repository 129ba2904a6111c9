use serde::{Deserialize, Serialize};

use crate::ServerState;

pub const SERVER_PORT_VARIABLE: &str = "SERVER_PORT";

/// One entry of the panel's server list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSummary {
    #[serde(default)]
    pub id: u64,
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    #[serde(default)]
    pub memory_bytes: u64,
    #[serde(default)]
    pub cpu_absolute: f64,
    #[serde(default)]
    pub disk_bytes: u64,
    #[serde(default)]
    pub network_rx_bytes: u64,
    #[serde(default)]
    pub network_tx_bytes: u64,
    #[serde(default)]
    pub uptime: u64,
}

/// Live state and usage of one server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerResources {
    pub current_state: ServerState,
    #[serde(default)]
    pub is_suspended: bool,
    #[serde(default)]
    pub resources: ResourceUsage,
}

impl ServerResources {
    pub fn with_state(state: ServerState) -> Self {
        Self {
            current_state: state,
            is_suspended: false,
            resources: ResourceUsage::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub ip: String,
    #[serde(default)]
    pub ip_alias: Option<String>,
    pub port: u16,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerVariable {
    pub env_variable: String,
    #[serde(default)]
    pub server_value: Option<String>,
}

/// Allocations and startup variables of one server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerDetails {
    pub uuid: String,
    pub allocations: Vec<Allocation>,
    pub variables: Vec<ServerVariable>,
}

impl ServerDetails {
    /// The default allocation, or the first one when none is flagged.
    pub fn default_allocation(&self) -> Option<&Allocation> {
        self.allocations
            .iter()
            .find(|a| a.is_default)
            .or_else(|| self.allocations.first())
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|v| v.env_variable == name)
            .and_then(|v| v.server_value.as_deref())
    }

    /// Resolves a variable's value, using `default_name` when `name` is
    /// blank. Missing values resolve to an empty string.
    pub fn resolve_variable(&self, name: &str, default_name: &str) -> String {
        let name = pick_name(name, default_name);
        self.variable(name).unwrap_or_default().trim().to_string()
    }

    /// Resolves a port variable. `SERVER_PORT` and `SERVER_PORT + <n>`
    /// are relative to the default allocation. Anything unresolvable is 0.
    pub fn resolve_port(&self, name: &str, default_name: &str) -> u16 {
        let name = pick_name(name, default_name);

        if let Some(offset) = parse_server_port_offset(name) {
            return self
                .default_allocation()
                .and_then(|alloc| u16::try_from(i64::from(alloc.port) + offset).ok())
                .unwrap_or(0);
        }

        self.variable(name)
            .and_then(|value| value.trim().parse::<u16>().ok())
            .unwrap_or(0)
    }

    pub fn resolve_max_players(&self, name: &str, default_name: &str) -> Option<u32> {
        let value = self.resolve_variable(name, default_name);
        value.parse::<u32>().ok().filter(|max| *max > 0)
    }
}

fn pick_name<'a>(name: &'a str, default_name: &'a str) -> &'a str {
    let name = name.trim();
    if name.is_empty() { default_name } else { name }
}

/// `SERVER_PORT` → 0, `SERVER_PORT + 2` → 2, `SERVER_PORT-1` → -1.
fn parse_server_port_offset(name: &str) -> Option<i64> {
    let rest = name.strip_prefix(SERVER_PORT_VARIABLE)?.trim();
    if rest.is_empty() {
        return Some(0);
    }
    let (sign, digits) = if let Some(digits) = rest.strip_prefix('+') {
        (1, digits)
    } else if let Some(digits) = rest.strip_prefix('-') {
        (-1, digits)
    } else {
        return None;
    };
    digits.trim().parse::<i64>().ok().map(|n| sign * n)
}

/// Power actions understood by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerSignal {
    Start,
    Stop,
    Restart,
    Kill,
}

impl PowerSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerSignal::Start => "start",
            PowerSignal::Stop => "stop",
            PowerSignal::Restart => "restart",
            PowerSignal::Kill => "kill",
        }
    }
}

// Panel JSON envelopes.

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub attributes: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListEnvelope<T> {
    pub data: Vec<Envelope<T>>,
    #[serde(default)]
    pub meta: Option<ListMeta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListMeta {
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DetailsAttributes {
    pub uuid: String,
    #[serde(default)]
    pub relationships: Option<DetailsRelationships>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DetailsRelationships {
    #[serde(default)]
    pub allocations: Option<ListEnvelope<Allocation>>,
    #[serde(default)]
    pub variables: Option<ListEnvelope<ServerVariable>>,
}

impl From<DetailsAttributes> for ServerDetails {
    fn from(attributes: DetailsAttributes) -> Self {
        let (allocations, variables) = match attributes.relationships {
            Some(rel) => (
                rel.allocations
                    .map(|list| list.data.into_iter().map(|e| e.attributes).collect())
                    .unwrap_or_default(),
                rel.variables
                    .map(|list| list.data.into_iter().map(|e| e.attributes).collect())
                    .unwrap_or_default(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        ServerDetails {
            uuid: attributes.uuid,
            allocations,
            variables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> ServerDetails {
        ServerDetails {
            uuid: "a1b2".to_string(),
            allocations: vec![
                Allocation {
                    ip: "10.0.0.2".to_string(),
                    ip_alias: None,
                    port: 27016,
                    is_default: false,
                },
                Allocation {
                    ip: "10.0.0.2".to_string(),
                    ip_alias: None,
                    port: 27015,
                    is_default: true,
                },
            ],
            variables: vec![
                ServerVariable {
                    env_variable: "RCON_PORT".to_string(),
                    server_value: Some("27020".to_string()),
                },
                ServerVariable {
                    env_variable: "RCON_PASS".to_string(),
                    server_value: Some(" hunter2 ".to_string()),
                },
                ServerVariable {
                    env_variable: "MAX_PLAYERS".to_string(),
                    server_value: Some("24".to_string()),
                },
                ServerVariable {
                    env_variable: "QUERY_PORT".to_string(),
                    server_value: Some("not-a-port".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_resolve_uses_default_names() {
        let details = details();
        assert_eq!(details.resolve_port("", "RCON_PORT"), 27020);
        assert_eq!(details.resolve_variable("  ", "RCON_PASS"), "hunter2");
        assert_eq!(details.resolve_max_players("", "MAX_PLAYERS"), Some(24));
    }

    #[test]
    fn test_resolve_port_relative_to_default_allocation() {
        let details = details();
        assert_eq!(details.resolve_port("SERVER_PORT", "QUERY_PORT"), 27015);
        assert_eq!(details.resolve_port("SERVER_PORT + 1", "QUERY_PORT"), 27016);
        assert_eq!(details.resolve_port("SERVER_PORT+10", "QUERY_PORT"), 27025);
        assert_eq!(details.resolve_port("SERVER_PORT - 5", "QUERY_PORT"), 27010);
        assert_eq!(details.resolve_port("SERVER_PORT * 2", "QUERY_PORT"), 0);
    }

    #[test]
    fn test_unresolvable_values_are_gaps() {
        let details = details();
        assert_eq!(details.resolve_port("", "QUERY_PORT"), 0);
        assert_eq!(details.resolve_port("GAME_PORT", "QUERY_PORT"), 0);
        assert_eq!(details.resolve_variable("ADMIN_PASS", "RCON_PASS"), "");

        let empty = ServerDetails::default();
        assert_eq!(empty.resolve_port("SERVER_PORT + 1", "QUERY_PORT"), 0);
        assert_eq!(empty.resolve_max_players("", "MAX_PLAYERS"), None);
    }

    #[test]
    fn test_details_from_panel_json() {
        let json = r#"{
            "object": "server",
            "attributes": {
                "uuid": "a1b2",
                "relationships": {
                    "allocations": {"object": "list", "data": [
                        {"object": "allocation", "attributes": {"id": 1, "ip": "10.0.0.2", "ip_alias": null, "port": 25565, "notes": null, "is_default": true}}
                    ]},
                    "variables": {"object": "list", "data": [
                        {"object": "egg_variable", "attributes": {"name": "Rcon", "env_variable": "RCON_PORT", "server_value": "25575"}}
                    ]}
                }
            }
        }"#;
        let envelope: Envelope<DetailsAttributes> = serde_json::from_str(json).unwrap();
        let details = ServerDetails::from(envelope.attributes);
        assert_eq!(details.default_allocation().unwrap().port, 25565);
        assert_eq!(details.resolve_port("", "RCON_PORT"), 25575);
    }
}
