use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_true")]
    pub use_color: bool,

    #[serde(default)]
    pub show_target: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            show_target: false,
        }
    }
}

/// Value of the `log_type` field attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogType {
    Query,
    Rcon,
    Inventory,
    Shutdown,
    Cache,
    Orchestrator,
    Config,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Query => "query",
            LogType::Rcon => "rcon",
            LogType::Inventory => "inventory",
            LogType::Shutdown => "shutdown",
            LogType::Cache => "cache",
            LogType::Orchestrator => "orchestrator",
            LogType::Config => "config",
        }
    }
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
