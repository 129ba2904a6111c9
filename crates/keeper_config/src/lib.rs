pub mod error;
pub mod models;
pub mod provider;

pub use error::ConfigError;
pub use models::keeper::KeeperConfig;
pub use models::logging::{LogType, LoggingConfig};
pub use models::monitor::{MonitorConfig, UpdateMode, parse_empty_timeout};
pub use models::panel::PanelConfig;
pub use models::server::ServerMonitorConfig;
pub use provider::FileProvider;
