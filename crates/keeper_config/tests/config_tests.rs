use std::fs;
use std::time::Duration;

use keeper_config::{ConfigError, FileProvider, UpdateMode};
use keeper_protocol::ProtocolMethod;
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
panel:
  url: "https://panel.example.com"
  client_token: "ptlc_client"
  application_token: "ptla_app"
  external_ip: "203.0.113.4"
monitor:
  update_interval_secs: 30
  max_concurrent_fetches: 5
  player_count_display: true
  automatic_shutdown: true
  empty_server_timeout: "00:45:00"
  servers_to_auto_shutdown: ["UUIDS HERE"]
  servers_to_ignore: ["c3d4"]
  ignore_offline_servers: true
  update_mode: per_server
servers:
  - uuid: "a1b2"
    protocol: rcon
    command: "list"
    player_count_extract_regex: "There are (\\d+)"
  - uuid: "e5f6"
    protocol: a2s
    query_port_variable: "SERVER_PORT + 1"
  - uuid: "0a0b"
    protocol: minecraft_bedrock
logging:
  debug: true
  use_color: false
"#;

#[test]
fn test_full_config_loads() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.yaml");
    fs::write(&path, FULL_CONFIG).unwrap();

    let config = FileProvider::try_load_config(path.to_str()).unwrap();
    FileProvider::validate(&config).unwrap();

    let panel = config.panel.as_ref().unwrap();
    assert_eq!(panel.external_ip.as_deref(), Some("203.0.113.4"));

    let monitor = &config.monitor;
    assert_eq!(monitor.update_interval(), Duration::from_secs(30));
    assert_eq!(monitor.empty_timeout(), Duration::from_secs(45 * 60));
    assert_eq!(monitor.update_mode, UpdateMode::PerServer);
    assert!(monitor.auto_shutdown_active());
    assert!(monitor.is_auto_shutdown_candidate("a1b2"));
    assert!(monitor.is_ignored("c3d4"));

    assert_eq!(config.servers.len(), 3);
    let rcon = config.server("a1b2").unwrap();
    assert_eq!(rcon.to_method(), ProtocolMethod::Rcon);
    assert_eq!(rcon.extract_pattern(), Some("There are (\\d+)"));
    assert_eq!(
        config.server("e5f6").unwrap().query_port_variable(),
        "SERVER_PORT + 1"
    );
    assert_eq!(
        config.server("0a0b").unwrap().to_method(),
        ProtocolMethod::MinecraftBedrock
    );

    assert!(config.logging.debug);
    assert!(!config.logging.use_color);
}

#[test]
fn test_unknown_protocol_is_parse_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.yaml");
    fs::write(&path, "servers:\n  - uuid: x\n    protocol: telnet\n").unwrap();

    let err = FileProvider::try_load_config(path.to_str()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn test_empty_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.yaml");
    fs::write(&path, "\n").unwrap();

    let config = FileProvider::try_load_config(path.to_str()).unwrap();
    assert!(config.is_empty());
    assert_eq!(config.monitor.empty_timeout(), Duration::from_secs(3600));
}
