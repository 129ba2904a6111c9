//! Pelican Keeper - game server status keeper
//!
//! Command-line entry point.

use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use keeper::telemetry::init_subscriber;
use keeper::{LogSink, Orchestrator};
use keeper_config::{FileProvider, KeeperConfig, LogType};
use keeper_server_manager::PelicanClient;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "config.yaml")]
    config_path: String,

    /// Run a single polling cycle and exit.
    #[arg(long, default_value = "false")]
    once: bool,

    /// Force debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match FileProvider::try_load_config(Some(&args.config_path)) {
        Ok(config) => config,
        Err(e) => {
            init_subscriber(&Default::default(), args.debug);
            error!(
                log_type = LogType::Config.as_str(),
                "Failed to load configuration: {}", e
            );
            process::exit(1);
        }
    };

    init_subscriber(&config.logging, args.debug);

    if let Err(e) = start(config, args.once).await {
        error!(log_type = LogType::Orchestrator.as_str(), "{:#}", e);
        process::exit(1);
    }
}

async fn start(config: KeeperConfig, once: bool) -> anyhow::Result<()> {
    FileProvider::validate(&config).context("Invalid configuration")?;

    let panel = config
        .panel
        .clone()
        .context("Missing panel section in configuration")?;
    let api = Arc::new(PelicanClient::new(
        &panel.url,
        &panel.client_token,
        &panel.application_token,
    ));

    let orchestrator = Orchestrator::new(api, Arc::new(config), Arc::new(LogSink));

    if once {
        let results = orchestrator.run_cycle().await?;
        info!(
            log_type = LogType::Orchestrator.as_str(),
            "Polled {} server(s)",
            results.len()
        );
    } else {
        info!(
            log_type = LogType::Orchestrator.as_str(),
            "Starting Pelican Keeper..."
        );
        tokio::select! {
            _ = orchestrator.run() => {}
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for shutdown signal")?;
                info!(log_type = LogType::Orchestrator.as_str(), "Shutting down");
            }
        }
    }

    orchestrator.registry().close_all().await;
    Ok(())
}
