use std::str::FromStr;

use keeper_config::LoggingConfig;
use tracing::Level;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn log_level(config: &LoggingConfig, force_debug: bool) -> Level {
    if force_debug || config.debug || cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the computed level
/// when the default filter cannot be built.
pub fn init_subscriber(config: &LoggingConfig, force_debug: bool) {
    let log_level = log_level(config, force_debug);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_level(true)
        .with_ansi(config.use_color)
        .with_target(config.show_target)
        .with_filter(LevelFilter::from_level(log_level));

    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::from_str(&format!(
            "keeper={level},keeper_protocol={level},keeper_config={level},keeper_server_manager={level}",
            level = log_level
        ))
        .unwrap_or_else(|_| EnvFilter::from_default_env()),
    };

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flags_raise_level() {
        let config = LoggingConfig {
            debug: true,
            ..Default::default()
        };
        assert_eq!(log_level(&config, false), Level::DEBUG);
        assert_eq!(log_level(&LoggingConfig::default(), true), Level::DEBUG);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_subscriber(&LoggingConfig::default(), false);
        init_subscriber(&LoggingConfig::default(), true);
    }
}
