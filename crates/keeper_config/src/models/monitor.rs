use serde::Deserialize;
use std::time::Duration;

pub const MIN_UPDATE_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 5;
pub const DEFAULT_EMPTY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Allow-list entry shipped in the sample config, treated as "no list".
pub const UUID_PLACEHOLDER: &str = "UUIDS HERE";

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// One status view for every server, refreshed as a whole.
    #[default]
    Consolidated,
    /// One status view per server, each refreshed on its own.
    PerServer,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub update_interval_secs: u64,
    pub max_concurrent_fetches: usize,
    pub player_count_display: bool,
    pub automatic_shutdown: bool,
    pub empty_server_timeout: Option<String>,
    pub servers_to_auto_shutdown: Vec<String>,
    pub servers_to_ignore: Vec<String>,
    pub ignore_offline_servers: bool,
    pub update_mode: UpdateMode,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: MIN_UPDATE_INTERVAL_SECS,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            player_count_display: true,
            automatic_shutdown: false,
            empty_server_timeout: None,
            servers_to_auto_shutdown: Vec::new(),
            servers_to_ignore: Vec::new(),
            ignore_offline_servers: false,
            update_mode: UpdateMode::Consolidated,
        }
    }
}

impl MonitorConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs.max(MIN_UPDATE_INTERVAL_SECS))
    }

    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_concurrent_fetches.max(1)
    }

    pub fn empty_timeout(&self) -> Duration {
        parse_empty_timeout(self.empty_server_timeout.as_deref())
    }

    /// Idle tracking needs both the player count and the shutdown feature.
    pub fn auto_shutdown_active(&self) -> bool {
        self.automatic_shutdown && self.player_count_display
    }

    pub fn is_auto_shutdown_candidate(&self, uuid: &str) -> bool {
        !has_entries(&self.servers_to_auto_shutdown)
            || self.servers_to_auto_shutdown.iter().any(|id| id == uuid)
    }

    pub fn is_ignored(&self, uuid: &str) -> bool {
        has_entries(&self.servers_to_ignore) && self.servers_to_ignore.iter().any(|id| id == uuid)
    }
}

/// False for an empty list or the sample placeholder.
pub fn has_entries(list: &[String]) -> bool {
    list.iter()
        .any(|entry| !entry.trim().is_empty() && entry.trim() != UUID_PLACEHOLDER)
}

/// Parses `[d.]HH:MM[:SS]` or a humantime string ("45m", "1h 30m").
/// Unset, zero or unparsable input yields one hour.
pub fn parse_empty_timeout(value: Option<&str>) -> Duration {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return DEFAULT_EMPTY_TIMEOUT;
    };

    parse_clock(value)
        .or_else(|| humantime::parse_duration(value).ok())
        .filter(|d| !d.is_zero())
        .unwrap_or(DEFAULT_EMPTY_TIMEOUT)
}

fn parse_clock(value: &str) -> Option<Duration> {
    let (days, clock) = match value.split_once('.') {
        Some((days, clock)) if clock.contains(':') => (days.parse::<u64>().ok()?, clock),
        _ => (0, value),
    };

    let fields: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds) = match fields.as_slice() {
        [h, m] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, 0),
        [h, m, s] => (
            h.parse::<u64>().ok()?,
            m.parse::<u64>().ok()?,
            s.parse::<u64>().ok()?,
        ),
        _ => return None,
    };
    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    let secs = days
        .checked_mul(86_400)?
        .checked_add(hours.checked_mul(3_600)?)?
        .checked_add(minutes * 60 + seconds)?;
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_timeout_formats() {
        assert_eq!(parse_empty_timeout(Some("00:30:00")), Duration::from_secs(1800));
        assert_eq!(parse_empty_timeout(Some("02:15")), Duration::from_secs(8100));
        assert_eq!(
            parse_empty_timeout(Some("1.00:00:05")),
            Duration::from_secs(86_405)
        );
        assert_eq!(parse_empty_timeout(Some("45m")), Duration::from_secs(2700));
        assert_eq!(parse_empty_timeout(Some("1h 30m")), Duration::from_secs(5400));
    }

    #[test]
    fn test_parse_empty_timeout_defaults() {
        for value in [None, Some(""), Some("   "), Some("soon"), Some("00:00:00"), Some("10:75:00")] {
            assert_eq!(parse_empty_timeout(value), DEFAULT_EMPTY_TIMEOUT, "{:?}", value);
        }
    }

    #[test]
    fn test_oversized_clock_values_fall_back() {
        for value in [
            "18446744073709551615.00:00:00",
            "213503982334602.00:00:00",
            "213503982334601.23:00",
            "5124095576030432:00",
        ] {
            assert_eq!(parse_clock(value), None, "{}", value);
            assert_eq!(parse_empty_timeout(Some(value)), DEFAULT_EMPTY_TIMEOUT);
        }
        assert_eq!(
            parse_clock("100000.00:00:00"),
            Some(Duration::from_secs(8_640_000_000))
        );
    }

    #[test]
    fn test_allow_lists_treat_placeholder_as_empty() {
        let mut config = MonitorConfig {
            servers_to_auto_shutdown: vec![UUID_PLACEHOLDER.to_string()],
            ..Default::default()
        };
        assert!(config.is_auto_shutdown_candidate("anything"));

        config.servers_to_auto_shutdown = vec!["abc".to_string()];
        assert!(config.is_auto_shutdown_candidate("abc"));
        assert!(!config.is_auto_shutdown_candidate("def"));

        config.servers_to_ignore = vec![UUID_PLACEHOLDER.to_string()];
        assert!(!config.is_ignored(UUID_PLACEHOLDER));
        config.servers_to_ignore = vec!["abc".to_string()];
        assert!(config.is_ignored("abc"));
    }

    #[test]
    fn test_interval_is_clamped() {
        let config = MonitorConfig {
            update_interval_secs: 3,
            max_concurrent_fetches: 0,
            ..Default::default()
        };
        assert_eq!(config.update_interval(), Duration::from_secs(10));
        assert_eq!(config.max_concurrent_fetches(), 1);
    }
}
