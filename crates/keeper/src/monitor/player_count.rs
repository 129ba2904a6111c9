//! Turns protocol answers into a `current/max` display string.

use std::sync::LazyLock;

use keeper_config::LogType;
use regex::Regex;
use tracing::warn;

/// Shown when a server produced no usable answer.
pub const NOT_AVAILABLE: &str = "N/A";

static PAIR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(\d+)\s*/\s*(\d+)",
        r"(?i)(\d+)\s+(?:out\s+)?of\s+(?:a\s+max(?:imum)?\s+of\s+)?(\d+)",
    ]
    .into_iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Compiles a configured extraction pattern, warning when it is invalid.
pub fn compile_pattern(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(
                log_type = LogType::Query.as_str(),
                "Ignoring invalid player count pattern {:?}: {}", pattern, e
            );
            None
        }
    }
}

/// Normalizes raw protocol output.
///
/// Empty text becomes [`NOT_AVAILABLE`]. A custom `pattern` picks the
/// interesting part first (its first capture group, or the whole match).
/// `x/y`, `x of y` and `x out of y` become `x/y`; a bare number gets
/// `max_players` appended when it is known. Anything else is returned as is.
pub fn normalize(raw: &str, pattern: Option<&Regex>, max_players: Option<u32>) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return NOT_AVAILABLE.to_string();
    }

    let selected = pattern.and_then(|p| select(raw, p)).unwrap_or(raw);

    if let Some((online, max)) = find_pair(selected) {
        return format!("{}/{}", online, max);
    }

    match selected.parse::<u32>() {
        Ok(online) => match max_players {
            Some(max) => format!("{}/{}", online, max),
            None => online.to_string(),
        },
        Err(_) => selected.to_string(),
    }
}

/// Current player count carried by `text`, if any.
pub fn extract_player_count(text: &str, pattern: Option<&Regex>) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() || text == NOT_AVAILABLE {
        return None;
    }

    let selected = pattern.and_then(|p| select(text, p)).unwrap_or(text);

    find_pair(selected)
        .map(|(online, _)| online)
        .or_else(|| selected.parse::<u32>().ok())
}

fn find_pair(text: &str) -> Option<(u32, u32)> {
    PAIR_PATTERNS.iter().find_map(|regex| {
        let captures = regex.captures(text)?;
        let online = captures.get(1)?.as_str().parse().ok()?;
        let max = captures.get(2)?.as_str().parse().ok()?;
        Some((online, max))
    })
}

fn select<'a>(text: &'a str, regex: &Regex) -> Option<&'a str> {
    let captures = regex.captures(text)?;
    captures
        .get(1)
        .or_else(|| captures.get(0))
        .map(|m| m.as_str().trim())
}
