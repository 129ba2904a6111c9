use std::collections::HashMap;
use std::time::{Duration, Instant};

use keeper_server_manager::ServerState;

/// What the tracker concluded from one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownDecision {
    /// Down or transitional, and not tracked.
    Untracked,
    /// Tracking began with this observation.
    Started,
    /// Tracked and either occupied or without a usable count.
    Active,
    /// Tracked and empty, but not for long enough.
    Idle { idle_for: Duration },
    /// Empty past the timeout. The server is no longer tracked.
    Fire { idle_since: Instant },
    /// Went down while tracked. Tracking stops without a shutdown.
    Abandoned,
}

/// Per-server idle clock driving automatic shutdown.
#[derive(Debug)]
pub struct ShutdownTracker {
    empty_timeout: Duration,
    last_non_empty: HashMap<String, Instant>,
}

impl ShutdownTracker {
    pub fn new(empty_timeout: Duration) -> Self {
        Self {
            empty_timeout,
            last_non_empty: HashMap::new(),
        }
    }

    pub fn empty_timeout(&self) -> Duration {
        self.empty_timeout
    }

    pub fn observe(
        &mut self,
        server_id: &str,
        state: ServerState,
        players: Option<u32>,
        now: Instant,
    ) -> ShutdownDecision {
        if state.is_transitional_or_down() {
            return match self.last_non_empty.remove(server_id) {
                Some(_) => ShutdownDecision::Abandoned,
                None => ShutdownDecision::Untracked,
            };
        }

        let started = !self.last_non_empty.contains_key(server_id);
        let last_non_empty = *self
            .last_non_empty
            .entry(server_id.to_string())
            .or_insert(now);

        match players {
            Some(0) => {
                let idle_for = now.saturating_duration_since(last_non_empty);
                if idle_for > self.empty_timeout {
                    self.last_non_empty.remove(server_id);
                    ShutdownDecision::Fire {
                        idle_since: last_non_empty,
                    }
                } else if started {
                    ShutdownDecision::Started
                } else {
                    ShutdownDecision::Idle { idle_for }
                }
            }
            Some(_) => {
                self.last_non_empty.insert(server_id.to_string(), now);
                if started {
                    ShutdownDecision::Started
                } else {
                    ShutdownDecision::Active
                }
            }
            None if started => ShutdownDecision::Started,
            None => ShutdownDecision::Active,
        }
    }

    /// Puts a server back after its stop command could not be delivered.
    pub fn restore(&mut self, server_id: &str, idle_since: Instant) {
        self.last_non_empty.insert(server_id.to_string(), idle_since);
    }

    pub fn is_tracked(&self, server_id: &str) -> bool {
        self.last_non_empty.contains_key(server_id)
    }

    /// Stops tracking every server `keep` rejects and returns their ids.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let mut dropped = Vec::new();
        self.last_non_empty.retain(|server_id, _| {
            let kept = keep(server_id);
            if !kept {
                dropped.push(server_id.clone());
            }
            kept
        });
        dropped
    }

    pub fn len(&self) -> usize {
        self.last_non_empty.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_non_empty.is_empty()
    }
}
