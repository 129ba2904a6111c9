use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use keeper_config::models::server::{
    DEFAULT_MAX_PLAYER_VARIABLE, DEFAULT_QUERY_PORT_VARIABLE, DEFAULT_RCON_PASSWORD_VARIABLE,
    DEFAULT_RCON_PORT_VARIABLE,
};
use keeper_config::{KeeperConfig, LogType, ServerMonitorConfig, UpdateMode};
use keeper_protocol::session::query_once;
use keeper_protocol::{ProtocolMethod, QueryError, QueryTarget};
use keeper_server_manager::{
    ApiProvider, ServerDetails, ServerManagerError, ServerResources, ServerState, ServerSummary,
};
use rand::Rng;
use regex::Regex;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, instrument, warn};

use super::change_cache::{ChangeCache, content_hash};
use super::player_count::{self, NOT_AVAILABLE};
use super::registry::ConnectionRegistry;
use super::shutdown::{ShutdownDecision, ShutdownTracker};
use crate::core::{MonitorError, Result};

/// Everything needed to query one server this cycle.
#[derive(Debug, Clone)]
pub struct MonitorTarget {
    pub server_id: String,
    pub name: String,
    pub method: ProtocolMethod,
    pub target: QueryTarget,
    pub command: Option<String>,
    pub extract_pattern: Option<Regex>,
    pub max_players: Option<u32>,
}

/// Panel data gathered for one server before querying it.
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    pub summary: ServerSummary,
    pub resources: Option<ServerResources>,
    pub details: Option<ServerDetails>,
}

impl ServerSnapshot {
    pub fn state(&self) -> ServerState {
        self.resources
            .as_ref()
            .map(|r| r.current_state)
            .unwrap_or(ServerState::Unknown)
    }
}

/// Outcome of polling one server, handed to the [`StatusSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    pub server_id: String,
    pub name: String,
    pub state: ServerState,
    /// Codec output, or the failure description.
    pub raw_response: Option<String>,
    /// Normalized display text.
    pub player_count: String,
    pub online: Option<u32>,
}

impl PollResult {
    pub fn content_hash(&self) -> u64 {
        content_hash(&[&self.name, self.state.as_str(), &self.player_count])
    }
}

/// Receives poll results that changed since the last publish.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, results: &[PollResult]) -> Result<()>;
}

/// Writes every published result to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl StatusSink for LogSink {
    async fn publish(&self, results: &[PollResult]) -> Result<()> {
        for result in results {
            info!(
                log_type = LogType::Orchestrator.as_str(),
                server = %result.server_id,
                state = result.state.as_str(),
                "{}: {}",
                result.name,
                result.player_count
            );
        }
        Ok(())
    }
}

pub struct Orchestrator<A: ApiProvider> {
    api: Arc<A>,
    config: Arc<KeeperConfig>,
    registry: ConnectionRegistry,
    shutdown: Mutex<ShutdownTracker>,
    cache: ChangeCache,
    sink: Arc<dyn StatusSink>,
    fetch_limit: Semaphore,
    reported_gaps: DashMap<String, String>,
    /// Compiled extraction patterns by source text. `None` marks an invalid one.
    patterns: DashMap<String, Option<Regex>>,
}

impl<A: ApiProvider> std::fmt::Debug for Orchestrator<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("servers", &self.config.servers.len())
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<A: ApiProvider> Orchestrator<A> {
    pub fn new(api: Arc<A>, config: Arc<KeeperConfig>, sink: Arc<dyn StatusSink>) -> Self {
        let monitor = &config.monitor;
        let shutdown = ShutdownTracker::new(monitor.empty_timeout());
        let fetch_limit = Semaphore::new(monitor.max_concurrent_fetches());

        Self {
            api,
            registry: ConnectionRegistry::new(),
            shutdown: Mutex::new(shutdown),
            cache: ChangeCache::new(),
            sink,
            fetch_limit,
            reported_gaps: DashMap::new(),
            patterns: DashMap::new(),
            config,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub async fn is_tracked(&self, server_id: &str) -> bool {
        self.shutdown.lock().await.is_tracked(server_id)
    }

    /// Polls forever. Failed cycles are logged and retried after the delay.
    pub async fn run(&self) {
        info!(
            log_type = LogType::Orchestrator.as_str(),
            "Monitoring {} configured server(s) every {:?}",
            self.config.servers.len(),
            self.config.monitor.update_interval()
        );

        loop {
            match self.run_cycle().await {
                Ok(results) => debug!(
                    log_type = LogType::Orchestrator.as_str(),
                    "Cycle finished with {} result(s)",
                    results.len()
                ),
                Err(e) => error!(
                    log_type = LogType::Orchestrator.as_str(),
                    "Cycle failed, no data this cycle: {}", e
                ),
            }

            tokio::time::sleep(self.next_delay()).await;
        }
    }

    /// Interval plus up to half an interval of jitter.
    fn next_delay(&self) -> Duration {
        let interval = self.config.monitor.update_interval();
        let max_jitter_ms = (interval.as_millis() / 2).max(1) as u64;
        let jitter_ms = rand::thread_rng().gen_range(0..max_jitter_ms);
        interval + Duration::from_millis(jitter_ms)
    }

    #[instrument(name = "orchestrator: run_cycle", skip(self))]
    pub async fn run_cycle(&self) -> Result<Vec<PollResult>> {
        let monitor = &self.config.monitor;

        let servers: Vec<ServerSummary> = self
            .api
            .list_servers()
            .await?
            .into_iter()
            .filter(|server| {
                let ignored = monitor.is_ignored(&server.uuid);
                if ignored {
                    debug!(
                        log_type = LogType::Inventory.as_str(),
                        "Ignoring server {} ({})", server.name, server.uuid
                    );
                }
                !ignored
            })
            .collect();
        let known: HashSet<String> = servers.iter().map(|server| server.uuid.clone()).collect();

        let snapshots = self.fetch_metadata(servers).await;

        // Down servers are polled without a query so the shutdown tracker sees them go down.
        let results: Vec<PollResult> =
            join_all(snapshots.iter().map(|snapshot| self.poll_server(snapshot))).await;

        if monitor.auto_shutdown_active() {
            self.evaluate_shutdowns(&results).await;
        }
        self.prune_shutdown_tracking(&known).await;

        let results: Vec<PollResult> = results
            .into_iter()
            .filter(|result| {
                !monitor.ignore_offline_servers
                    || !matches!(result.state, ServerState::Offline | ServerState::Missing)
            })
            .collect();

        self.publish_changes(&results).await;
        Ok(results)
    }

    /// Fetches resources and details for every server. Each API call holds
    /// one permit of the fetch limiter.
    pub async fn fetch_metadata(&self, servers: Vec<ServerSummary>) -> Vec<ServerSnapshot> {
        join_all(servers.into_iter().map(|summary| async move {
            let (resources, details) = tokio::join!(
                self.limited(self.api.get_server_resources(&summary.uuid)),
                self.limited(self.api.get_server_details(&summary.uuid)),
            );

            let resources = resources
                .map_err(|e| self.report_api_failure(&summary, "resources", e))
                .ok();
            let details = details
                .map_err(|e| self.report_api_failure(&summary, "details", e))
                .ok();

            ServerSnapshot {
                summary,
                resources,
                details,
            }
        }))
        .await
    }

    async fn limited<T, F>(&self, request: F) -> std::result::Result<T, ServerManagerError>
    where
        F: Future<Output = std::result::Result<T, ServerManagerError>>,
    {
        let _permit = self
            .fetch_limit
            .acquire()
            .await
            .map_err(|_| ServerManagerError::ApiError("Fetch limiter closed".to_string()))?;
        request.await
    }

    fn report_api_failure(&self, server: &ServerSummary, what: &str, e: ServerManagerError) {
        warn!(
            log_type = LogType::Inventory.as_str(),
            "No {} for {} this cycle: {}", what, server.name, e
        );
    }

    /// Resolves host, port and credentials for `server` from panel data.
    pub fn resolve_target(
        &self,
        summary: &ServerSummary,
        details: &ServerDetails,
        server: &ServerMonitorConfig,
    ) -> std::result::Result<MonitorTarget, MonitorError> {
        let method = server.to_method();
        let gap = |missing: &str| MonitorError::gap(&summary.uuid, missing);

        let host = self
            .config
            .panel
            .as_ref()
            .and_then(|panel| panel.external_ip.as_deref())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
            .or_else(|| details.default_allocation().map(|a| a.ip.clone()))
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| gap("a host address"))?;

        let target = match method {
            ProtocolMethod::Rcon => {
                let port =
                    details.resolve_port(server.rcon_port_variable(), DEFAULT_RCON_PORT_VARIABLE);
                if port == 0 {
                    return Err(gap("an RCON port"));
                }
                let password = details.resolve_variable(
                    server.rcon_password_variable(),
                    DEFAULT_RCON_PASSWORD_VARIABLE,
                );
                if password.is_empty() {
                    return Err(gap("an RCON password"));
                }
                if server.command().is_none() {
                    return Err(gap("an RCON command"));
                }
                QueryTarget::new(host, port).with_password(password)
            }
            ProtocolMethod::A2s | ProtocolMethod::MinecraftJava | ProtocolMethod::MinecraftBedrock => {
                let port =
                    details.resolve_port(server.query_port_variable(), DEFAULT_QUERY_PORT_VARIABLE);
                if port == 0 {
                    return Err(gap("a query port"));
                }
                QueryTarget::new(host, port)
            }
        };

        Ok(MonitorTarget {
            server_id: summary.uuid.clone(),
            name: summary.name.clone(),
            method,
            target,
            command: server.command().map(str::to_string),
            extract_pattern: server
                .extract_pattern()
                .and_then(|pattern| self.compiled_pattern(pattern)),
            max_players: details
                .resolve_max_players(server.max_player_variable(), DEFAULT_MAX_PLAYER_VARIABLE),
        })
    }

    /// Compiles each distinct pattern once. Invalid ones warn once and stay `None`.
    fn compiled_pattern(&self, pattern: &str) -> Option<Regex> {
        if let Some(compiled) = self.patterns.get(pattern) {
            return compiled.value().clone();
        }
        self.patterns
            .entry(pattern.to_string())
            .or_insert_with(|| player_count::compile_pattern(pattern))
            .value()
            .clone()
    }

    /// Runs the matching codec. RCON goes through the connection registry.
    pub async fn query_target(
        &self,
        target: &MonitorTarget,
    ) -> std::result::Result<String, QueryError> {
        debug!(
            log_type = LogType::Query.as_str(),
            "Querying {} over {} at {}",
            target.name,
            target.method,
            target.target.addr_label()
        );

        match target.method {
            ProtocolMethod::Rcon => {
                self.registry
                    .execute(&target.target, target.command.as_deref())
                    .await
            }
            method => query_once(method, &target.target, target.command.as_deref()).await,
        }
    }

    async fn poll_server(&self, snapshot: &ServerSnapshot) -> PollResult {
        let state = snapshot.state();
        let mut result = PollResult {
            server_id: snapshot.summary.uuid.clone(),
            name: snapshot.summary.name.clone(),
            state,
            raw_response: None,
            player_count: NOT_AVAILABLE.to_string(),
            online: None,
        };

        if !self.config.monitor.player_count_display || !state.is_running() {
            return result;
        }

        let Some(server) = self.config.server(&snapshot.summary.uuid) else {
            debug!(
                log_type = LogType::Query.as_str(),
                "No monitoring configuration for {}", snapshot.summary.name
            );
            return result;
        };

        let Some(details) = snapshot.details.as_ref() else {
            debug!(
                log_type = LogType::Query.as_str(),
                "{}",
                MonitorError::NoMetadata(snapshot.summary.uuid.clone())
            );
            return result;
        };

        let target = match self.resolve_target(&snapshot.summary, details, server) {
            Ok(target) => {
                self.reported_gaps.remove(&snapshot.summary.uuid);
                target
            }
            Err(e) => {
                self.report_gap(&snapshot.summary, e);
                return result;
            }
        };

        match self.query_target(&target).await {
            Ok(raw) => {
                let pattern = target.extract_pattern.as_ref();
                result.player_count = player_count::normalize(&raw, pattern, target.max_players);
                result.online = player_count::extract_player_count(&raw, pattern);
                result.raw_response = Some(raw);
            }
            Err(e) => {
                warn!(
                    log_type = LogType::Query.as_str(),
                    "{} query for {} failed: {}", target.method, target.name, e
                );
                result.player_count = e.to_string();
                result.raw_response = Some(e.to_string());
            }
        }

        result
    }

    /// Warns the first time a gap is seen, then only at debug level.
    fn report_gap(&self, summary: &ServerSummary, gap: MonitorError) {
        let message = gap.to_string();
        let previous = self
            .reported_gaps
            .insert(summary.uuid.clone(), message.clone());

        if previous.as_deref() == Some(message.as_str()) {
            debug!(
                log_type = LogType::Query.as_str(),
                "Skipping {} this cycle: {}", summary.name, message
            );
        } else {
            warn!(
                log_type = LogType::Query.as_str(),
                "Skipping {} until its configuration is fixed: {}", summary.name, message
            );
        }
    }

    async fn evaluate_shutdowns(&self, results: &[PollResult]) {
        let monitor = &self.config.monitor;
        let now = Instant::now();

        for result in results {
            if !monitor.is_auto_shutdown_candidate(&result.server_id) {
                continue;
            }

            // The lock is released before talking to the panel.
            let decision = self.shutdown.lock().await.observe(
                &result.server_id,
                result.state,
                result.online,
                now,
            );

            match decision {
                ShutdownDecision::Started => debug!(
                    log_type = LogType::Shutdown.as_str(),
                    "{} is now tracked for shutdown", result.name
                ),
                ShutdownDecision::Abandoned => debug!(
                    log_type = LogType::Shutdown.as_str(),
                    "{} is {}, no longer tracked for shutdown",
                    result.name,
                    result.state.as_str()
                ),
                ShutdownDecision::Idle { idle_for } => debug!(
                    log_type = LogType::Shutdown.as_str(),
                    "{} has been empty for {:?}", result.name, idle_for
                ),
                ShutdownDecision::Fire { idle_since } => {
                    let timeout = self.shutdown.lock().await.empty_timeout();
                    info!(
                        log_type = LogType::Shutdown.as_str(),
                        "{} has been empty for over {:?}, sending stop", result.name, timeout
                    );
                    if let Err(e) = self.api.stop_server(&result.server_id).await {
                        error!(
                            log_type = LogType::Shutdown.as_str(),
                            "Failed to stop {}: {}", result.name, e
                        );
                        self.shutdown
                            .lock()
                            .await
                            .restore(&result.server_id, idle_since);
                    }
                }
                ShutdownDecision::Untracked | ShutdownDecision::Active => {}
            }
        }
    }

    /// Drops idle clocks for servers that left the inventory or are now ignored.
    async fn prune_shutdown_tracking(&self, known: &HashSet<String>) {
        let dropped = self
            .shutdown
            .lock()
            .await
            .retain(|server_id| known.contains(server_id));
        for server_id in dropped {
            debug!(
                log_type = LogType::Shutdown.as_str(),
                "{} is no longer in the inventory, no longer tracked for shutdown", server_id
            );
        }
    }

    async fn publish_changes(&self, results: &[PollResult]) {
        match self.config.monitor.update_mode {
            UpdateMode::Consolidated => {
                let ids: Vec<&str> = results.iter().map(|r| r.server_id.as_str()).collect();
                let hashes: Vec<String> = results
                    .iter()
                    .map(|r| format!("{:016x}", r.content_hash()))
                    .collect();
                let hash_refs: Vec<&str> = hashes.iter().map(String::as_str).collect();

                if self.cache.has_changed(&ids, content_hash(&hash_refs)) {
                    self.publish(results).await;
                }
            }
            UpdateMode::PerServer => {
                for result in results {
                    if self
                        .cache
                        .has_changed(&[result.server_id.as_str()], result.content_hash())
                    {
                        self.publish(std::slice::from_ref(result)).await;
                    }
                }
            }
        }
    }

    async fn publish(&self, results: &[PollResult]) {
        if let Err(e) = self.sink.publish(results).await {
            warn!(
                log_type = LogType::Orchestrator.as_str(),
                "Status sink rejected {} result(s): {}",
                results.len(),
                e
            );
        }
    }
}
