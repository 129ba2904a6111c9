use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::ServerState;
use crate::api::{
    ApiProvider, PowerSignal, ServerDetails, ServerResources, ServerSummary,
};
use crate::error::ServerManagerError;

#[derive(Debug, Clone)]
struct MockServer {
    summary: ServerSummary,
    resources: ServerResources,
    details: ServerDetails,
}

#[derive(Default)]
struct MockState {
    servers: BTreeMap<String, MockServer>,
    failing: HashSet<String>,
    power_signals: Vec<(String, PowerSignal)>,
}

/// In-memory panel for tests. Records power signals and the peak number
/// of concurrent metadata calls.
#[derive(Clone)]
pub struct MockApiProvider {
    state: Arc<RwLock<MockState>>,
    latency: Duration,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    metadata_calls: Arc<AtomicUsize>,
}

impl Default for MockApiProvider {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockApiProvider {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState::default())),
            latency: Duration::ZERO,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            metadata_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delay applied to every metadata call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_server(
        self,
        server_id: &str,
        name: &str,
        state: ServerState,
        details: ServerDetails,
    ) -> Self {
        {
            let mut guard = self.write();
            let id = guard.servers.len() as u64 + 1;
            guard.servers.insert(
                server_id.to_string(),
                MockServer {
                    summary: ServerSummary {
                        id,
                        uuid: server_id.to_string(),
                        name: name.to_string(),
                        description: None,
                    },
                    resources: ServerResources::with_state(state),
                    details: ServerDetails {
                        uuid: server_id.to_string(),
                        ..details
                    },
                },
            );
        }
        self
    }

    pub fn set_server_state(&self, server_id: &str, state: ServerState) {
        if let Some(server) = self.write().servers.get_mut(server_id) {
            server.resources.current_state = state;
        }
    }

    /// Drops `server_id` from the inventory, as if it were deleted on the panel.
    pub fn remove_server(&self, server_id: &str) {
        self.write().servers.remove(server_id);
    }

    /// Makes every metadata call for `server_id` fail.
    pub fn set_server_failing(&self, server_id: &str, failing: bool) {
        let mut guard = self.write();
        if failing {
            guard.failing.insert(server_id.to_string());
        } else {
            guard.failing.remove(server_id);
        }
    }

    pub fn power_signals(&self) -> Vec<(String, PowerSignal)> {
        self.read().power_signals.clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    fn read(&self) -> RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self) -> InFlightGuard<'_> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard {
            counter: &self.in_flight,
        }
    }

    fn lookup(&self, server_id: &str) -> Result<MockServer, ServerManagerError> {
        let guard = self.read();
        if guard.failing.contains(server_id) {
            return Err(ServerManagerError::ParseError(format!(
                "Malformed response for server {}",
                server_id
            )));
        }
        guard.servers.get(server_id).cloned().ok_or_else(|| {
            ServerManagerError::ApiError(format!("Server {} not found", server_id))
        })
    }
}

#[async_trait]
impl ApiProvider for MockApiProvider {
    async fn list_servers(&self) -> Result<Vec<ServerSummary>, ServerManagerError> {
        Ok(self
            .read()
            .servers
            .values()
            .map(|server| server.summary.clone())
            .collect())
    }

    async fn get_server_resources(
        &self,
        server_id: &str,
    ) -> Result<ServerResources, ServerManagerError> {
        let _guard = self.enter();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.lookup(server_id).map(|server| server.resources)
    }

    async fn get_server_details(
        &self,
        server_id: &str,
    ) -> Result<ServerDetails, ServerManagerError> {
        let _guard = self.enter();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.lookup(server_id).map(|server| server.details)
    }

    async fn send_power_signal(
        &self,
        server_id: &str,
        signal: PowerSignal,
    ) -> Result<(), ServerManagerError> {
        let mut guard = self.write();
        let Some(server) = guard.servers.get_mut(server_id) else {
            return Err(ServerManagerError::ApiError(format!(
                "Server {} not found",
                server_id
            )));
        };
        server.resources.current_state = match signal {
            PowerSignal::Start | PowerSignal::Restart => ServerState::Starting,
            PowerSignal::Stop => ServerState::Stopping,
            PowerSignal::Kill => ServerState::Offline,
        };
        guard.power_signals.push((server_id.to_string(), signal));
        Ok(())
    }
}
