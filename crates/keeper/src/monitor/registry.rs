use std::sync::Arc;

use dashmap::DashMap;
use keeper_config::LogType;
use keeper_protocol::{ProtocolMethod, QueryError, QuerySession, QueryTarget, open_session};
use tokio::sync::Mutex;
use tracing::{debug, warn};

type SharedSession = Arc<Mutex<Box<dyn QuerySession>>>;

/// Authenticated RCON sessions, reused across cycles per `(host, port)`.
///
/// A session is dropped as soon as a command on it fails, so the next call
/// reconnects and authenticates again.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<(String, u16), SharedSession>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn execute(
        &self,
        target: &QueryTarget,
        command: Option<&str>,
    ) -> Result<String, QueryError> {
        let key = (target.host.clone(), target.port);

        let session = match self.cached(&key) {
            Some(session) => session,
            None => self.connect(target).await?,
        };

        let result = {
            let mut guard = session.lock().await;
            guard.send_command(command).await
        };

        if let Err(e) = &result {
            warn!(
                log_type = LogType::Rcon.as_str(),
                "RCON command on {} failed, dropping session: {}",
                target.addr_label(),
                e
            );
            self.discard(&key, &session).await;
        }

        result
    }

    pub async fn invalidate(&self, host: &str, port: u16) {
        if let Some((_, session)) = self.sessions.remove(&(host.to_string(), port)) {
            session.lock().await.close().await;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub async fn close_all(&self) {
        let sessions: Vec<SharedSession> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.sessions.clear();

        for session in sessions {
            session.lock().await.close().await;
        }
    }

    fn cached(&self, key: &(String, u16)) -> Option<SharedSession> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    async fn connect(&self, target: &QueryTarget) -> Result<SharedSession, QueryError> {
        debug!(
            log_type = LogType::Rcon.as_str(),
            "Opening RCON session to {}",
            target.addr_label()
        );

        let mut session = open_session(ProtocolMethod::Rcon, target);
        if let Err(e) = session.connect().await {
            session.close().await;
            return Err(e);
        }

        let session: SharedSession = Arc::new(Mutex::new(session));
        self.sessions
            .insert((target.host.clone(), target.port), session.clone());
        Ok(session)
    }

    /// Removes `session` only if it is still the registered one.
    async fn discard(&self, key: &(String, u16), session: &SharedSession) {
        let removed = self
            .sessions
            .remove_if(key, |_, current| Arc::ptr_eq(current, session));
        if let Some((_, session)) = removed {
            session.lock().await.close().await;
        }
    }
}
