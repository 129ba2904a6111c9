//! Uniform query capability over the four wire codecs.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::minecraft::{BedrockPingSession, JavaStatusSession};
use crate::source::{A2sSession, RconSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolMethod {
    #[serde(alias = "A2S")]
    A2s,
    #[serde(alias = "RCON")]
    Rcon,
    #[serde(alias = "MinecraftJava")]
    MinecraftJava,
    #[serde(alias = "MinecraftBedrock")]
    MinecraftBedrock,
}

impl ProtocolMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolMethod::A2s => "a2s",
            ProtocolMethod::Rcon => "rcon",
            ProtocolMethod::MinecraftJava => "minecraft_java",
            ProtocolMethod::MinecraftBedrock => "minecraft_bedrock",
        }
    }
}

impl fmt::Display for ProtocolMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how to reach one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTarget {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl QueryTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn addr_label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A connected conversation with one game server.
///
/// `send_command` returns the protocol's textual answer: the raw command
/// output for RCON and an `"online/max"` pair for the status protocols,
/// which ignore the command.
#[async_trait]
pub trait QuerySession: Send {
    fn method(&self) -> ProtocolMethod;

    async fn connect(&mut self) -> Result<()>;

    async fn send_command(&mut self, command: Option<&str>) -> Result<String>;

    async fn close(&mut self) {}
}

pub fn open_session(method: ProtocolMethod, target: &QueryTarget) -> Box<dyn QuerySession> {
    match method {
        ProtocolMethod::A2s => Box::new(A2sSession::new(&target.host, target.port)),
        ProtocolMethod::Rcon => Box::new(RconSession::new(
            &target.host,
            target.port,
            target.password.clone().unwrap_or_default(),
        )),
        ProtocolMethod::MinecraftJava => {
            Box::new(JavaStatusSession::new(&target.host, target.port))
        }
        ProtocolMethod::MinecraftBedrock => {
            Box::new(BedrockPingSession::new(&target.host, target.port))
        }
    }
}

/// Connects, runs one command and closes. Used for the stateless protocols.
pub async fn query_once(
    method: ProtocolMethod,
    target: &QueryTarget,
    command: Option<&str>,
) -> Result<String> {
    let mut session = open_session(method, target);
    session.connect().await?;
    let result = session.send_command(command).await;
    session.close().await;
    result
}

/// Upper bound on a DNS lookup before any datagram is sent.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) async fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr> {
    resolve_addr_within(host, port, RESOLVE_TIMEOUT).await
}

pub(crate) async fn resolve_addr_within(
    host: &str,
    port: u16,
    limit: Duration,
) -> Result<SocketAddr> {
    let label = format!("{}:{}", host, port);
    let mut addrs = match tokio::time::timeout(limit, tokio::net::lookup_host((host, port))).await {
        Ok(Ok(addrs)) => addrs,
        Ok(Err(e)) => return Err(QueryError::connection(label, e)),
        Err(_) => {
            return Err(QueryError::timeout(format!(
                "resolving {} after {:?}",
                label, limit
            )));
        }
    };
    addrs.next().ok_or_else(|| {
        QueryError::connection(
            label,
            std::io::Error::new(std::io::ErrorKind::NotFound, "host did not resolve"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryErrorKind;

    #[test]
    fn test_method_names_round_trip_through_serde() {
        for method in [
            ProtocolMethod::A2s,
            ProtocolMethod::Rcon,
            ProtocolMethod::MinecraftJava,
            ProtocolMethod::MinecraftBedrock,
        ] {
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
            let parsed: ProtocolMethod = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, method);
        }

        let legacy: ProtocolMethod = serde_json::from_str("\"RCON\"").unwrap();
        assert_eq!(legacy, ProtocolMethod::Rcon);
    }

    #[test]
    fn test_open_session_selects_codec() {
        let target = QueryTarget::new("127.0.0.1", 27015).with_password("hunter2");
        for method in [
            ProtocolMethod::A2s,
            ProtocolMethod::Rcon,
            ProtocolMethod::MinecraftJava,
            ProtocolMethod::MinecraftBedrock,
        ] {
            assert_eq!(open_session(method, &target).method(), method);
        }
    }

    #[tokio::test]
    async fn test_resolve_addr_is_bounded() {
        let addr = resolve_addr("127.0.0.1", 19132).await.unwrap();
        assert_eq!(addr, "127.0.0.1:19132".parse::<SocketAddr>().unwrap());

        let err = resolve_addr_within("keeper-test.invalid", 19132, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            QueryErrorKind::Timeout | QueryErrorKind::ConnectionFailure
        ));
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let target = QueryTarget::new("127.0.0.1", 1);
        let mut session = open_session(ProtocolMethod::MinecraftBedrock, &target);
        let err = session.send_command(None).await.unwrap_err();
        assert!(matches!(err, QueryError::NotConnected));
    }
}
