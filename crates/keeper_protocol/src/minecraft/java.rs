//! Minecraft Java edition Server List Ping (status) over TCP.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::error::{QueryError, Result};
use crate::session::{ProtocolMethod, QuerySession};
use crate::types::{ProtocolRead, ProtocolString, ProtocolWrite, UnsignedShort, VarInt};

pub const SERVERBOUND_HANDSHAKE_ID: i32 = 0x00;
pub const SERVERBOUND_STATUS_REQUEST_ID: i32 = 0x00;
pub const CLIENTBOUND_STATUS_RESPONSE_ID: i32 = 0x00;

/// Ignored by servers for status requests but must be present.
pub const STATUS_PROTOCOL_VERSION: i32 = 760;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_STATUS_PACKET: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerBoundHandshake {
    pub protocol_version: VarInt,
    pub server_address: ProtocolString,
    pub server_port: UnsignedShort,
    pub next_state: VarInt,
}

impl ServerBoundHandshake {
    pub const STATE_STATUS: i32 = 1;

    pub fn status(server_address: &str, server_port: u16) -> Self {
        Self {
            protocol_version: VarInt(STATUS_PROTOCOL_VERSION),
            server_address: ProtocolString(server_address.to_string()),
            server_port: UnsignedShort(server_port),
            next_state: VarInt(Self::STATE_STATUS),
        }
    }
}

impl ProtocolWrite for ServerBoundHandshake {
    fn write_to<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut written = 0;
        written += self.protocol_version.write_to(writer)?;
        written += self.server_address.write_to(writer)?;
        written += self.server_port.write_to(writer)?;
        written += self.next_state.write_to(writer)?;
        Ok(written)
    }
}

/// Packet id followed by the handshake fields, unframed.
pub fn build_handshake(host: &str, port: u16) -> io::Result<Vec<u8>> {
    let mut body = Vec::new();
    VarInt(SERVERBOUND_HANDSHAKE_ID).write_to(&mut body)?;
    ServerBoundHandshake::status(host, port).write_to(&mut body)?;
    Ok(body)
}

/// Prefixes `payload` with its length as a VarInt.
pub fn frame(payload: &[u8]) -> BytesMut {
    let mut framed = BytesMut::with_capacity(payload.len() + crate::types::MAX_VARINT_LEN);
    VarInt(payload.len() as i32).put(&mut framed);
    framed.put_slice(payload);
    framed
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    players: StatusPlayers,
}

#[derive(Debug, Deserialize)]
struct StatusPlayers {
    online: i64,
    max: i64,
}

/// Parses the body of a status response packet (everything after the
/// outer length) into an `"online/max"` string.
pub fn parse_status_payload(payload: &[u8]) -> Result<String> {
    let mut reader = payload;

    let (VarInt(packet_id), _) = VarInt::read_from(&mut reader)?;
    if packet_id != CLIENTBOUND_STATUS_RESPONSE_ID {
        return Err(QueryError::violation(format!(
            "unexpected status packet id 0x{:02X}",
            packet_id
        )));
    }

    let (VarInt(json_len), _) = VarInt::read_from(&mut reader)?;
    if json_len < 0 || json_len as usize > reader.len() {
        return Err(QueryError::violation(format!(
            "status JSON length {} exceeds packet ({} bytes left)",
            json_len,
            reader.len()
        )));
    }
    let json = &reader[..json_len as usize];

    let status: StatusResponse = serde_json::from_slice(json)
        .map_err(|e| QueryError::violation(format!("invalid status JSON: {}", e)))?;

    Ok(format!("{}/{}", status.players.online, status.players.max))
}

/// One-shot status query, the connection is dropped after the response.
pub struct JavaStatusSession {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    receive_timeout: Duration,
}

impl JavaStatusSession {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            stream: None,
            receive_timeout: RECEIVE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, receive_timeout: Duration) -> Self {
        self.receive_timeout = receive_timeout;
        self
    }

    fn addr_label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl QuerySession for JavaStatusSession {
    fn method(&self) -> ProtocolMethod {
        ProtocolMethod::MinecraftJava
    }

    async fn connect(&mut self) -> Result<()> {
        let label = self.addr_label();
        match timeout(
            self.receive_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(stream)) => {
                self.stream = Some(stream);
                Ok(())
            }
            Ok(Err(e)) => Err(QueryError::connection(label, e)),
            Err(_) => Err(QueryError::timeout(format!("connect to {}", label))),
        }
    }

    #[instrument(name = "java_status", skip(self, _command), fields(host = %self.host, port = self.port))]
    async fn send_command(&mut self, _command: Option<&str>) -> Result<String> {
        let label = self.addr_label();
        let receive_timeout = self.receive_timeout;
        let handshake = frame(&build_handshake(&self.host, self.port)?);
        let status_request = frame(&[SERVERBOUND_STATUS_REQUEST_ID as u8]);
        let stream = self.stream.as_mut().ok_or(QueryError::NotConnected)?;

        let exchange = async {
            stream.write_all(&handshake).await?;
            stream.write_all(&status_request).await?;
            stream.flush().await?;

            let (VarInt(length), _) = VarInt::read_async(&mut *stream).await?;
            if length <= 0 || length as usize > MAX_STATUS_PACKET {
                return Err(QueryError::violation(format!(
                    "status packet length {} out of range",
                    length
                )));
            }
            let mut payload = vec![0u8; length as usize];
            stream.read_exact(&mut payload).await?;
            parse_status_payload(&payload)
        };

        let result = match timeout(receive_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::timeout(format!(
                "status from {} after {:?}",
                label, receive_timeout
            ))),
        };
        if let Ok(players) = &result {
            debug!("Java status from {}: {}", label, players);
        }
        result
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_payload(packet_id: i32, json: &str) -> Vec<u8> {
        let mut payload = BytesMut::new();
        VarInt(packet_id).put(&mut payload);
        VarInt(json.len() as i32).put(&mut payload);
        payload.put_slice(json.as_bytes());
        payload.to_vec()
    }

    #[test]
    fn test_handshake_layout() {
        let body = build_handshake("localhost", 25565).unwrap();
        let mut expected = vec![0x00, 0xF8, 0x05, 9];
        expected.extend_from_slice(b"localhost");
        expected.extend_from_slice(&[0x63, 0xDD, 0x01]);
        assert_eq!(body, expected);

        let framed = frame(&body);
        assert_eq!(framed[0] as usize, body.len());
        assert_eq!(&framed[1..], body.as_slice());
        assert_eq!(frame(&[0x00]).as_ref(), &[0x01, 0x00]);
    }

    #[test]
    fn test_parse_status_payload() {
        let json = r#"{"version":{"name":"1.20.4","protocol":765},"players":{"max":20,"online":3,"sample":[]},"description":{"text":"A Minecraft Server"}}"#;
        assert_eq!(parse_status_payload(&status_payload(0, json)).unwrap(), "3/20");
    }

    #[test]
    fn test_parse_status_rejects_wrong_packet_id() {
        let payload = status_payload(0x01, r#"{"players":{"max":1,"online":0}}"#);
        let err = parse_status_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("unexpected status packet id 0x01"));
    }

    #[test]
    fn test_parse_status_reads_only_declared_json() {
        let mut payload = status_payload(0, r#"{"players":{"max":8,"online":2}}"#);
        payload.extend_from_slice(b"trailing");
        assert_eq!(parse_status_payload(&payload).unwrap(), "2/8");

        let mut payload = status_payload(0, r#"{"players":{"max":8,"online":2}}"#);
        payload.truncate(payload.len() - 1);
        let err = parse_status_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("exceeds packet"));
    }

    #[test]
    fn test_parse_status_rejects_short_or_bad_json() {
        let mut payload = status_payload(0, r#"{"players":{"max":1,"online":0}}"#);
        payload.truncate(payload.len() - 4);
        assert!(parse_status_payload(&payload).is_err());

        let payload = status_payload(0, r#"{"description":"no players"}"#);
        assert!(matches!(
            parse_status_payload(&payload),
            Err(QueryError::ProtocolViolation(_))
        ));
    }
}
