//! Source RCON over TCP.
//!
//! Frame layout: `[i32 LE size][i32 LE id][i32 LE type][body][0x00 0x00]`,
//! where `size` counts everything after itself.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::error::{QueryError, Result};
use crate::session::{ProtocolMethod, QuerySession};

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// id + type + two trailing nulls
const HEADER_AND_PADDING: usize = 10;
const MAX_PACKET_SIZE: usize = 1 << 16;
const IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl RconPacket {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    pub fn encode(&self) -> BytesMut {
        let body = self.body.as_bytes();
        let size = HEADER_AND_PADDING + body.len();
        let mut frame = BytesMut::with_capacity(4 + size);
        frame.put_i32_le(size as i32);
        frame.put_i32_le(self.id);
        frame.put_i32_le(self.kind);
        frame.put_slice(body);
        frame.put_u8(0);
        frame.put_u8(0);
        frame
    }

    /// Decodes a complete frame, size prefix included.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < 4 {
            return Err(QueryError::violation("RCON frame shorter than its size field"));
        }
        let size = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        if size < 0 || size as usize != frame.len() - 4 {
            return Err(QueryError::violation(format!(
                "RCON size field {} does not match frame length {}",
                size,
                frame.len() - 4
            )));
        }
        Self::from_payload(&frame[4..])
    }

    /// Decodes everything after the size prefix.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() < HEADER_AND_PADDING {
            return Err(QueryError::violation(format!(
                "RCON packet too short ({} bytes)",
                payload.len()
            )));
        }
        let id = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let kind = i32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let body_end = payload.len() - 2;
        let body = String::from_utf8_lossy(&payload[8..body_end]).into_owned();
        Ok(Self { id, kind, body })
    }
}

/// Reads one packet: the 4-byte size first, then exactly `size` more bytes.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<RconPacket> {
    let size = reader.read_i32_le().await?;
    if size < HEADER_AND_PADDING as i32 || size as usize > MAX_PACKET_SIZE {
        return Err(QueryError::violation(format!(
            "RCON packet size {} out of range",
            size
        )));
    }

    let mut payload = vec![0u8; size as usize];
    reader.read_exact(&mut payload).await?;
    RconPacket::from_payload(&payload)
}

/// Persistent, authenticated RCON connection.
pub struct RconSession {
    host: String,
    port: u16,
    password: String,
    stream: Option<TcpStream>,
    request_id: i32,
    authenticated: bool,
    io_timeout: Duration,
}

impl RconSession {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            stream: None,
            request_id: 0,
            authenticated: false,
            io_timeout: IO_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn addr_label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn next_id(&mut self) -> i32 {
        self.request_id = self.request_id.wrapping_add(1).max(1);
        self.request_id
    }

    async fn exchange(&mut self, packet: RconPacket) -> Result<RconPacket> {
        let label = self.addr_label();
        let io_timeout = self.io_timeout;
        let stream = self.stream.as_mut().ok_or(QueryError::NotConnected)?;

        let round_trip = async {
            stream.write_all(&packet.encode()).await?;
            stream.flush().await?;
            let mut reply = read_packet(&mut *stream).await?;
            // Source servers send an empty RESPONSE_VALUE ahead of the auth reply
            if packet.kind == SERVERDATA_AUTH && reply.kind == SERVERDATA_RESPONSE_VALUE {
                reply = read_packet(&mut *stream).await?;
            }
            Ok::<_, QueryError>(reply)
        };

        match timeout(io_timeout, round_trip).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::timeout(format!(
                "RCON reply from {} after {:?}",
                label, io_timeout
            ))),
        }
    }

    /// Sends the AUTH packet. The reply must be an AUTH_RESPONSE echoing our id.
    pub async fn authenticate(&mut self) -> Result<()> {
        let id = self.next_id();
        let password = self.password.clone();
        let reply = self
            .exchange(RconPacket::new(id, SERVERDATA_AUTH, password))
            .await?;

        if reply.kind == SERVERDATA_AUTH_RESPONSE && reply.id == id {
            self.authenticated = true;
            debug!("RCON session authenticated with {}", self.addr_label());
            Ok(())
        } else {
            self.authenticated = false;
            warn!(
                "RCON authentication rejected by {} (id {}, type {})",
                self.addr_label(),
                reply.id,
                reply.kind
            );
            Err(QueryError::AuthFailure(self.addr_label()))
        }
    }
}

#[async_trait]
impl QuerySession for RconSession {
    fn method(&self) -> ProtocolMethod {
        ProtocolMethod::Rcon
    }

    #[instrument(name = "rcon_connect", skip(self), fields(host = %self.host, port = self.port))]
    async fn connect(&mut self) -> Result<()> {
        let label = self.addr_label();
        let stream = match timeout(self.io_timeout, TcpStream::connect((self.host.as_str(), self.port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(QueryError::connection(label, e)),
            Err(_) => return Err(QueryError::timeout(format!("RCON connect to {}", label))),
        };
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        self.authenticated = false;
        self.authenticate().await
    }

    async fn send_command(&mut self, command: Option<&str>) -> Result<String> {
        if !self.authenticated {
            return Err(QueryError::NotConnected);
        }
        let command = command
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| QueryError::violation("RCON requires a command"))?;

        let id = self.next_id();
        let reply = self
            .exchange(RconPacket::new(id, SERVERDATA_EXECCOMMAND, command))
            .await?;
        if reply.id != id {
            // The stream is out of step with our requests, it cannot be trusted again
            self.authenticated = false;
            return Err(QueryError::violation(format!(
                "RCON reply id {} from {} does not match request id {}",
                reply.id,
                self.addr_label(),
                id
            )));
        }
        debug!("RCON response from {}: {}", self.addr_label(), reply.body);
        Ok(reply.body)
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.authenticated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_layout() {
        let frame = RconPacket::new(7, SERVERDATA_AUTH, "pw").encode();
        assert_eq!(
            frame.as_ref(),
            &[12, 0, 0, 0, 7, 0, 0, 0, 3, 0, 0, 0, b'p', b'w', 0, 0]
        );
    }

    #[test]
    fn test_encode_decode_preserves_body() {
        for body in ["", "list", "There are 3 of a max of 20 players online", "héllo wörld"] {
            let packet = RconPacket::new(42, SERVERDATA_RESPONSE_VALUE, body);
            let decoded = RconPacket::decode(&packet.encode()).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn test_decode_rejects_bad_size() {
        let mut frame = RconPacket::new(1, 2, "abc").encode().to_vec();
        frame[0] = 99;
        assert!(RconPacket::decode(&frame).is_err());
        assert!(RconPacket::from_payload(&[0u8; 9]).is_err());
    }

    #[tokio::test]
    async fn test_read_packet_accepts_split_segments() {
        let frame = RconPacket::new(5, SERVERDATA_RESPONSE_VALUE, "split body").encode();
        let (head, tail) = frame.split_at(6);
        let mut reader = tokio_test::io::Builder::new()
            .read(head)
            .read(tail)
            .build();
        let packet = read_packet(&mut reader).await.unwrap();
        assert_eq!(packet.id, 5);
        assert_eq!(packet.body, "split body");
    }

    #[tokio::test]
    async fn test_read_packet_rejects_oversized_length() {
        let bytes = (MAX_PACKET_SIZE as i32 + 1).to_le_bytes();
        let mut reader = &bytes[..];
        let err = read_packet(&mut reader).await.unwrap_err();
        assert!(matches!(err, QueryError::ProtocolViolation(_)));
    }

    #[test]
    fn test_request_ids_increment() {
        let mut session = RconSession::new("127.0.0.1", 25575, "pw");
        assert_eq!(session.next_id(), 1);
        assert_eq!(session.next_id(), 2);
        session.request_id = i32::MAX;
        assert_eq!(session.next_id(), 1);
    }
}
