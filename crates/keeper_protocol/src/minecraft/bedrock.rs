//! Minecraft Bedrock edition RakNet unconnected ping over UDP.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::error::{QueryError, Result};
use crate::session::{ProtocolMethod, QuerySession, resolve_addr};

pub const ID_UNCONNECTED_PING: u8 = 0x01;
pub const ID_UNCONNECTED_PONG: u8 = 0x1C;

/// RakNet offline message magic.
pub const RAKNET_MAGIC: [u8; 16] = [
    0x00, 0xFF, 0xFF, 0x00, 0xFE, 0xFE, 0xFE, 0xFE, 0xFD, 0xFD, 0xFD, 0xFD, 0x12, 0x34, 0x56, 0x78,
];

pub const PING_LEN: usize = 1 + 8 + 16 + 8;
const MIN_PONG_LEN: usize = 1 + 8 + 8 + 16 + 2;
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_DATAGRAM: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BedrockPong {
    pub server_guid: u64,
    pub motd: String,
    pub protocol: String,
    pub version: String,
    pub online: u32,
    pub max: u32,
}

impl BedrockPong {
    pub fn player_count_text(&self) -> String {
        format!("{}/{}", self.online, self.max)
    }
}

pub fn build_unconnected_ping(timestamp_ms: u64, client_guid: u64) -> BytesMut {
    let mut packet = BytesMut::with_capacity(PING_LEN);
    packet.put_u8(ID_UNCONNECTED_PING);
    packet.put_u64(timestamp_ms);
    packet.put_slice(&RAKNET_MAGIC);
    packet.put_u64(client_guid);
    packet
}

/// Reads the server id string, whose 2-byte length may be either endian.
/// Falls back to the raw remainder when neither length fits.
fn read_server_id(rest: &[u8]) -> String {
    if rest.len() >= 2 {
        let available = rest.len() - 2;
        let be_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        let le_len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        if be_len > 0 && be_len <= available {
            return String::from_utf8_lossy(&rest[2..2 + be_len]).into_owned();
        }
        if le_len > 0 && le_len <= available {
            return String::from_utf8_lossy(&rest[2..2 + le_len]).into_owned();
        }
    }
    String::from_utf8_lossy(rest).into_owned()
}

pub fn parse_unconnected_pong(buffer: &[u8]) -> Result<BedrockPong> {
    if buffer.len() < MIN_PONG_LEN {
        return Err(QueryError::violation(format!(
            "Bedrock pong too short ({} bytes)",
            buffer.len()
        )));
    }
    if buffer[0] != ID_UNCONNECTED_PONG {
        return Err(QueryError::violation(format!(
            "unexpected Bedrock packet id 0x{:02X}",
            buffer[0]
        )));
    }

    let mut guid = [0u8; 8];
    guid.copy_from_slice(&buffer[9..17]);
    let server_guid = u64::from_be_bytes(guid);

    if buffer[17..33] != RAKNET_MAGIC {
        return Err(QueryError::violation("Bedrock pong has bad magic"));
    }

    let server_id = read_server_id(&buffer[33..]);
    let parts: Vec<&str> = server_id.split(';').collect();
    if parts.len() < 6 || !parts[0].eq_ignore_ascii_case("MCPE") {
        return Err(QueryError::violation("invalid Bedrock pong server id"));
    }

    Ok(BedrockPong {
        server_guid,
        motd: parts[1].to_string(),
        protocol: parts[2].to_string(),
        version: parts[3].to_string(),
        online: parts[4].trim().parse().unwrap_or(0),
        max: parts[5].trim().parse().unwrap_or(0),
    })
}

/// One-shot ping session. Each call sends a fresh ping with a random guid.
pub struct BedrockPingSession {
    host: String,
    port: u16,
    socket: Option<UdpSocket>,
    receive_timeout: Duration,
}

impl BedrockPingSession {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            socket: None,
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
impl QuerySession for BedrockPingSession {
    fn method(&self) -> ProtocolMethod {
        ProtocolMethod::MinecraftBedrock
    }

    async fn connect(&mut self) -> Result<()> {
        let addr = resolve_addr(&self.host, self.port).await?;
        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket
            .connect(addr)
            .await
            .map_err(|e| QueryError::connection(self.addr_label(), e))?;
        self.socket = Some(socket);
        Ok(())
    }

    #[instrument(name = "bedrock_ping", skip(self, _command), fields(host = %self.host, port = self.port))]
    async fn send_command(&mut self, _command: Option<&str>) -> Result<String> {
        let socket = self.socket.as_ref().ok_or(QueryError::NotConnected)?;

        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let ping = build_unconnected_ping(now_ms, rand::random::<u64>());
        socket.send(&ping).await?;

        let mut buffer = vec![0u8; MAX_DATAGRAM];
        let len = match timeout(self.receive_timeout, socket.recv(&mut buffer)).await {
            Ok(Ok(len)) => len,
            Ok(Err(e)) => return Err(QueryError::connection(self.addr_label(), e)),
            Err(_) => {
                return Err(QueryError::timeout(format!(
                    "Bedrock pong from {} after {:?}",
                    self.addr_label(),
                    self.receive_timeout
                )));
            }
        };

        let pong = parse_unconnected_pong(&buffer[..len])?;
        debug!(
            "Bedrock pong from {}: {} (v{}), {}/{}",
            self.addr_label(),
            pong.motd,
            pong.version,
            pong.online,
            pong.max
        );
        Ok(pong.player_count_text())
    }

    async fn close(&mut self) {
        self.socket = None;
    }
}
