//! Source engine `A2S_INFO` query over UDP.
//!
//! The request is `FF FF FF FF 'T' "Source Engine Query\0"`, optionally
//! followed by the 4-byte challenge handed out by an `S2C_CHALLENGE` reply.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout};
use tracing::{debug, instrument, trace};

use crate::error::{QueryError, Result};
use crate::session::{ProtocolMethod, QuerySession, resolve_addr};

pub const SINGLE_PACKET_PREFIX: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
pub const A2S_INFO_REQUEST: u8 = b'T';
pub const S2C_CHALLENGE: u8 = 0x41;
pub const S2A_INFO: u8 = 0x49;
pub const INFO_PAYLOAD: &[u8] = b"Source Engine Query\0";

const RECEIVE_WINDOW: Duration = Duration::from_secs(3);
const OVERALL_DEADLINE: Duration = Duration::from_secs(15);
const MAX_DATAGRAM: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A2sInfo {
    pub protocol: u8,
    pub name: String,
    pub map: String,
    pub folder: String,
    pub game: String,
    pub app_id: u16,
    pub players: u8,
    pub max_players: u8,
    pub bots: u8,
}

impl A2sInfo {
    pub fn player_count_text(&self) -> String {
        format!("{}/{}", self.players, self.max_players)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum A2sResponse {
    Challenge([u8; 4]),
    Info(A2sInfo),
}

pub fn build_info_request(challenge: Option<[u8; 4]>) -> BytesMut {
    let mut packet = BytesMut::with_capacity(5 + INFO_PAYLOAD.len() + 4);
    packet.put_slice(&SINGLE_PACKET_PREFIX);
    packet.put_u8(A2S_INFO_REQUEST);
    packet.put_slice(INFO_PAYLOAD);
    if let Some(challenge) = challenge {
        packet.put_slice(&challenge);
    }
    packet
}

/// Classifies a reply by its header byte (offset 4).
pub fn parse_response(buffer: &[u8]) -> Result<A2sResponse> {
    if buffer.len() < 5 {
        return Err(QueryError::violation(format!(
            "A2S reply too short ({} bytes)",
            buffer.len()
        )));
    }
    if buffer[..4] != SINGLE_PACKET_PREFIX {
        return Err(QueryError::violation(
            "A2S split-packet replies are not supported",
        ));
    }

    match buffer[4] {
        S2C_CHALLENGE => {
            if buffer.len() < 9 {
                return Err(QueryError::violation("A2S challenge truncated"));
            }
            let mut challenge = [0u8; 4];
            challenge.copy_from_slice(&buffer[5..9]);
            Ok(A2sResponse::Challenge(challenge))
        }
        S2A_INFO => parse_info(buffer).map(A2sResponse::Info),
        other => Err(QueryError::violation(format!(
            "unexpected A2S header 0x{:02X}",
            other
        ))),
    }
}

/// Parses an `S2A_INFO` datagram, bounds-checking every read.
pub fn parse_info(buffer: &[u8]) -> Result<A2sInfo> {
    if buffer.len() < 6 {
        return Err(QueryError::violation("A2S info reply truncated"));
    }
    let mut index = 4;
    let header = buffer[index];
    index += 1;
    if header != S2A_INFO {
        return Err(QueryError::violation(format!(
            "invalid A2S info header (expected 0x49, got 0x{:02X})",
            header
        )));
    }

    let protocol = buffer[index];
    index += 1;

    let name = read_cstring(buffer, &mut index);
    let map = read_cstring(buffer, &mut index);
    let folder = read_cstring(buffer, &mut index);
    let game = read_cstring(buffer, &mut index);

    if index + 2 > buffer.len() {
        return Err(QueryError::violation("A2S info reply truncated at app id"));
    }
    let app_id = u16::from_le_bytes([buffer[index], buffer[index + 1]]);
    index += 2;

    if index + 3 > buffer.len() {
        return Err(QueryError::violation(
            "A2S info reply truncated at player counts",
        ));
    }

    Ok(A2sInfo {
        protocol,
        name,
        map,
        folder,
        game,
        app_id,
        players: buffer[index],
        max_players: buffer[index + 1],
        bots: buffer[index + 2],
    })
}

/// Reads a null-terminated string starting at `index` and leaves `index`
/// past the terminator. Never reads beyond the end of `buffer`.
pub fn read_cstring(buffer: &[u8], index: &mut usize) -> String {
    let start = (*index).min(buffer.len());
    let end = buffer[start..]
        .iter()
        .position(|&b| b == 0)
        .map(|offset| start + offset)
        .unwrap_or(buffer.len());
    let value = String::from_utf8_lossy(&buffer[start..end]).into_owned();
    *index = if end < buffer.len() { end + 1 } else { end };
    value
}

fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in data.chunks(16).enumerate() {
        let _ = write!(out, "\n{:04X}: ", row * 16);
        for byte in chunk {
            let _ = write!(out, "{:02X} ", byte);
        }
        out.push_str(" | ");
        for &byte in chunk {
            out.push(if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            });
        }
    }
    out
}

/// One-shot A2S session. Not reused across cycles.
pub struct A2sSession {
    host: String,
    port: u16,
    socket: Option<UdpSocket>,
    receive_window: Duration,
    deadline: Duration,
}

impl A2sSession {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            socket: None,
            receive_window: RECEIVE_WINDOW,
            deadline: OVERALL_DEADLINE,
        }
    }

    pub fn with_timeouts(mut self, receive_window: Duration, deadline: Duration) -> Self {
        self.receive_window = receive_window;
        self.deadline = deadline;
        self
    }

    /// Waits for one datagram, re-sending `request` whenever a receive window
    /// lapses, until the shared `deadline` expires.
    async fn receive(&self, socket: &UdpSocket, request: &[u8], deadline: Instant) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; MAX_DATAGRAM];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(QueryError::timeout(format!(
                    "A2S info from {}:{} after {:?}",
                    self.host, self.port, self.deadline
                )));
            }

            match timeout(self.receive_window.min(remaining), socket.recv(&mut buffer)).await {
                Ok(Ok(len)) => {
                    buffer.truncate(len);
                    return Ok(buffer);
                }
                Ok(Err(e)) => return Err(QueryError::connection(self.addr_label(), e)),
                Err(_) => {
                    debug!("No A2S reply from {} within {:?}, re-sending", self.addr_label(), self.receive_window);
                    socket.send(request).await?;
                }
            }
        }
    }

    fn addr_label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl QuerySession for A2sSession {
    fn method(&self) -> ProtocolMethod {
        ProtocolMethod::A2s
    }

    async fn connect(&mut self) -> Result<()> {
        let addr: SocketAddr = resolve_addr(&self.host, self.port).await?;
        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket
            .connect(addr)
            .await
            .map_err(|e| QueryError::connection(self.addr_label(), e))?;
        debug!("A2S socket ready for {}", addr);
        self.socket = Some(socket);
        Ok(())
    }

    #[instrument(name = "a2s_info", skip(self, _command), fields(host = %self.host, port = self.port))]
    async fn send_command(&mut self, _command: Option<&str>) -> Result<String> {
        let socket = self.socket.as_ref().ok_or(QueryError::NotConnected)?;
        let deadline = Instant::now() + self.deadline;

        let mut request = build_info_request(None);
        let mut challenged = false;

        loop {
            socket.send(&request).await?;
            let datagram = self.receive(socket, &request, deadline).await?;
            trace!("A2S reply from {}:{}", self.addr_label(), hex_dump(&datagram));

            match parse_response(&datagram)? {
                A2sResponse::Challenge(challenge) => {
                    if challenged {
                        return Err(QueryError::violation("A2S server repeated its challenge"));
                    }
                    debug!("Received A2S challenge 0x{:08X}", u32::from_le_bytes(challenge));
                    challenged = true;
                    request = build_info_request(Some(challenge));
                }
                A2sResponse::Info(info) => {
                    debug!(
                        "A2S info: {} on {} ({}), {}/{} players, {} bots",
                        info.name, info.map, info.game, info.players, info.max_players, info.bots
                    );
                    return Ok(info.player_count_text());
                }
            }
        }
    }

    async fn close(&mut self) {
        self.socket = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn info_datagram(players: u8, max_players: u8) -> Vec<u8> {
        let mut buf = SINGLE_PACKET_PREFIX.to_vec();
        buf.push(S2A_INFO);
        buf.push(17);
        for field in ["My Server", "de_dust2", "csgo", "Counter-Strike"] {
            buf.extend_from_slice(field.as_bytes());
            buf.push(0);
        }
        buf.extend_from_slice(&730u16.to_le_bytes());
        buf.push(players);
        buf.push(max_players);
        buf.push(2);
        buf.extend_from_slice(b"dl\0");
        buf
    }

    #[test]
    fn test_info_request_layout() {
        let packet = build_info_request(None);
        assert_eq!(&packet[..5], &[0xFF, 0xFF, 0xFF, 0xFF, 0x54]);
        assert_eq!(&packet[5..], b"Source Engine Query\0");
        assert_eq!(packet.len(), 25);

        let challenged = build_info_request(Some([0x01, 0x02, 0x03, 0x04]));
        assert_eq!(challenged.len(), 29);
        assert_eq!(&challenged[25..], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_parse_info_recovers_player_counts() {
        for (players, max) in [(0u8, 0u8), (7, 24), (64, 64), (255, 255)] {
            let info = parse_info(&info_datagram(players, max)).unwrap();
            assert_eq!(info.players, players);
            assert_eq!(info.max_players, max);
            assert_eq!(info.name, "My Server");
            assert_eq!(info.map, "de_dust2");
            assert_eq!(info.app_id, 730);
            assert_eq!(info.bots, 2);
        }
    }

    #[test]
    fn test_parse_info_rejects_other_headers() {
        let mut buf = info_datagram(3, 10);
        for header in [0x00u8, 0x41, 0x44, 0x6D, 0xFF] {
            buf[4] = header;
            assert!(parse_info(&buf).is_err(), "header 0x{:02X} accepted", header);
        }
    }

    #[test]
    fn test_parse_info_rejects_truncation() {
        let full = info_datagram(3, 10);
        let counts_at = full.len() - 3 - 3;
        for cut in [5, 6, 12, counts_at, counts_at + 2] {
            assert!(parse_info(&full[..cut]).is_err(), "cut at {} accepted", cut);
        }
        assert!(parse_info(&full[..counts_at + 3]).is_ok());
    }

    #[test]
    fn test_read_cstring_stops_at_buffer_end() {
        let buf = b"abc\0def";
        let mut index = 0;
        assert_eq!(read_cstring(buf, &mut index), "abc");
        assert_eq!(index, 4);
        assert_eq!(read_cstring(buf, &mut index), "def");
        assert_eq!(index, buf.len());
        assert_eq!(read_cstring(buf, &mut index), "");
        assert_eq!(index, buf.len());

        let mut past_end = 42;
        assert_eq!(read_cstring(buf, &mut past_end), "");
    }

    #[test]
    fn test_parse_response_challenge() {
        let buf = [0xFF, 0xFF, 0xFF, 0xFF, 0x41, 0xDE, 0xAD, 0xBE, 0xEF];
        assert_eq!(
            parse_response(&buf).unwrap(),
            A2sResponse::Challenge([0xDE, 0xAD, 0xBE, 0xEF])
        );
        assert!(parse_response(&buf[..7]).is_err());
    }

    #[test]
    fn test_hex_dump_rows() {
        let dump = hex_dump(&info_datagram(1, 2));
        assert!(dump.contains("0000: FF FF FF FF 49"));
        assert!(dump.contains("0010: "));
    }
}
