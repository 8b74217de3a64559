//! Legacy (1.6-era) ping client. The request is a fixed-layout plugin
//! message and the response is a kick packet whose body is UTF-16BE text
//! with NUL-separated fields. Servers in the wild garble these fields, so
//! parsing degrades to defaults instead of failing.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::{PingError, ServerStatus};

const PACKET_ID: u8 = 0xFE;
const PING_PAYLOAD: u8 = 0x01;
const PLUGIN_MESSAGE_ID: u8 = 0xFA;
const MAGIC: &str = "MC|PingHost";

/// Protocol version advertised in the ping (1.6.x era).
const LEGACY_PROTOCOL_VERSION: u8 = 78;

/// UTF-16BE "§1" followed by a NUL character: marks the start of the
/// response body.
const RESPONSE_DELIMITER: [u8; 6] = [0x00, 0xA7, 0x00, 0x31, 0x00, 0x00];

/// Cap on how much we read from the server before parsing.
const MAX_RESPONSE_BYTES: u64 = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyPingResponse {
    pub protocol_version: u16,
    pub server_version: String,
    pub motd: String,
    pub current_players: u32,
    pub max_players: u32,
}

fn utf16be(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|unit| unit.to_be_bytes()).collect()
}

/// Builds the legacy ping request. Quirk: the body length that follows the
/// magic identifier is transmitted as UTF-16BE decimal digits, not binary.
pub fn legacy_ping_packet(host: &str, port: u16) -> Vec<u8> {
    let host_chars = host.encode_utf16().count() as u16;
    let body_length = 7 + 2 * host_chars as u32;

    let mut packet = vec![PACKET_ID, PING_PAYLOAD, PLUGIN_MESSAGE_ID];
    packet.extend_from_slice(&utf16be(MAGIC));
    packet.extend_from_slice(&utf16be(&body_length.to_string()));
    packet.push(LEGACY_PROTOCOL_VERSION);
    packet.extend_from_slice(&host_chars.to_be_bytes());
    packet.extend_from_slice(&utf16be(host));
    packet.extend_from_slice(&port.to_be_bytes());
    packet
}

/// Keeps only ASCII digits; a garbled count degrades to 0 rather than
/// killing the poll.
fn digits_or_zero(field: &str) -> u32 {
    let digits: String = field.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

pub fn parse_legacy_response(data: &[u8]) -> Result<LegacyPingResponse, PingError> {
    let start = data
        .windows(RESPONSE_DELIMITER.len())
        .position(|window| window == RESPONSE_DELIMITER)
        .ok_or_else(|| PingError::Protocol("legacy response delimiter not found".into()))?;

    let body = &data[start + RESPONSE_DELIMITER.len()..];
    if body.len() < 2 {
        return Err(PingError::Protocol(
            "legacy response truncated before protocol version".into(),
        ));
    }
    let protocol_version = u16::from_be_bytes([body[0], body[1]]);

    let units: Vec<u16> = body[2..]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let text = String::from_utf16_lossy(&units);

    let mut fields = text.splitn(4, '\0');
    let server_version = fields.next().unwrap_or("").to_string();
    let motd = fields.next().unwrap_or("").to_string();
    let current_players = digits_or_zero(fields.next().unwrap_or(""));
    let max_players = digits_or_zero(fields.next().unwrap_or(""));

    Ok(LegacyPingResponse {
        protocol_version,
        server_version,
        motd,
        current_players,
        max_players,
    })
}

/// Connects, sends the ping, and reads until the server closes the
/// connection (legacy servers hang up after the kick packet).
pub async fn query(host: &str, port: u16, timeout: Duration) -> Result<ServerStatus, PingError> {
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| PingError::Timeout)??;

    stream.write_all(&legacy_ping_packet(host, port)).await?;

    let mut data = Vec::new();
    tokio::time::timeout(timeout, (&mut stream).take(MAX_RESPONSE_BYTES).read_to_end(&mut data))
        .await
        .map_err(|_| PingError::Timeout)??;

    let response = parse_legacy_response(&data)?;
    Ok(ServerStatus {
        version: response.server_version,
        players_online: response.current_players,
        players_max: response.max_players,
        description: response.motd,
    })
}
