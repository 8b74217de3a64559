//! Modern server-list-ping client: VarInt-framed packets carrying a JSON
//! status payload. The JSON is self-describing, so this module only needs to
//! get the framing right.

use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::{varint, PingError, ServerStatus};

/// Protocol version sent in the handshake probe. Status requests work with
/// any value; the server echoes its own version in the response.
const PROBE_PROTOCOL_VERSION: u32 = 4;

/// Handshake / status-request packet id.
const PACKET_ID_STATUS: u32 = 0;

/// Next-state value selecting the status flow.
pub const NEXT_STATE_STATUS: u32 = 1;

/// Cap on a claimed response-packet length. A status JSON is a few KiB at
/// most; a larger claim means the peer is not speaking this protocol, and
/// honoring it would let a bad peer force an arbitrary allocation.
const MAX_PACKET_BYTES: u32 = 1024 * 1024;

#[derive(Deserialize)]
struct StatusJson {
    version: VersionJson,
    players: PlayersJson,
    description: serde_json::Value,
}

#[derive(Deserialize)]
struct VersionJson {
    name: String,
    protocol: i32,
}

#[derive(Deserialize)]
struct PlayersJson {
    max: u32,
    online: u32,
}

fn frame(packet_id: u32, body: &[u8]) -> Vec<u8> {
    let mut data = varint::encode(packet_id);
    data.extend_from_slice(body);
    let mut packet = varint::encode(data.len() as u32);
    packet.extend_from_slice(&data);
    packet
}

/// Handshake packet: probe protocol version, length-prefixed host, port,
/// next state.
pub fn handshake_packet(host: &str, port: u16, next_state: u32) -> Vec<u8> {
    let mut body = varint::encode(PROBE_PROTOCOL_VERSION);
    body.extend_from_slice(&varint::encode(host.len() as u32));
    body.extend_from_slice(host.as_bytes());
    body.extend_from_slice(&port.to_be_bytes());
    body.extend_from_slice(&varint::encode(next_state));
    frame(PACKET_ID_STATUS, &body)
}

/// Status-request packet: id 0, empty body.
pub fn status_request_packet() -> Vec<u8> {
    frame(PACKET_ID_STATUS, &[])
}

/// Reads a VarInt off the stream one byte at a time, honoring the same
/// 5-byte bound as the slice decoder.
async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32, PingError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = reader.read_u8().await?;
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(PingError::MalformedVarInt)
}

/// Connects, performs the handshake + status request exchange, and decodes
/// the one response packet into a [`ServerStatus`].
pub async fn query(host: &str, port: u16, timeout: Duration) -> Result<ServerStatus, PingError> {
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| PingError::Timeout)??;

    stream.write_all(&handshake_packet(host, port, NEXT_STATE_STATUS)).await?;
    stream.write_all(&status_request_packet()).await?;

    let payload = tokio::time::timeout(timeout, read_response_packet(&mut stream))
        .await
        .map_err(|_| PingError::Timeout)??;

    decode_status_payload(&payload)
}

/// Reads one VarInt-framed packet and returns its body with the leading
/// response packet id stripped.
async fn read_response_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, PingError> {
    let length = read_varint(reader).await?;
    if length == 0 || length > MAX_PACKET_BYTES {
        return Err(PingError::Protocol(format!(
            "implausible packet length {length}"
        )));
    }
    let mut data = vec![0u8; length as usize];
    reader.read_exact(&mut data).await?;

    let (_packet_id, consumed) = varint::decode(&data)?;
    Ok(data.split_off(consumed))
}

fn decode_status_payload(payload: &[u8]) -> Result<ServerStatus, PingError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| PingError::Protocol(format!("status payload is not UTF-8: {e}")))?;
    let json: StatusJson = serde_json::from_str(text)
        .map_err(|e| PingError::Protocol(format!("bad status JSON: {e}")))?;

    // Old servers send the description as a plain string, newer ones as a
    // chat object. Either way it's informational only.
    let description = match &json.description {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    Ok(ServerStatus {
        version: format!("{} (protocol {})", json.version.name, json.version.protocol),
        players_online: json.players.online,
        players_max: json.players.max,
        description,
    })
}
