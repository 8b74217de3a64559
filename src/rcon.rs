//! Source-RCON control channel used to issue the graceful `stop` command.
//! Frames are little-endian length-prefixed; auth failure is signalled by
//! the reserved request id -1.

use std::io;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

pub const TYPE_AUTH: i32 = 3;
pub const TYPE_COMMAND: i32 = 2;
pub const TYPE_AUTH_RESPONSE: i32 = 2;
pub const TYPE_RESPONSE: i32 = 0;

/// Reserved request id the server answers with on bad credentials.
const AUTH_FAILURE_SENTINEL: i32 = -1;

/// Upper bound on a sane response frame; anything bigger means we are not
/// talking to an RCON server.
const MAX_FRAME_BYTES: i32 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum RconError {
    #[error("connection failed: {0}")]
    Connection(#[from] io::Error),
    #[error("no response within the read window")]
    Timeout,
    #[error("authentication rejected; check the RCON secret")]
    AuthenticationFailed,
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// One parsed response frame.
#[derive(Debug)]
struct RconResponse {
    request_id: i32,
    packet_type: i32,
    payload: String,
}

/// A control-channel session. Commands are rejected until `authenticate`
/// has succeeded, matching the server's own behavior.
pub struct RconClient {
    stream: TcpStream,
    timeout: Duration,
    authenticated: bool,
}

fn fresh_request_id() -> i32 {
    // Positive and never the -1 failure sentinel.
    rand::thread_rng().gen_range(1..i32::MAX)
}

impl RconClient {
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, RconError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| RconError::Timeout)??;
        Ok(Self {
            stream,
            timeout,
            authenticated: false,
        })
    }

    /// Sends the password and validates the acknowledgement. An id of -1
    /// means the secret was rejected, whatever type the frame claims; any
    /// other mismatch means the peer is not speaking RCON at us.
    pub async fn authenticate(&mut self, secret: &str) -> Result<(), RconError> {
        let request_id = fresh_request_id();
        let response = self.exchange(request_id, TYPE_AUTH, secret).await?;

        if response.request_id == AUTH_FAILURE_SENTINEL {
            return Err(RconError::AuthenticationFailed);
        }
        if response.request_id != request_id || response.packet_type != TYPE_AUTH_RESPONSE {
            return Err(RconError::Protocol(format!(
                "unexpected auth response (id {}, type {}); wrong port or not an RCON server?",
                response.request_id, response.packet_type
            )));
        }

        self.authenticated = true;
        debug!("rcon session authenticated");
        Ok(())
    }

    /// Dispatches a command and returns the response payload. Only valid
    /// after `authenticate`.
    pub async fn send_command(&mut self, command: &str) -> Result<String, RconError> {
        if !self.authenticated {
            return Err(RconError::Protocol(
                "command sent before authentication".into(),
            ));
        }
        let request_id = fresh_request_id();
        let response = self.exchange(request_id, TYPE_COMMAND, command).await?;
        debug!(command, payload = %response.payload, "rcon command dispatched");
        Ok(response.payload)
    }

    async fn exchange(
        &mut self,
        request_id: i32,
        packet_type: i32,
        payload: &str,
    ) -> Result<RconResponse, RconError> {
        self.stream
            .write_all(&encode_frame(request_id, packet_type, payload))
            .await?;

        tokio::time::timeout(self.timeout, read_frame(&mut self.stream))
            .await
            .map_err(|_| RconError::Timeout)?
    }
}

fn encode_frame(request_id: i32, packet_type: i32, payload: &str) -> Vec<u8> {
    let body_len = 4 + 4 + payload.len() + 2;
    let mut frame = Vec::with_capacity(4 + body_len);
    frame.extend_from_slice(&(body_len as i32).to_le_bytes());
    frame.extend_from_slice(&request_id.to_le_bytes());
    frame.extend_from_slice(&packet_type.to_le_bytes());
    frame.extend_from_slice(payload.as_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame
}

async fn read_frame(stream: &mut TcpStream) -> Result<RconResponse, RconError> {
    let length = stream.read_i32_le().await?;
    if !(10..=MAX_FRAME_BYTES).contains(&length) {
        return Err(RconError::Protocol(format!(
            "implausible frame length {length}"
        )));
    }

    let mut body = vec![0u8; length as usize];
    stream.read_exact(&mut body).await?;

    let request_id = i32::from_le_bytes(body[0..4].try_into().unwrap());
    let packet_type = i32::from_le_bytes(body[4..8].try_into().unwrap());

    // Payload runs from the header to the first NUL. Lossy decode: a
    // garbled diagnostic string must not abort the session.
    let terminator = body[8..].iter().position(|&b| b == 0).map(|i| 8 + i);
    let payload = match terminator {
        Some(end) => String::from_utf8_lossy(&body[8..end]).into_owned(),
        None => String::new(),
    };

    Ok(RconResponse {
        request_id,
        packet_type,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Minimal scripted RCON peer: reads one frame, answers with the given
    /// id/type/payload, repeats for each script entry.
    async fn mock_server(
        listener: TcpListener,
        script: Vec<(ResponseId, i32, &'static str)>,
    ) {
        let (mut socket, _) = listener.accept().await.unwrap();
        for (id, packet_type, payload) in script {
            let length = socket.read_i32_le().await.unwrap();
            let mut body = vec![0u8; length as usize];
            socket.read_exact(&mut body).await.unwrap();
            let request_id = i32::from_le_bytes(body[0..4].try_into().unwrap());

            let response_id = match id {
                ResponseId::Echo => request_id,
                ResponseId::Fixed(value) => value,
            };
            socket
                .write_all(&encode_frame(response_id, packet_type, payload))
                .await
                .unwrap();
        }
    }

    enum ResponseId {
        Echo,
        Fixed(i32),
    }

    #[test]
    fn frame_layout_matches_the_wire_contract() {
        let frame = encode_frame(7, TYPE_AUTH, "hunter2");
        assert_eq!(&frame[0..4], &17i32.to_le_bytes());
        assert_eq!(&frame[4..8], &7i32.to_le_bytes());
        assert_eq!(&frame[8..12], &3i32.to_le_bytes());
        assert_eq!(&frame[12..19], b"hunter2");
        assert_eq!(&frame[19..21], &[0, 0]);
    }

    #[test]
    fn request_ids_stay_clear_of_the_sentinel() {
        for _ in 0..1000 {
            let id = fresh_request_id();
            assert!(id >= 1);
        }
    }

    #[tokio::test]
    async fn auth_and_command_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(mock_server(
            listener,
            vec![
                (ResponseId::Echo, TYPE_AUTH_RESPONSE, ""),
                (ResponseId::Echo, TYPE_RESPONSE, "Stopping the server"),
            ],
        ));

        let mut client = RconClient::connect("127.0.0.1", addr.port(), Duration::from_secs(5))
            .await
            .unwrap();
        client.authenticate("hunter2").await.unwrap();
        let payload = client.send_command("stop").await.unwrap();
        assert_eq!(payload, "Stopping the server");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn sentinel_id_is_authentication_failure_regardless_of_type() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(mock_server(
            listener,
            vec![(ResponseId::Fixed(-1), TYPE_AUTH_RESPONSE, "")],
        ));

        let mut client = RconClient::connect("127.0.0.1", addr.port(), Duration::from_secs(5))
            .await
            .unwrap();
        let err = client.authenticate("wrong").await.unwrap_err();
        assert!(matches!(err, RconError::AuthenticationFailed));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn mismatched_id_is_a_protocol_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(mock_server(
            listener,
            vec![(ResponseId::Fixed(42), TYPE_AUTH_RESPONSE, "")],
        ));

        let mut client = RconClient::connect("127.0.0.1", addr.port(), Duration::from_secs(5))
            .await
            .unwrap();
        let err = client.authenticate("hunter2").await.unwrap_err();
        assert!(matches!(err, RconError::Protocol(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn command_before_auth_is_rejected_locally() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // No server script: the client must fail before touching the wire.
        let _hold = listener;

        let mut client = RconClient::connect("127.0.0.1", addr.port(), Duration::from_secs(5))
            .await
            .unwrap();
        let err = client.send_command("stop").await.unwrap_err();
        assert!(matches!(err, RconError::Protocol(_)));
    }
}
