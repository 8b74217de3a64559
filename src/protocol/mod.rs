use std::fmt;
use std::io;
use std::time::Duration;

use clap::ValueEnum;
use thiserror::Error;

use crate::protocol::varint::VarIntError;

pub mod legacy;
pub mod status;
pub mod varint;

/// Errors from a status poll. Everything here is recoverable from the
/// monitor's point of view: a failed poll means "status unknown", not "stop
/// monitoring".
#[derive(Debug, Error)]
pub enum PingError {
    #[error("connection failed: {0}")]
    Connection(#[from] io::Error),
    #[error("no complete response within the read window")]
    Timeout,
    #[error("malformed VarInt in response framing")]
    MalformedVarInt,
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl From<VarIntError> for PingError {
    fn from(_: VarIntError) -> Self {
        PingError::MalformedVarInt
    }
}

/// Player-count snapshot common to both ping variants. The monitor only ever
/// looks at `players_online`; the rest is logged for the operator.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub version: String,
    pub players_online: u32,
    pub players_max: u32,
    pub description: String,
}

/// Which wire format to poll the server with. Modern is the JSON server-list
/// ping; legacy is the 1.6-era UTF-16 ping for servers that predate it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PingVariant {
    Modern,
    Legacy,
}

impl fmt::Display for PingVariant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PingVariant::Modern => write!(f, "modern"),
            PingVariant::Legacy => write!(f, "legacy"),
        }
    }
}

impl PingVariant {
    /// Single query entry point so the monitor never branches on the server
    /// generation at its call sites.
    pub async fn query(
        self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<ServerStatus, PingError> {
        match self {
            PingVariant::Modern => status::query(host, port, timeout).await,
            PingVariant::Legacy => legacy::query(host, port, timeout).await,
        }
    }
}
