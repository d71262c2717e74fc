//! Error types shared by the codec, the record source and the drivers.

use std::net::SocketAddr;
use std::num::ParseIntError;
use std::time::Duration;
use thiserror::Error;

/// Failures while framing, sending or receiving protocol bytes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("short write: {written} of {expected} bytes sent")]
    ShortWrite { written: usize, expected: usize },

    #[error("short read: {read} of {expected} bytes received")]
    ShortRead { read: usize, expected: usize },

    #[error("connection closed by peer while expecting {expected} bytes")]
    ConnectionClosed { expected: usize },

    #[error("unknown request tag {0:#04x}")]
    UnknownRequestTag(u8),

    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("string of {len} bytes does not fit a 32-bit length prefix")]
    StringTooLong { len: usize },

    #[error("batch of {len} records does not fit a 32-bit count")]
    BatchTooLarge { len: usize },

    #[error("{what} truncated: need {needed} bytes, {remaining} remaining")]
    Truncated {
        what: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A raw input line could not be turned into a bet.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid {field} {value:?}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("line {line}: missing field {field}")]
    MissingField { line: usize, field: &'static str },

    #[error("failed to read records: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the submission and polling drivers.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connecting to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Source(#[from] RecordError),

    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    pub(crate) fn connect(addr: impl ToString, source: std::io::Error) -> Self {
        Self::Connect {
            addr: addr.to_string(),
            source,
        }
    }

    /// True for failures to reach the aggregator at all.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::ConnectTimeout { .. })
    }
}

/// Address helper used in log fields when the peer is known.
pub(crate) fn peer_label(addr: Option<SocketAddr>) -> String {
    addr.map(|a| a.to_string())
        .unwrap_or_else(|| "<unknown>".to_string())
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
