//! Request and response messages.
//!
//! Every connection opens with exactly one request. A tag byte selects the
//! kind and the agency identifier follows as a length-prefixed string.
//!
//! ```text
//! Load request:   [tag=1:u8][len:u32][agency]
//! Query request:  [tag=0:u8][len:u32][agency | "*"]
//! Load response:  [accepted:u32]       one per batch
//! Query response: [count:i64]          negative = partial
//! ```

use crate::error::ProtocolError;
use crate::protocol::framing::{self, put_string, string_len, U32_SIZE, U64_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::AsyncRead;

/// Identifier a Query request carries to ask about every agency.
pub const ALL_AGENCIES: &str = "*";

// =============================================================================
// Request kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestKind {
    Query = 0x00,
    Load = 0x01,
}

impl RequestKind {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Query),
            0x01 => Some(Self::Load),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Load => "load",
        }
    }
}

/// Which tally a Query request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryScope {
    Agency(String),
    All,
}

impl QueryScope {
    fn as_wire(&self) -> &str {
        match self {
            Self::Agency(id) => id,
            Self::All => ALL_AGENCIES,
        }
    }

    fn from_wire(id: String) -> Self {
        if id == ALL_AGENCIES {
            Self::All
        } else {
            Self::Agency(id)
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Opens the load phase; batches follow on the same connection.
    Load { agency: String },
    /// Asks for the current tally; one Query response follows.
    Query { scope: QueryScope },
}

impl Request {
    pub fn load(agency: impl Into<String>) -> Self {
        Self::Load {
            agency: agency.into(),
        }
    }

    pub fn query(scope: QueryScope) -> Self {
        Self::Query { scope }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Load { .. } => RequestKind::Load,
            Self::Query { .. } => RequestKind::Query,
        }
    }

    fn identifier(&self) -> &str {
        match self {
            Self::Load { agency } => agency,
            Self::Query { scope } => scope.as_wire(),
        }
    }

    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let id = self.identifier();
        let mut buf = BytesMut::with_capacity(1 + string_len(id));
        buf.put_u8(self.kind() as u8);
        put_string(&mut buf, id)?;
        Ok(buf.freeze())
    }

    /// Read a request off a freshly accepted connection (aggregator side).
    pub async fn read<R: AsyncRead + Unpin>(r: &mut R) -> Result<Self, ProtocolError> {
        let tag = framing::read_full(r, 1).await?[0];
        let kind = RequestKind::from_u8(tag).ok_or(ProtocolError::UnknownRequestTag(tag))?;
        let id = framing::read_string(r, "agency").await?;
        Ok(Self::from_parts(kind, id))
    }

    fn from_parts(kind: RequestKind, id: String) -> Self {
        match kind {
            RequestKind::Load => Self::Load { agency: id },
            RequestKind::Query => Self::Query {
                scope: QueryScope::from_wire(id),
            },
        }
    }
}

// =============================================================================
// Load response
// =============================================================================

/// Number of bets from the preceding batch the aggregator registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadAck {
    pub accepted: u32,
}

impl LoadAck {
    pub const SIZE: usize = U32_SIZE;

    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&self.accepted.to_be_bytes())
    }

    /// Read one acknowledgment. `None` means the peer closed the connection
    /// without sending anything, which is how the closing handshake ends.
    pub async fn read<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<Self>, ProtocolError> {
        Ok(framing::read_full_or_eof(r, Self::SIZE)
            .await?
            .map(|mut raw| Self {
                accepted: raw.get_u32(),
            }))
    }
}

// =============================================================================
// Query response
// =============================================================================

/// Tally returned by a Query.
///
/// On the wire this is a single i64: negative while other agencies are still
/// loading (the magnitude is the running count), non-negative once final.
/// A partial tally of zero has no encoding; it reads back as a final zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryResult {
    Partial { count: u64 },
    Final { count: u64 },
}

impl QueryResult {
    pub const SIZE: usize = U64_SIZE;

    pub fn from_wire(value: i64) -> Self {
        if value < 0 {
            Self::Partial {
                count: value.unsigned_abs(),
            }
        } else {
            Self::Final {
                count: value as u64,
            }
        }
    }

    pub fn to_wire(&self) -> i64 {
        match *self {
            Self::Partial { count } => 0i64.saturating_sub_unsigned(count),
            Self::Final { count } => i64::try_from(count).unwrap_or(i64::MAX),
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }

    pub fn count(&self) -> u64 {
        match *self {
            Self::Partial { count } | Self::Final { count } => count,
        }
    }

    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&self.to_wire().to_be_bytes())
    }

    pub async fn read<R: AsyncRead + Unpin>(r: &mut R) -> Result<Self, ProtocolError> {
        let mut raw = framing::read_full(r, Self::SIZE).await?;
        Ok(Self::from_wire(raw.get_i64()))
    }
}
