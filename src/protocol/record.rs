//! Bet encoding and batch framing.
//!
//! A bet is six fields written back to back with no delimiters:
//! agency, first name, last name (strings), document (u64),
//! birthdate (string), number (u64). A batch is a u32 count followed by
//! that many bets. The zero-count batch doubles as the end-of-submission
//! marker.

use crate::error::{ProtocolError, RecordError};
use crate::protocol::framing::{
    self, get_string, get_u32, get_u64, put_string, string_len, U32_SIZE, U64_SIZE,
};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::AsyncRead;

/// Encoded empty batch: the end-of-submission marker.
pub const END_OF_BATCHES: [u8; 4] = [0; 4];

/// A single lottery bet.
///
/// Fields are fixed at construction; the encoder only borrows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    agency: String,
    first_name: String,
    last_name: String,
    document: u64,
    birthdate: String,
    number: u64,
}

impl Bet {
    pub fn new(
        agency: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        document: u32,
        birthdate: impl Into<String>,
        number: u32,
    ) -> Self {
        Self {
            agency: agency.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            document: document.into(),
            birthdate: birthdate.into(),
            number: number.into(),
        }
    }

    pub fn agency(&self) -> &str {
        &self.agency
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn document(&self) -> u64 {
        self.document
    }

    pub fn birthdate(&self) -> &str {
        &self.birthdate
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// Exact number of bytes `encode_into` appends.
    pub fn encoded_len(&self) -> usize {
        string_len(&self.agency)
            + string_len(&self.first_name)
            + string_len(&self.last_name)
            + U64_SIZE
            + string_len(&self.birthdate)
            + U64_SIZE
    }

    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        put_string(buf, &self.agency)?;
        put_string(buf, &self.first_name)?;
        put_string(buf, &self.last_name)?;
        buf.put_u64(self.document);
        put_string(buf, &self.birthdate)?;
        buf.put_u64(self.number);
        Ok(())
    }

    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode one bet from the front of `payload`.
    pub fn decode(payload: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            agency: get_string(payload, "agency")?,
            first_name: get_string(payload, "first_name")?,
            last_name: get_string(payload, "last_name")?,
            document: get_u64(payload, "document")?,
            birthdate: get_string(payload, "birthdate")?,
            number: get_u64(payload, "number")?,
        })
    }

    /// Read one bet field by field from a stream (aggregator side).
    pub async fn read<R: AsyncRead + Unpin>(r: &mut R) -> Result<Self, ProtocolError> {
        Ok(Self {
            agency: framing::read_string(r, "agency").await?,
            first_name: framing::read_string(r, "first_name").await?,
            last_name: framing::read_string(r, "last_name").await?,
            document: framing::read_u64(r).await?,
            birthdate: framing::read_string(r, "birthdate").await?,
            number: framing::read_u64(r).await?,
        })
    }
}

/// The submitting agency; turns raw text fields into bets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agency {
    pub id: String,
}

impl Agency {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Build a bet from unparsed fields.
    ///
    /// `document` and `number` must be base-10 and fit in 32 bits. The
    /// birthdate is passed through as-is.
    pub fn bet(
        &self,
        first_name: &str,
        last_name: &str,
        document: &str,
        birthdate: &str,
        number: &str,
    ) -> Result<Bet, RecordError> {
        let document = parse_u32("document", document)?;
        let number = parse_u32("number", number)?;
        Ok(Bet::new(
            self.id.clone(),
            first_name,
            last_name,
            document,
            birthdate,
            number,
        ))
    }
}

fn parse_u32(field: &'static str, value: &str) -> Result<u32, RecordError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|source| RecordError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

/// Encode a batch: u32 count, then each bet in order.
pub fn encode_batch(bets: &[Bet]) -> Result<Bytes, ProtocolError> {
    let count =
        u32::try_from(bets.len()).map_err(|_| ProtocolError::BatchTooLarge { len: bets.len() })?;
    let body: usize = bets.iter().map(Bet::encoded_len).sum();

    let mut buf = BytesMut::with_capacity(U32_SIZE + body);
    buf.put_u32(count);
    for bet in bets {
        bet.encode_into(&mut buf)?;
    }
    Ok(buf.freeze())
}

/// Read only the record count of an encoded batch.
pub fn decode_batch_header(encoded: &[u8]) -> Result<u32, ProtocolError> {
    let mut header = Bytes::copy_from_slice(encoded.get(..U32_SIZE).unwrap_or(encoded));
    get_u32(&mut header, "batch header")
}

/// Read one batch off a stream (aggregator side). An empty vector is the
/// end-of-submission marker.
pub async fn read_batch<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<Bet>, ProtocolError> {
    let count = framing::read_u32(r).await? as usize;
    let mut bets = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        bets.push(Bet::read(r).await?);
    }
    Ok(bets)
}
