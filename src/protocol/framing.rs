//! Framing primitives shared by every message.
//!
//! Wire format: all multi-byte integers are big-endian.
//! Strings are length-prefixed (u32 len + UTF-8), with no terminator.
//! Integers are fixed width: counts are u32, identifiers are u64.
//!
//! `read_full` and `write_full` are the only functions in the crate that
//! touch a raw stream; everything else goes through them.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of a string length prefix
pub const LEN_PREFIX_SIZE: usize = 4;

/// Size of an encoded count
pub const U32_SIZE: usize = 4;

/// Size of an encoded identifier
pub const U64_SIZE: usize = 8;

const READ_CHUNK: usize = 64 * 1024;

/// Encoded size of a length-prefixed string.
pub fn string_len(s: &str) -> usize {
    LEN_PREFIX_SIZE + s.len()
}

pub fn put_string(buf: &mut BytesMut, s: &str) -> Result<(), ProtocolError> {
    let len = u32::try_from(s.len()).map_err(|_| ProtocolError::StringTooLong { len: s.len() })?;
    buf.put_u32(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

pub fn get_string(buf: &mut Bytes, field: &'static str) -> Result<String, ProtocolError> {
    let len = get_u32(buf, field)? as usize;
    ensure_remaining(buf, len, field)?;
    String::from_utf8(buf.copy_to_bytes(len).to_vec())
        .map_err(|_| ProtocolError::InvalidUtf8 { field })
}

pub fn get_u32(buf: &mut Bytes, what: &'static str) -> Result<u32, ProtocolError> {
    ensure_remaining(buf, U32_SIZE, what)?;
    Ok(buf.get_u32())
}

pub fn get_u64(buf: &mut Bytes, what: &'static str) -> Result<u64, ProtocolError> {
    ensure_remaining(buf, U64_SIZE, what)?;
    Ok(buf.get_u64())
}

fn ensure_remaining(buf: &Bytes, needed: usize, what: &'static str) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        return Err(ProtocolError::Truncated {
            what,
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Read exactly `len` bytes, looping over short reads.
///
/// A peer that closes before `len` bytes arrive is an error, never a
/// partial success.
pub async fn read_full<R: AsyncRead + Unpin>(r: &mut R, len: usize) -> Result<Bytes, ProtocolError> {
    read_full_or_eof(r, len)
        .await?
        .ok_or(ProtocolError::ConnectionClosed { expected: len })
}

/// Like [`read_full`], but a clean close before the first byte yields `None`.
///
/// The buffer grows by at most `READ_CHUNK` bytes per read, so a length the
/// peer declares is only backed by memory as its bytes arrive.
pub async fn read_full_or_eof<R: AsyncRead + Unpin>(
    r: &mut R,
    len: usize,
) -> Result<Option<Bytes>, ProtocolError> {
    let mut buf = Vec::with_capacity(len.min(READ_CHUNK));

    while buf.len() < len {
        let read = buf.len();
        buf.resize(read + (len - read).min(READ_CHUNK), 0);
        let n = r.read(&mut buf[read..]).await?;
        buf.truncate(read + n);

        if n == 0 {
            if read == 0 {
                return Ok(None);
            }
            return Err(ProtocolError::ShortRead {
                read,
                expected: len,
            });
        }
    }

    Ok(Some(Bytes::from(buf)))
}

pub async fn read_u32<R: AsyncRead + Unpin>(r: &mut R) -> Result<u32, ProtocolError> {
    Ok(read_full(r, U32_SIZE).await?.get_u32())
}

pub async fn read_u64<R: AsyncRead + Unpin>(r: &mut R) -> Result<u64, ProtocolError> {
    Ok(read_full(r, U64_SIZE).await?.get_u64())
}

pub async fn read_string<R: AsyncRead + Unpin>(
    r: &mut R,
    field: &'static str,
) -> Result<String, ProtocolError> {
    let len = read_u32(r).await? as usize;
    let raw = read_full(r, len).await?;
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8 { field })
}

/// Write the whole buffer and flush.
///
/// Every write is checked against the bytes requested; a writer that stops
/// accepting data is reported as `ShortWrite` with the count that made it out.
pub async fn write_full<W: AsyncWrite + Unpin>(w: &mut W, buf: &[u8]) -> Result<(), ProtocolError> {
    let mut written = 0;

    while written < buf.len() {
        let n = w.write(&buf[written..]).await?;
        if n == 0 {
            return Err(ProtocolError::ShortWrite {
                written,
                expected: buf.len(),
            });
        }
        written += n;
    }

    w.flush().await?;
    Ok(())
}
