//! Wire protocol between an agency client and the aggregator.
//!
//! Fixed format, big-endian, no versioning. Two phases:
//! 1. Load - one connection: Load request, then batches, each answered by a
//!    LoadAck, closed by an empty batch.
//! 2. Query - one connection per attempt: Query request, one QueryResult.
//!
//! # Layers
//!
//! ```text
//! message  - Request {Load, Query}, LoadAck, QueryResult
//! record   - Bet and batch encoding
//! framing  - length-prefixed strings, integers, full reads/writes
//! ```

pub mod framing;
pub mod message;
pub mod record;

pub use framing::{read_full, read_full_or_eof, write_full};
pub use message::{LoadAck, QueryResult, QueryScope, Request, RequestKind, ALL_AGENCIES};
pub use record::{
    decode_batch_header, encode_batch, read_batch, Agency, Bet, END_OF_BATCHES,
};
