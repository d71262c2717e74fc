//! Lottery agency client.
//!
//! Reads an agency's bets from CSV, streams them in batches to the central
//! aggregator over TCP, then polls until the draw result is final.

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod shutdown;
pub mod source;

pub use client::{Client, RunReport};
pub use config::{Cli, ClientConfig};
pub use error::{ClientError, ProtocolError, RecordError};
pub use protocol::{Agency, Bet};
pub use source::{CsvSource, RecordSource};
