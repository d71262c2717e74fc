//! In-process aggregator used by the integration tests.
//!
//! Handles one connection at a time, in accept order, and records what the
//! client sent.

#![allow(dead_code)]

use agency_client::protocol::{read_batch, LoadAck, QueryResult, QueryScope, Request};
use agency_client::{Bet, RecordError, RecordSource};
use std::collections::VecDeque;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Answer to one query connection.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// Write this signed tally.
    Tally(i64),
    /// Close without answering.
    Hangup,
    /// Never answer; hold the connection until the client drops it.
    Stall,
}

#[derive(Debug, Default)]
pub struct LoadSession {
    pub agency: String,
    pub batches: Vec<Vec<Bet>>,
    pub end_marker: bool,
}

#[derive(Debug)]
pub struct QuerySession {
    pub scope: QueryScope,
    pub at: Instant,
}

#[derive(Debug, Default)]
pub struct Transcript {
    pub loads: Vec<LoadSession>,
    pub queries: Vec<QuerySession>,
}

#[derive(Debug, Default)]
pub struct MockAggregator {
    /// Load connections to serve before the query connections
    pub load_sessions: usize,
    /// Per-batch acknowledged counts; batches past the end are fully acked
    pub acks: Vec<u32>,
    pub replies: Vec<Reply>,
    /// Close the load connection, unacknowledged, after this many batches
    pub hangup_after_batches: Option<usize>,
}

impl MockAggregator {
    pub fn loading(acks: Vec<u32>) -> Self {
        Self {
            load_sessions: 1,
            acks,
            ..Default::default()
        }
    }

    pub fn answering(replies: Vec<Reply>) -> Self {
        Self {
            replies,
            ..Default::default()
        }
    }

    /// Bind on an ephemeral port and serve the scripted connections.
    pub async fn spawn(self) -> (String, JoinHandle<Transcript>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = tokio::spawn(async move {
            let mut transcript = Transcript::default();
            let mut acks: VecDeque<u32> = self.acks.into();
            let mut replies: VecDeque<Reply> = self.replies.into();
            let total = self.load_sessions + replies.len();
            let hangup_after = self.hangup_after_batches;

            for _ in 0..total {
                let (mut sock, _) = listener.accept().await.unwrap();
                let at = Instant::now();

                match Request::read(&mut sock).await.unwrap() {
                    Request::Load { agency } => {
                        let mut session = LoadSession {
                            agency,
                            ..Default::default()
                        };
                        loop {
                            let batch = match read_batch(&mut sock).await {
                                Ok(batch) => batch,
                                Err(_) => break,
                            };
                            if batch.is_empty() {
                                session.end_marker = true;
                                break;
                            }
                            let accepted = acks.pop_front().unwrap_or(batch.len() as u32);
                            session.batches.push(batch);
                            if hangup_after == Some(session.batches.len()) {
                                break;
                            }
                            sock.write_all(&LoadAck { accepted }.encode()).await.unwrap();
                        }
                        transcript.loads.push(session);
                    }
                    Request::Query { scope } => {
                        match replies.pop_front() {
                            Some(Reply::Tally(value)) => {
                                sock.write_all(&QueryResult::from_wire(value).encode())
                                    .await
                                    .unwrap();
                            }
                            Some(Reply::Stall) => {
                                let mut rest = Vec::new();
                                sock.read_to_end(&mut rest).await.ok();
                            }
                            Some(Reply::Hangup) | None => {}
                        }
                        transcript.queries.push(QuerySession { scope, at });
                    }
                }
            }
            transcript
        });

        (addr, handle)
    }
}

/// An address nothing is listening on.
pub async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

/// In-memory source handing out pre-built bets.
pub struct VecSource {
    bets: VecDeque<Bet>,
    /// Fail on this call to `next_batch` (1-based)
    pub fail_on_call: Option<usize>,
    calls: usize,
}

impl VecSource {
    pub fn new(bets: Vec<Bet>) -> Self {
        Self {
            bets: bets.into(),
            fail_on_call: None,
            calls: 0,
        }
    }
}

impl RecordSource for VecSource {
    fn next_batch(&mut self, max: usize) -> Result<Vec<Bet>, RecordError> {
        self.calls += 1;
        if self.fail_on_call == Some(self.calls) {
            return Err(RecordError::MissingField {
                line: self.calls,
                field: "number",
            });
        }
        let take = max.min(self.bets.len());
        Ok(self.bets.drain(..take).collect())
    }
}

pub fn bets(agency: &str, count: u32) -> Vec<Bet> {
    (0..count)
        .map(|i| {
            Bet::new(
                agency,
                format!("Name{i}"),
                "Surname",
                30_000_000 + i,
                "1990-05-17",
                1000 + i,
            )
        })
        .collect()
}
