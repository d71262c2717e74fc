//! Query phase: ask for the tally until the aggregator reports it final.
//!
//! Each attempt waits out the current backoff, opens a fresh connection,
//! sends one Query request and reads one QueryResult. Partial answers and
//! failed attempts both grow the backoff. The loop only ends on a final
//! answer or cancellation; cancellation also aborts an attempt in flight.

use crate::client::backoff::Backoff;
use crate::client::connection::Connection;
use crate::error::ClientError;
use crate::protocol::{QueryResult, QueryScope, Request};
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const PHASE: &str = "query";

/// Attempts kept in [`PollReport::recent`].
pub const HISTORY_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub agency: String,
    pub server_address: String,
    pub scope: QueryScope,
    pub connect_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

#[derive(Debug)]
pub enum AttemptOutcome {
    Partial(u64),
    Final(u64),
    Failed(ClientError),
}

#[derive(Debug)]
pub struct PollAttempt {
    /// Backoff slept before this attempt
    pub waited: Duration,
    pub outcome: AttemptOutcome,
}

/// Summary of a polling run.
///
/// Polling has no attempt limit, so only counters and the last
/// `HISTORY_LEN` attempts are kept.
#[derive(Debug, Default)]
pub struct PollReport {
    pub final_count: u64,
    pub attempts: usize,
    pub partials: usize,
    pub failures: usize,
    /// Most recent attempts, oldest first
    pub recent: VecDeque<PollAttempt>,
}

impl PollReport {
    fn record(&mut self, attempt: PollAttempt) {
        self.attempts += 1;
        match attempt.outcome {
            AttemptOutcome::Partial(_) => self.partials += 1,
            AttemptOutcome::Failed(_) => self.failures += 1,
            AttemptOutcome::Final(count) => self.final_count = count,
        }
        if self.recent.len() == HISTORY_LEN {
            self.recent.pop_front();
        }
        self.recent.push_back(attempt);
    }
}

/// Poll until a final tally arrives. Returns `ClientError::Cancelled` if the
/// token fires first, including while sleeping.
pub async fn poll_until_final(
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<PollReport, ClientError> {
    let agency = config.agency.as_str();
    let request = Request::query(config.scope.clone());
    let mut backoff = Backoff::new(config.backoff_initial, config.backoff_max);
    let mut report = PollReport::default();

    loop {
        if cancel.is_cancelled() {
            info!(agency, phase = PHASE, "interrupt received, stopping poll");
            return Err(ClientError::Cancelled);
        }

        let waited = backoff.current();
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(agency, phase = PHASE, "interrupt received during backoff, stopping poll");
                return Err(ClientError::Cancelled);
            }
            _ = tokio::time::sleep(waited) => {}
        }

        let attempt = report.attempts + 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                info!(agency, phase = PHASE, attempt, "interrupt received during query, stopping poll");
                return Err(ClientError::Cancelled);
            }
            result = query_once(config, &request) => result,
        };

        match result {
            Ok(QueryResult::Final { count }) => {
                info!(agency, phase = PHASE, attempt, count, "final result received");
                report.record(PollAttempt {
                    waited,
                    outcome: AttemptOutcome::Final(count),
                });
                return Ok(report);
            }
            Ok(QueryResult::Partial { count }) => {
                let next = backoff.advance();
                info!(
                    agency,
                    phase = PHASE,
                    attempt,
                    count,
                    backoff_ms = next.as_millis() as u64,
                    "partial result, draw still open"
                );
                report.record(PollAttempt {
                    waited,
                    outcome: AttemptOutcome::Partial(count),
                });
            }
            Err(e) => {
                let next = backoff.advance();
                warn!(
                    agency,
                    phase = PHASE,
                    attempt,
                    backoff_ms = next.as_millis() as u64,
                    error = %e,
                    "poll attempt failed"
                );
                report.record(PollAttempt {
                    waited,
                    outcome: AttemptOutcome::Failed(e),
                });
            }
        }
    }
}

async fn query_once(config: &PollConfig, request: &Request) -> Result<QueryResult, ClientError> {
    let mut conn = Connection::open(&config.server_address, config.connect_timeout).await?;
    let result = exchange(&mut conn, request).await;
    conn.close().await;
    result
}

async fn exchange(conn: &mut Connection, request: &Request) -> Result<QueryResult, ClientError> {
    conn.send_request(request).await?;
    Ok(conn.recv_query_result().await?)
}
