//! Agency client: load phase, then query phase.
//!
//! ```text
//! +-----------+  one connection  +------------+
//! |  submit   | ---------------> | aggregator |
//! +-----------+                  +------------+
//!       |                              ^
//!       v      fresh connection        |
//! +-----------+  per attempt           |
//! |   poll    | -----------------------+
//! +-----------+
//! ```
//!
//! The two phases never overlap. The only thing shared with the outside is
//! the cancellation token, checked at well-defined points.

pub mod backoff;
pub mod connection;
pub mod poll;
pub mod submit;

pub use backoff::Backoff;
pub use connection::Connection;
pub use poll::{poll_until_final, AttemptOutcome, PollAttempt, PollConfig, PollReport};
pub use submit::{submit, SubmissionReport, SubmissionStop, SubmitConfig};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::protocol::QueryScope;
use crate::source::RecordSource;
use tokio_util::sync::CancellationToken;

/// Outcome of a full run.
#[derive(Debug)]
pub struct RunReport {
    pub submission: SubmissionReport,
    /// `None` when the run was cancelled before a final tally arrived
    pub poll: Option<PollReport>,
}

pub struct Client {
    config: ClientConfig,
    cancel: CancellationToken,
}

impl Client {
    pub fn new(config: ClientConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    pub fn submit_config(&self) -> SubmitConfig {
        SubmitConfig {
            agency: self.config.id.clone(),
            server_address: self.config.server_address.clone(),
            batch_size: self.config.batch_size,
            connect_timeout: self.config.connect_timeout,
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        let scope = if self.config.query_all {
            QueryScope::All
        } else {
            QueryScope::Agency(self.config.id.clone())
        };
        PollConfig {
            agency: self.config.id.clone(),
            server_address: self.config.server_address.clone(),
            scope,
            connect_timeout: self.config.connect_timeout,
            backoff_initial: self.config.backoff_initial,
            backoff_max: self.config.backoff_max,
        }
    }

    /// Submit everything the source yields, then poll for the final tally.
    pub async fn run<S: RecordSource>(&self, source: &mut S) -> Result<RunReport, ClientError> {
        let agency = self.config.id.as_str();
        let submission = submit(&self.submit_config(), source, &self.cancel).await?;

        tracing::info!(
            agency,
            "registered {}/{} bets ({:.2}%)",
            submission.records_accepted,
            submission.records_sent,
            submission.acceptance_pct()
        );

        if submission.stop.is_cancelled() || self.cancel.is_cancelled() {
            return Ok(RunReport {
                submission,
                poll: None,
            });
        }

        let poll = match poll_until_final(&self.poll_config(), &self.cancel).await {
            Ok(report) => {
                tracing::info!(agency, winners = report.final_count, "draw closed");
                Some(report)
            }
            Err(ClientError::Cancelled) => None,
            Err(e) => return Err(e),
        };

        Ok(RunReport { submission, poll })
    }
}
