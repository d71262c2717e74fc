//! Load phase: stream batches to the aggregator over a single connection.
//!
//! Per batch: pull from the source, send, read the LoadAck, compare counts.
//! When the loop stops on exhaustion, cancellation or a network failure, the
//! empty-batch marker is sent before closing. Corrupt input is the exception:
//! the connection is closed without the marker so the aggregator never takes
//! a partial load for a finished one.

use crate::client::connection::Connection;
use crate::error::{ClientError, ProtocolError, RecordError};
use crate::protocol::{encode_batch, LoadAck, Request, END_OF_BATCHES};
use crate::source::RecordSource;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const PHASE: &str = "load";

#[derive(Debug, Clone)]
pub struct SubmitConfig {
    pub agency: String,
    pub server_address: String,
    pub batch_size: usize,
    pub connect_timeout: Duration,
}

/// Why the batch loop stopped.
#[derive(Debug)]
pub enum SubmissionStop {
    /// The source ran dry.
    Exhausted,
    /// An interrupt was observed before pulling the next batch.
    Cancelled,
    SendFailed(ProtocolError),
    ReceiveFailed(ProtocolError),
}

impl SubmissionStop {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug)]
pub struct SubmissionReport {
    pub batches_sent: usize,
    pub records_sent: usize,
    pub records_accepted: usize,
    /// Batches whose LoadAck disagreed with the batch size
    pub mismatches: usize,
    pub end_marker_sent: bool,
    pub stop: SubmissionStop,
}

impl SubmissionReport {
    fn new() -> Self {
        Self {
            batches_sent: 0,
            records_sent: 0,
            records_accepted: 0,
            mismatches: 0,
            end_marker_sent: false,
            stop: SubmissionStop::Exhausted,
        }
    }

    /// Share of sent bets the aggregator registered, in percent.
    pub fn acceptance_pct(&self) -> f64 {
        if self.records_sent == 0 {
            return 0.0;
        }
        100.0 * self.records_accepted as f64 / self.records_sent as f64
    }
}

/// Run the load phase to completion, cancellation or failure.
///
/// Network failures after the Load request are recorded in the report.
/// `Err` means the aggregator was unreachable, the Load request could not be
/// sent, or the source produced a record that could not be built.
pub async fn submit<S: RecordSource>(
    config: &SubmitConfig,
    source: &mut S,
    cancel: &CancellationToken,
) -> Result<SubmissionReport, ClientError> {
    let agency = config.agency.as_str();

    let mut conn = Connection::open(&config.server_address, config.connect_timeout)
        .await
        .inspect_err(|e| {
            error!(agency, phase = PHASE, addr = %config.server_address, error = %e, "could not connect to aggregator")
        })?;

    if let Err(e) = conn.send_request(&Request::load(agency)).await {
        error!(agency, phase = PHASE, error = %e, "could not send load request");
        conn.close().await;
        return Err(e.into());
    }
    info!(agency, phase = PHASE, peer = conn.peer(), "load started");

    let mut report = SubmissionReport::new();
    let stop = match send_batches(&mut conn, config, source, cancel, &mut report).await {
        Ok(stop) => stop,
        Err(e) => {
            error!(
                agency,
                phase = PHASE,
                batches = report.batches_sent,
                error = %e,
                "rejected input record, closing without end marker"
            );
            conn.close().await;
            return Err(e.into());
        }
    };
    report.stop = stop;
    report.end_marker_sent = send_end_marker(&mut conn, config).await;
    conn.close().await;

    info!(
        agency,
        phase = PHASE,
        batches = report.batches_sent,
        sent = report.records_sent,
        accepted = report.records_accepted,
        stop = ?report.stop,
        "load finished"
    );
    Ok(report)
}

async fn send_batches<S: RecordSource>(
    conn: &mut Connection,
    config: &SubmitConfig,
    source: &mut S,
    cancel: &CancellationToken,
    report: &mut SubmissionReport,
) -> Result<SubmissionStop, RecordError> {
    let agency = config.agency.as_str();

    loop {
        if cancel.is_cancelled() {
            warn!(agency, phase = PHASE, "interrupt received, stopping load");
            return Ok(SubmissionStop::Cancelled);
        }

        let batch = source.next_batch(config.batch_size)?;
        if batch.is_empty() {
            return Ok(SubmissionStop::Exhausted);
        }
        let batch_no = report.batches_sent + 1;

        let encoded = match encode_batch(&batch) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(agency, phase = PHASE, batch = batch_no, error = %e, "could not encode batch");
                return Ok(SubmissionStop::SendFailed(e));
            }
        };

        if let Err(e) = conn.send(&encoded).await {
            error!(
                agency,
                phase = PHASE,
                batch = batch_no,
                bytes = encoded.len(),
                error = %e,
                "failed to send batch"
            );
            return Ok(SubmissionStop::SendFailed(e));
        }
        report.batches_sent += 1;
        report.records_sent += batch.len();

        let ack = match conn.recv_load_ack().await {
            Ok(Some(ack)) => ack,
            Ok(None) => {
                let e = ProtocolError::ConnectionClosed {
                    expected: LoadAck::SIZE,
                };
                error!(agency, phase = PHASE, batch = batch_no, error = %e, "no acknowledgment for batch");
                return Ok(SubmissionStop::ReceiveFailed(e));
            }
            Err(e) => {
                error!(agency, phase = PHASE, batch = batch_no, error = %e, "failed to read acknowledgment");
                return Ok(SubmissionStop::ReceiveFailed(e));
            }
        };

        report.records_accepted += ack.accepted as usize;
        if ack.accepted as usize != batch.len() {
            report.mismatches += 1;
            warn!(
                agency,
                phase = PHASE,
                batch = batch_no,
                expected = batch.len(),
                accepted = ack.accepted,
                "aggregator did not register the whole batch"
            );
        } else {
            debug!(agency, phase = PHASE, batch = batch_no, accepted = ack.accepted, "batch registered");
        }
    }
}

/// Send the empty batch and wait for the aggregator to hang up.
async fn send_end_marker(conn: &mut Connection, config: &SubmitConfig) -> bool {
    let agency = config.agency.as_str();

    if let Err(e) = conn.send(&END_OF_BATCHES).await {
        warn!(agency, phase = PHASE, error = %e, "failed to send end-of-batches marker");
        return false;
    }

    // The aggregator answers the marker by closing; a trailing ack is tolerated.
    match tokio::time::timeout(config.connect_timeout, conn.recv_load_ack()).await {
        Ok(Ok(None)) => debug!(agency, phase = PHASE, "aggregator closed after end marker"),
        Ok(Ok(Some(ack))) => {
            debug!(agency, phase = PHASE, accepted = ack.accepted, "aggregator acknowledged end marker")
        }
        Ok(Err(e)) => debug!(agency, phase = PHASE, error = %e, "no closing response"),
        Err(_) => debug!(agency, phase = PHASE, "aggregator did not close after end marker"),
    }
    true
}
