mod common;

#[cfg(test)]
mod tests {
    use super::common::{bets, dead_address, MockAggregator, Reply, VecSource};
    use agency_client::client::{submit, SubmissionStop, SubmitConfig};
    use agency_client::{
        Agency, Client, ClientConfig, ClientError, CsvSource, RecordError, RecordSource,
    };
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;
    use tokio_util::sync::CancellationToken;

    fn run_config(addr: String, batch_size: usize) -> ClientConfig {
        ClientConfig {
            id: "1".to_string(),
            server_address: addr,
            batch_size,
            data_path: "unused.csv".into(),
            connect_timeout: Duration::from_secs(5),
            backoff_initial: Duration::from_millis(10),
            backoff_max: Duration::from_millis(100),
            query_all: false,
            log_level: "info".to_string(),
        }
    }

    fn submit_config(addr: &str, batch_size: usize) -> SubmitConfig {
        SubmitConfig {
            agency: "1".to_string(),
            server_address: addr.to_string(),
            batch_size,
            connect_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_batches_acked_with_mismatch() -> anyhow::Result<()> {
        let (addr, server) = MockAggregator::loading(vec![3, 1]).spawn().await;
        let mut source = VecSource::new(bets("1", 5));

        let report = submit(&submit_config(&addr, 3), &mut source, &CancellationToken::new()).await?;

        assert!(matches!(report.stop, SubmissionStop::Exhausted));
        assert_eq!(report.batches_sent, 2);
        assert_eq!(report.records_sent, 5);
        assert_eq!(report.records_accepted, 4);
        assert_eq!(report.mismatches, 1);
        assert!(report.end_marker_sent);

        let transcript = server.await?;
        let load = &transcript.loads[0];
        assert_eq!(load.agency, "1");
        assert_eq!(load.batches.len(), 2);
        assert_eq!(load.batches[0].len(), 3);
        assert_eq!(load.batches[1].len(), 2);
        assert_eq!(load.batches[0][0].first_name(), "Name0");
        assert_eq!(load.batches[1][1].number(), 1004);
        assert!(load.end_marker);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_source_sends_only_end_marker() -> anyhow::Result<()> {
        let (addr, server) = MockAggregator::loading(Vec::new()).spawn().await;
        let mut source = VecSource::new(Vec::new());

        let report = submit(&submit_config(&addr, 10), &mut source, &CancellationToken::new()).await?;

        assert_eq!(report.batches_sent, 0);
        assert!(matches!(report.stop, SubmissionStop::Exhausted));

        let transcript = server.await?;
        assert!(transcript.loads[0].batches.is_empty());
        assert!(transcript.loads[0].end_marker);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_before_first_batch() -> anyhow::Result<()> {
        let (addr, server) = MockAggregator::loading(Vec::new()).spawn().await;
        let mut source = VecSource::new(bets("1", 4));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = submit(&submit_config(&addr, 2), &mut source, &cancel).await?;

        assert!(report.stop.is_cancelled());
        assert_eq!(report.batches_sent, 0);
        assert!(report.end_marker_sent);

        let transcript = server.await?;
        assert!(transcript.loads[0].end_marker);
        Ok(())
    }

    /// Cancels the token the first time it is asked for a batch.
    struct CancelAfterFirst {
        inner: VecSource,
        cancel: CancellationToken,
    }

    impl RecordSource for CancelAfterFirst {
        fn next_batch(&mut self, max: usize) -> Result<Vec<agency_client::Bet>, RecordError> {
            self.cancel.cancel();
            self.inner.next_batch(max)
        }
    }

    #[tokio::test]
    async fn test_cancelled_mid_submission_finishes_batch() -> anyhow::Result<()> {
        let (addr, server) = MockAggregator::loading(Vec::new()).spawn().await;
        let cancel = CancellationToken::new();
        let mut source = CancelAfterFirst {
            inner: VecSource::new(bets("1", 6)),
            cancel: cancel.clone(),
        };

        let report = submit(&submit_config(&addr, 2), &mut source, &cancel).await?;

        assert!(report.stop.is_cancelled());
        assert_eq!(report.batches_sent, 1);
        assert_eq!(report.records_accepted, 2);
        assert!(report.end_marker_sent);

        let transcript = server.await?;
        assert_eq!(transcript.loads[0].batches.len(), 1);
        assert!(transcript.loads[0].end_marker);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_record_aborts_without_end_marker() -> anyhow::Result<()> {
        let (addr, server) = MockAggregator::loading(Vec::new()).spawn().await;
        let mut source = VecSource::new(bets("1", 6));
        source.fail_on_call = Some(2);

        match submit(&submit_config(&addr, 2), &mut source, &CancellationToken::new()).await {
            Err(ClientError::Source(RecordError::MissingField { .. })) => {}
            other => panic!("Expected source error, got {:?}", other),
        }

        let transcript = server.await?;
        assert_eq!(transcript.loads[0].batches.len(), 1);
        assert!(!transcript.loads[0].end_marker);
        Ok(())
    }

    #[tokio::test]
    async fn test_client_run_fails_on_corrupt_record() -> anyhow::Result<()> {
        let (addr, server) = MockAggregator::loading(Vec::new()).spawn().await;
        let mut source = VecSource::new(bets("1", 6));
        source.fail_on_call = Some(2);

        let result = Client::new(run_config(addr, 2), CancellationToken::new())
            .run(&mut source)
            .await;

        assert!(matches!(result, Err(ClientError::Source(_))));
        let transcript = server.await?;
        assert!(!transcript.loads[0].end_marker);
        assert!(transcript.queries.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_ack_stops_loop() -> anyhow::Result<()> {
        let (addr, server) = MockAggregator {
            load_sessions: 1,
            hangup_after_batches: Some(1),
            ..Default::default()
        }
        .spawn()
        .await;
        let mut source = VecSource::new(bets("1", 6));

        let report = submit(&submit_config(&addr, 2), &mut source, &CancellationToken::new()).await?;

        match report.stop {
            SubmissionStop::ReceiveFailed(_) => {}
            other => panic!("Expected ReceiveFailed, got {:?}", other),
        }
        assert_eq!(report.batches_sent, 1);
        assert_eq!(report.records_sent, 2);
        assert_eq!(report.records_accepted, 0);

        let transcript = server.await?;
        assert_eq!(transcript.loads[0].batches.len(), 1);
        assert!(!transcript.loads[0].end_marker);
        Ok(())
    }

    #[tokio::test]
    async fn test_connect_failure_is_error() {
        let addr = dead_address().await;
        let mut source = VecSource::new(bets("1", 1));

        match submit(&submit_config(&addr, 1), &mut source, &CancellationToken::new()).await {
            Err(e) => assert!(e.is_connect()),
            Ok(report) => panic!("Expected connect failure, got {:?}", report),
        }
    }

    #[tokio::test]
    async fn test_client_run_from_csv() -> anyhow::Result<()> {
        let mut csv = NamedTempFile::new()?;
        writeln!(csv, "Lorca,Santiago Lionel,30904465,1999-03-17,7574")?;
        writeln!(csv, "Benitez,Joaquin,25777859,1990-08-11,4321")?;
        writeln!(csv, "Gomez,Maria,33791469,2001-01-30,9988")?;

        let (addr, server) = MockAggregator {
            load_sessions: 1,
            replies: vec![Reply::Tally(2)],
            ..Default::default()
        }
        .spawn()
        .await;

        let config = ClientConfig {
            id: "4".to_string(),
            server_address: addr,
            batch_size: 2,
            data_path: csv.path().to_path_buf(),
            connect_timeout: Duration::from_secs(5),
            backoff_initial: Duration::from_millis(10),
            backoff_max: Duration::from_millis(100),
            query_all: false,
            log_level: "info".to_string(),
        };
        let mut source = CsvSource::open(&config.data_path, Agency::new("4"))?;

        let report = Client::new(config, CancellationToken::new())
            .run(&mut source)
            .await?;

        assert_eq!(report.submission.records_sent, 3);
        assert_eq!(report.submission.records_accepted, 3);
        assert_eq!(report.poll.as_ref().map(|p| p.final_count), Some(2));

        let transcript = server.await?;
        let load = &transcript.loads[0];
        assert_eq!(load.agency, "4");
        assert_eq!(load.batches[0][0].first_name(), "Santiago Lionel");
        assert_eq!(load.batches[0][0].last_name(), "Lorca");
        assert_eq!(load.batches[0][0].document(), 30904465);
        assert_eq!(load.batches[1][0].agency(), "4");
        assert_eq!(transcript.queries.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_client_run_skips_poll_when_cancelled() -> anyhow::Result<()> {
        let (addr, server) = MockAggregator::loading(Vec::new()).spawn().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut source = VecSource::new(bets("1", 3));

        let report = Client::new(run_config(addr, 1), cancel).run(&mut source).await?;

        assert!(report.submission.stop.is_cancelled());
        assert!(report.poll.is_none());
        assert!(server.await?.queries.is_empty());
        Ok(())
    }
}
