use agency_client::{shutdown, Agency, Cli, Client, ClientConfig, CsvSource};
use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match ClientConfig::load(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .init();

    if let Err(e) = run(config).await {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(config: ClientConfig) -> Result<()> {
    tracing::debug!(?config, "configuration loaded");

    let cancel = CancellationToken::new();
    let signals = shutdown::install(cancel.clone());

    let agency = Agency::new(config.id.clone());
    let mut source = CsvSource::open(&config.data_path, agency)
        .with_context(|| format!("open bets file {}", config.data_path.display()))?;

    let client = Client::new(config, cancel.clone());
    let report = client.run(&mut source).await;
    tracing::debug!(bets = source.total_read(), "input consumed");

    // Let the signal task exit.
    cancel.cancel();
    signals.await.ok();

    let report = match report {
        Ok(report) => report,
        Err(e) if e.is_connect() => return Err(anyhow::Error::new(e).context("aggregator unreachable")),
        Err(e) => return Err(anyhow::Error::new(e).context("run aborted")),
    };
    if report.poll.is_none() {
        tracing::info!("stopped before the draw result was final");
    }
    Ok(())
}
