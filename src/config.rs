//! Command line, environment and TOML configuration.
//!
//! Every option can come from a flag, a `CLI_*` environment variable or the
//! optional TOML file. Flags and environment win over the file, the file
//! wins over built-in defaults.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug, Default)]
#[command(
    name = "agency-client",
    version,
    about = "Submit an agency's bets to the aggregator and wait for the draw result"
)]
pub struct Cli {
    /// Agency identifier sent with every request
    #[arg(long, env = "CLI_ID")]
    pub id: Option<String>,

    /// Aggregator address (host:port)
    #[arg(long, env = "CLI_SERVER_ADDRESS")]
    pub server_address: Option<String>,

    /// Maximum bets per batch
    #[arg(long, env = "CLI_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// CSV file with the agency's bets
    #[arg(long, env = "CLI_DATA_PATH")]
    pub data_path: Option<PathBuf>,

    #[arg(long, env = "CLI_CONNECT_TIMEOUT_SECS")]
    pub connect_timeout_secs: Option<u64>,

    /// First delay between result polls
    #[arg(long, env = "CLI_BACKOFF_INITIAL_MS")]
    pub backoff_initial_ms: Option<u64>,

    /// Ceiling for the delay between result polls
    #[arg(long, env = "CLI_BACKOFF_MAX_MS")]
    pub backoff_max_ms: Option<u64>,

    /// Ask for the tally of all agencies instead of this one
    #[arg(long, env = "CLI_QUERY_ALL")]
    pub query_all: Option<bool>,

    /// Fallback log filter when RUST_LOG is unset
    #[arg(long, env = "CLI_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Optional TOML config file
    #[arg(long, env = "CLI_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Shape of the TOML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub id: Option<String>,
    pub server_address: Option<String>,
    pub batch_size: Option<usize>,
    pub data_path: Option<PathBuf>,
    pub connect_timeout_secs: Option<u64>,
    pub backoff_initial_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
    pub query_all: Option<bool>,
    pub log_level: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Validated settings for one client run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub id: String,
    pub server_address: String,
    pub batch_size: usize,
    pub data_path: PathBuf,
    pub connect_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub query_all: bool,
    pub log_level: String,
}

impl ClientConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 100;
    pub const DEFAULT_DATA_PATH: &'static str = "/data/agency.csv";
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
    pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 1_000;
    pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;
    pub const DEFAULT_LOG_LEVEL: &'static str = "info";

    /// Read the optional file named by `cli.config`, then merge.
    pub fn load(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self> {
        let id = cli.id.or(file.id).unwrap_or_default();
        if id.trim().is_empty() {
            bail!("Missing agency id (--id or CLI_ID)");
        }

        let server_address = cli.server_address.or(file.server_address).unwrap_or_default();
        if server_address.trim().is_empty() {
            bail!("Missing aggregator address (--server-address or CLI_SERVER_ADDRESS)");
        }

        let batch_size = cli
            .batch_size
            .or(file.batch_size)
            .unwrap_or(Self::DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            bail!("Batch size must be at least 1");
        }

        let connect_timeout_secs = cli
            .connect_timeout_secs
            .or(file.connect_timeout_secs)
            .unwrap_or(Self::DEFAULT_CONNECT_TIMEOUT_SECS);
        if connect_timeout_secs == 0 {
            bail!("Connect timeout must be at least 1 second");
        }

        let backoff_initial_ms = cli
            .backoff_initial_ms
            .or(file.backoff_initial_ms)
            .unwrap_or(Self::DEFAULT_BACKOFF_INITIAL_MS);
        let backoff_max_ms = cli
            .backoff_max_ms
            .or(file.backoff_max_ms)
            .unwrap_or(Self::DEFAULT_BACKOFF_MAX_MS);
        if backoff_initial_ms == 0 {
            bail!("Initial backoff must be greater than zero");
        }
        if backoff_initial_ms > backoff_max_ms {
            bail!(
                "Initial backoff ({}ms) exceeds backoff ceiling ({}ms)",
                backoff_initial_ms,
                backoff_max_ms
            );
        }

        Ok(Self {
            id,
            server_address,
            batch_size,
            data_path: cli
                .data_path
                .or(file.data_path)
                .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DATA_PATH)),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            backoff_initial: Duration::from_millis(backoff_initial_ms),
            backoff_max: Duration::from_millis(backoff_max_ms),
            query_all: cli.query_all.or(file.query_all).unwrap_or(false),
            log_level: cli
                .log_level
                .or(file.log_level)
                .unwrap_or_else(|| Self::DEFAULT_LOG_LEVEL.to_string()),
        })
    }
}
