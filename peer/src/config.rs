use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use url::Url;

use crate::endpoint::PeerId;

// Recommended defaults (section 6). All are overridable via env var or CLI flag.
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 500;
const DEFAULT_DETECTION_TIMEOUT_MIN_MS: u64 = 2_000;
const DEFAULT_DETECTION_TIMEOUT_MAX_MS: u64 = 4_000;
const DEFAULT_ELECTION_REQUEST_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_MAX_EPOCH_SEARCH: u64 = 100;
const DEFAULT_DOWNLOAD_CHUNK_SIZE: usize = 1024 * 1024;
const DEFAULT_PING_TIMEOUT_MS: u64 = 1_500;
const DEFAULT_VOTE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_HEARTBEAT_RPC_TIMEOUT_MS: u64 = 500;
const DEFAULT_REGISTER_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_DOWNLOAD_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_FILE_WATCH_INTERVAL_SECS: u64 = 10;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid registry url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid listen address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    #[error("invalid value for {name}: {value}")]
    InvalidEnvValue { name: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Command-line flags. These sit above environment variables, which sit
/// above the compiled-in defaults (4.12): the lowest-priority layer never
/// overrides a layer above it.
#[derive(Parser, Debug)]
#[command(name = "peer", about = "Tracker-election file-sharing peer")]
pub struct Args {
    /// Stable identifier for this peer, unique in the cohort.
    #[arg(long)]
    pub peer_id: String,

    /// Address this peer's RPC server listens on.
    #[arg(long, default_value = "127.0.0.1:0")]
    pub listen_address: String,

    /// Directory whose files this peer shares and indexes.
    #[arg(long, default_value = "shared")]
    pub shared_dir: PathBuf,

    /// Base URL of the external name registry service.
    #[arg(long)]
    pub registry_url: String,

    /// Total number of peers in the cohort (determines quorum).
    #[arg(long)]
    pub total_peers: usize,

    /// Whether this peer is the designated bootstrap (self-appoints epoch 1
    /// when no tracker can be discovered).
    #[arg(long, default_value_t = false)]
    pub bootstrap: bool,
}

/// Fully resolved, immutable configuration. Cloned into the actor and every
/// long-lived task at startup; nothing reads the environment afterward.
#[derive(Debug, Clone)]
pub struct Config {
    pub peer_id: PeerId,
    pub listen_address: SocketAddr,
    pub shared_dir: PathBuf,
    pub registry_url: Url,
    pub bootstrap: bool,
    pub total_peers: usize,

    pub heartbeat_interval: Duration,
    pub detection_timeout_min: Duration,
    pub detection_timeout_max: Duration,
    pub election_request_timeout: Duration,
    pub max_epoch_search: u64,
    pub download_chunk_size: usize,
    pub file_watch_interval: Duration,

    pub ping_timeout: Duration,
    pub vote_timeout: Duration,
    pub heartbeat_rpc_timeout: Duration,
    pub register_timeout: Duration,
    pub download_timeout: Duration,
}

impl Config {
    pub fn quorum(&self) -> usize {
        self.total_peers / 2 + 1
    }

    pub fn from_args(args: Args) -> Result<Self> {
        Ok(Config {
            peer_id: args.peer_id,
            listen_address: args.listen_address.parse()?,
            shared_dir: args.shared_dir,
            registry_url: Url::parse(&args.registry_url)?,
            bootstrap: args.bootstrap,
            total_peers: args.total_peers,

            heartbeat_interval: env_duration_ms(
                "TRACKERNET_HEARTBEAT_INTERVAL_MS",
                DEFAULT_HEARTBEAT_INTERVAL_MS,
            )?,
            detection_timeout_min: env_duration_ms(
                "TRACKERNET_DETECTION_TIMEOUT_MIN_MS",
                DEFAULT_DETECTION_TIMEOUT_MIN_MS,
            )?,
            detection_timeout_max: env_duration_ms(
                "TRACKERNET_DETECTION_TIMEOUT_MAX_MS",
                DEFAULT_DETECTION_TIMEOUT_MAX_MS,
            )?,
            election_request_timeout: env_duration_ms(
                "TRACKERNET_ELECTION_REQUEST_TIMEOUT_MS",
                DEFAULT_ELECTION_REQUEST_TIMEOUT_MS,
            )?,
            max_epoch_search: env_u64("TRACKERNET_MAX_EPOCH_SEARCH", DEFAULT_MAX_EPOCH_SEARCH)?,
            download_chunk_size: env_u64(
                "TRACKERNET_DOWNLOAD_CHUNK_SIZE",
                DEFAULT_DOWNLOAD_CHUNK_SIZE as u64,
            )? as usize,
            file_watch_interval: Duration::from_secs(env_u64(
                "TRACKERNET_FILE_WATCH_INTERVAL_SECS",
                DEFAULT_FILE_WATCH_INTERVAL_SECS,
            )?),

            ping_timeout: Duration::from_millis(DEFAULT_PING_TIMEOUT_MS),
            vote_timeout: Duration::from_millis(DEFAULT_VOTE_TIMEOUT_MS),
            heartbeat_rpc_timeout: Duration::from_millis(DEFAULT_HEARTBEAT_RPC_TIMEOUT_MS),
            register_timeout: Duration::from_millis(DEFAULT_REGISTER_TIMEOUT_MS),
            download_timeout: Duration::from_millis(DEFAULT_DOWNLOAD_TIMEOUT_MS),
        })
    }
}

fn env_u64(name: &'static str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidEnvValue { name, value }),
        Err(_) => Ok(default),
    }
}

fn env_duration_ms(name: &'static str, default: u64) -> Result<Duration> {
    env_u64(name, default).map(Duration::from_millis)
}
