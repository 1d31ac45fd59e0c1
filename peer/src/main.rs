use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use peer::{actor, cli, config::{Args, Config}, registry::RegistryClient};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = match Config::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(config.listen_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, address = %config.listen_address, "failed to bind RPC listener");
            std::process::exit(1);
        }
    };
    config.listen_address = listener
        .local_addr()
        .unwrap_or(config.listen_address);

    if let Err(e) = tokio::fs::create_dir_all(&config.shared_dir).await {
        tracing::warn!(error = %e, dir = ?config.shared_dir, "could not create shared directory");
    }

    let registry = RegistryClient::new(config.registry_url.clone());
    let (handle, actor_join) = actor::spawn(config.clone(), registry);

    let server_handle = handle.clone();
    let shared_dir = config.shared_dir.clone();
    tokio::spawn(peer::rpc::server::run(listener, server_handle, shared_dir));

    let cli_handle = handle.clone();
    let cli_config = config.clone();
    let cli_join = tokio::spawn(cli::run(cli_handle, cli_config));

    tokio::select! {
        _ = actor_join => {}
        _ = cli_join => {}
    }
}
