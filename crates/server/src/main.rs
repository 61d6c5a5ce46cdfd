//! Depot registry server binary.

use anyhow::{Context, Result};
use clap::Parser;
use depot_core::config::{self, DEFAULT_CONFIG_PATH};
use depot_server::{AppState, create_router, serve, shutdown_on_signal};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Depot - A Terraform module registry
#[derive(Parser, Debug)]
#[command(name = "depotd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "DEPOT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "debug,tower_http=debug"
    } else {
        "info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Depot v{}", env!("CARGO_PKG_VERSION"));

    if args.config.exists() {
        tracing::info!(config_path = %args.config.display(), "Loading configuration from file");
    } else {
        tracing::debug!("No config file found at {}", args.config.display());
    }
    let config = config::load(&args.config).context("failed to load configuration")?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    let store = depot_storage::from_config(&config.storage, &config.archive.extension)
        .await
        .context("failed to initialize storage")?;
    tracing::info!(backend = store.backend_name(), "Storage backend initialized");

    // Fail before accepting requests when storage is unreachable.
    store
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!("Storage backend connectivity verified");

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let grace = config.server.shutdown_grace();

    let state = AppState::new(config, store);
    if state.gate.is_open() {
        tracing::warn!("No auth providers configured, the registry is open to everyone");
    }
    if state.config.login.is_some() {
        tracing::info!("Advertising login.v1 in service discovery");
    }

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!("Listening on {}", addr);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    serve(listener, app, shutdown, grace)
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}
