//! Publishing CLI for depot.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use depot_core::config::{self, AppConfig, DEFAULT_CONFIG_PATH};
use depot_core::{AdmissionFilter, ModuleIdentity};
use depot_publish::{Archiver, PublishOutcome, Publisher};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "depotctl")]
#[command(about = "Publish Terraform modules to a depot registry")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, env = "DEPOT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive a module directory and upload it to storage
    Upload(UploadArgs),
    /// Print version information
    Version,
}

#[derive(Args)]
struct UploadArgs {
    /// Module source directory
    path: PathBuf,

    /// Module namespace
    #[arg(long)]
    namespace: String,

    /// Module name
    #[arg(long)]
    name: String,

    /// Module provider
    #[arg(long)]
    provider: String,

    /// Module version
    #[arg(long)]
    version: String,

    /// Only publish versions matching this regular expression
    #[arg(long)]
    version_constraints_regex: Option<String>,

    /// Only publish versions satisfying these semver constraints (e.g. ">= 1.0, < 2.0")
    #[arg(long)]
    version_constraints_semver: Option<String>,
}

fn version_string() -> String {
    let mut version = format!("depotctl {}", env!("CARGO_PKG_VERSION"));
    let details: Vec<String> = [
        option_env!("DEPOT_BUILD_COMMIT").map(|commit| format!("commit {commit}")),
        option_env!("DEPOT_BUILD_DATE").map(|date| format!("built {date}")),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !details.is_empty() {
        version.push_str(&format!(" ({})", details.join(", ")));
    }
    version
}

fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        tracing::debug!(config_path = %path.display(), "Loading configuration from file");
    }
    let config = config::load(path).context("failed to load configuration")?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;
    Ok(config)
}

async fn handle_upload_command(args: UploadArgs, config_path: &Path) -> Result<()> {
    if !args.path.exists() {
        anyhow::bail!("module path does not exist: {}", args.path.display());
    }

    let identity = ModuleIdentity::new(&args.namespace, &args.name, &args.provider, &args.version)
        .context("invalid module")?;
    let filter = AdmissionFilter::new(
        args.version_constraints_regex.as_deref(),
        args.version_constraints_semver.as_deref(),
    )
    .context("invalid version constraints")?;

    let config = load_config(config_path)?;
    let archiver =
        Archiver::new(&config.archive.allowed_files).context("invalid archive allow-list")?;
    let store = depot_storage::from_config(&config.storage, &config.archive.extension)
        .await
        .context("failed to initialize storage")?;
    tracing::debug!(backend = store.backend_name(), "Storage backend initialized");

    let publisher = Publisher::new(store, filter, archiver);
    match publisher
        .publish(&args.path, &identity)
        .await
        .with_context(|| format!("failed to publish {identity}"))?
    {
        PublishOutcome::Published(record) => match record.download_url {
            Some(url) => println!("{url}"),
            None => println!("{}", record.identity),
        },
        // Already logged by the publisher; a filtered version is not a failure.
        PublishOutcome::Skipped(_) => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        config,
        debug,
        command,
    } = Cli::parse();

    let default_filter = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match command {
        Commands::Upload(args) => handle_upload_command(args, &config).await,
        Commands::Version => {
            println!("{}", version_string());
            Ok(())
        }
    }
}
