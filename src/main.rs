//! Model Manager - Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use model_manager::{
    CacheIndex, Downloader, HttpFetcher, ModelAcquirer, ModelKind, api, config::ManagerConfig,
    disk::SystemDiskSpace, metrics, model,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "model-manager")]
#[command(about = "Local ML model cache and acquisition service", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override API port
    #[arg(long)]
    port: Option<u16>,

    /// Override cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "json")]
    log_format: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Make one model available and print its path
    Ensure {
        /// Model kind (transcription or summarization)
        kind: ModelKind,
    },
    /// Acquire every catalog model
    Preload,
    /// List catalog models and cache status
    List,
    /// Remove every cached artifact
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    match cli.log_format.as_str() {
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
    }

    // Load configuration
    let mut config = ManagerConfig::load(cli.config)?;

    // CLI overrides
    if let Some(port) = cli.port {
        config.api_port = port;
    }
    if let Some(cache_dir) = cli.cache_dir {
        config.cache_dir = cache_dir;
    }

    config.validate()?;

    tracing::info!(
        api_port = config.api_port,
        cache_dir = ?config.cache_dir,
        max_cache_bytes = config.max_cache_bytes,
        max_age_days = config.max_age_days,
        download_timeout_secs = config.download_timeout_secs,
        "Configuration loaded"
    );

    let acquirer = build_acquirer(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, acquirer).await,
        Command::Ensure { kind } => {
            let handle = model::initialize(&acquirer, kind).await?;
            println!("{}", handle.path().display());
            Ok(())
        }
        Command::Preload => {
            let reports = acquirer.download_all().await;
            println!("{}", serde_json::to_string_pretty(&reports)?);

            let failed = reports.iter().filter(|r| !r.ready).count();
            if failed > 0 {
                anyhow::bail!("{} of {} models failed to preload", failed, reports.len());
            }
            Ok(())
        }
        Command::List => {
            for descriptor in acquirer.catalog().list() {
                let cached = acquirer
                    .cache()
                    .get(&descriptor.name)
                    .await
                    .filter(|entry| entry.version == descriptor.version);
                println!(
                    "{:<24} {:<14} {:<10} {}",
                    descriptor.name,
                    descriptor.kind,
                    descriptor.version,
                    match cached {
                        Some(entry) => entry.cached_path.display().to_string(),
                        None => "not cached".to_string(),
                    }
                );
            }
            Ok(())
        }
        Command::Clear => {
            let removed = acquirer.clear_cache().await?;
            println!("Removed {} cached artifacts", removed);
            Ok(())
        }
    }
}

/// Wire catalog, cache, downloader and disk oracle together
async fn build_acquirer(config: &ManagerConfig) -> Result<Arc<ModelAcquirer>> {
    let catalog = config.catalog()?;
    let cache = CacheIndex::open(config.cache_dir.clone(), config.eviction_policy())
        .await
        .context("Failed to open model cache")?;
    let downloader = Downloader::new(Arc::new(HttpFetcher::new()?), config.download_timeout());

    tracing::info!(
        models = catalog.len(),
        cached = cache.len().await,
        "Model catalog ready"
    );

    Ok(Arc::new(ModelAcquirer::new(
        catalog,
        Arc::new(cache),
        downloader,
        Arc::new(SystemDiskSpace),
    )))
}

async fn serve(config: ManagerConfig, acquirer: Arc<ModelAcquirer>) -> Result<()> {
    tracing::info!("Starting Model Manager");

    // Setup metrics
    let prometheus_handle = metrics::setup_metrics()?;
    metrics::update_cache_bytes(acquirer.cache().total_bytes().await);

    // Preload in the background so the API comes up immediately
    let preload_handle = config.preload_on_start.then(|| {
        let acquirer = acquirer.clone();
        tokio::spawn(async move {
            acquirer.download_all().await;
            metrics::update_cache_bytes(acquirer.cache().total_bytes().await);
        })
    });

    // Setup API
    let app_state = api::AppState {
        acquirer: acquirer.clone(),
        prometheus_handle,
    };

    let app = api::create_router(app_state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    tracing::info!("Shutting down...");

    // Dropping an in-flight download removes its staging file
    if let Some(handle) = preload_handle {
        handle.abort();
        let _ = handle.await;
    }

    // Persist the final LRU timestamps
    tracing::info!("Saving cache index");
    acquirer.cache().save().await?;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
