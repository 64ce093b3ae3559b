//! # db-schema-sync
//!
//! Keeps a PostgreSQL database in step with versioned schema files
//! published to S3.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         db-schema-sync                                  │
//! │                                                                         │
//! │  S3 <prefix>/<version>/schema.sql ───► psqldef ───► PostgreSQL          │
//! │            │                                            │               │
//! │            └──── <version>/completed ◄──── marker ──────┘               │
//! │                                                                         │
//! │  watch:           loop every --interval, /metrics + /health            │
//! │  apply:           one cycle                                            │
//! │  plan <file>:     offline DDL preview, no database                     │
//! │  fetch-completed: latest completed schema to a file or stdout          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Logs go to stderr so `fetch-completed` and `plan` can own stdout.

mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use schema_sync_engine::metrics;
use schema_sync_engine::{
    fetch_completed_schema, plan_against_local, CycleOutcome, ObjectStore, PsqldefDiffer,
    S3ObjectStore, SyncConfig, SyncOrchestrator,
};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, LogFormat};

/// Engine version reported to hooks.
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_LOG_FILTER: &str = "info,db_schema_sync=debug,sqlx=warn";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = cli.sync_config()?;
    match cli.command {
        Command::Watch(_) => watch(config).await,
        Command::Apply(_) => apply(config).await,
        Command::Plan { local_file } => plan(config, &local_file).await,
        Command::FetchCompleted { output } => fetch_completed(config, output.as_deref()).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn watch(config: SyncConfig) -> Result<()> {
    if let Some(addr) = &config.watch.metrics_addr {
        serve_metrics(addr).await?;
    }

    info!(
        version = APP_VERSION,
        bucket = %config.store.bucket,
        prefix = %config.store.path_prefix,
        interval = %humantime::format_duration(config.watch.interval),
        "Starting db-schema-sync"
    );

    let mut orchestrator = SyncOrchestrator::connect(&config, APP_VERSION).await;
    orchestrator
        .watch(config.watch.interval, shutdown_signal())
        .await;

    info!("Shutdown complete");
    Ok(())
}

async fn serve_metrics(addr: &str) -> Result<()> {
    metrics::init_metrics()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
    info!(%addr, "Serving /metrics and /health");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, metrics::router()).await {
            error!(error = %e, "Metrics server stopped");
        }
    });
    Ok(())
}

async fn apply(config: SyncConfig) -> Result<()> {
    let mut orchestrator = SyncOrchestrator::connect(&config, APP_VERSION).await;
    match orchestrator.run_cycle().await? {
        CycleOutcome::Applied { version } => info!(%version, "Schema applied"),
        CycleOutcome::Skipped { version, reason } => {
            info!(%version, ?reason, "Nothing to apply")
        }
    }
    Ok(())
}

async fn plan(config: SyncConfig, local_file: &Path) -> Result<()> {
    let desired = tokio::fs::read(local_file)
        .await
        .with_context(|| format!("failed to read {}", local_file.display()))?;

    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::connect(&config.store).await);
    let differ = PsqldefDiffer::new(&config.apply.differ_bin, config.apply.differ_timeout);

    let ddl = plan_against_local(store, &differ, &config.store, &desired).await?;
    write_stdout(ddl.as_bytes()).await
}

async fn fetch_completed(config: SyncConfig, output: Option<&Path>) -> Result<()> {
    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::connect(&config.store).await);
    let completed = fetch_completed_schema(store, &config.store).await?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &completed.body)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(version = %completed.version, path = %path.display(), "Completed schema written");
            Ok(())
        }
        None => write_stdout(&completed.body).await,
    }
}

async fn write_stdout(bytes: &[u8]) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(bytes).await?;
    stdout.flush().await?;
    Ok(())
}

// =============================================================================
// Signals
// =============================================================================

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, finishing current cycle");
}
