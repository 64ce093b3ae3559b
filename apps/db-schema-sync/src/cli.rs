//! Command-line arguments and their overlay onto [`SyncConfig`].
//!
//! Every flag can also be set through the environment variable named next
//! to it. Flags win over the TOML file, which wins over built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use schema_sync_engine::SyncConfig;

/// Applies versioned database schemas published to S3.
#[derive(Debug, Parser)]
#[command(name = "db-schema-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "DB_SCHEMA_SYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll for new schema versions and apply them until stopped.
    Watch(WatchArgs),

    /// Run a single sync cycle and exit.
    Apply(TargetArgs),

    /// Print the DDL that would turn the latest completed schema into a local file.
    Plan {
        /// Desired schema file.
        local_file: PathBuf,
    },

    /// Download the latest completed schema.
    FetchCompleted {
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// =============================================================================
// Argument Groups
// =============================================================================

/// Object store and differ settings shared by every command.
#[derive(Debug, Args)]
pub struct StoreArgs {
    #[arg(long, env = "S3_BUCKET", global = true)]
    pub s3_bucket: Option<String>,

    /// Custom endpoint for S3-compatible storage.
    #[arg(long, env = "S3_ENDPOINT", global = true)]
    pub s3_endpoint: Option<String>,

    #[arg(long, env = "S3_REGION", global = true)]
    pub s3_region: Option<String>,

    /// Per-request timeout, e.g. "30s".
    #[arg(long, env = "S3_TIMEOUT", value_parser = humantime::parse_duration, global = true)]
    pub s3_timeout: Option<Duration>,

    #[arg(long, env = "PATH_PREFIX", global = true)]
    pub path_prefix: Option<String>,

    #[arg(long, env = "SCHEMA_FILE", global = true)]
    pub schema_file: Option<String>,

    /// Completion marker name. Pass "" to disable markers.
    #[arg(long, env = "COMPLETED_FILE", global = true)]
    pub completed_file: Option<String>,

    #[arg(long, env = "DIFFER_BIN", global = true)]
    pub differ_bin: Option<String>,

    #[arg(long, env = "DIFFER_TIMEOUT", value_parser = humantime::parse_duration, global = true)]
    pub differ_timeout: Option<Duration>,
}

/// Database, apply and hook settings for commands that touch the database.
#[derive(Debug, Args)]
pub struct TargetArgs {
    #[arg(long, env = "DB_HOST")]
    pub db_host: Option<String>,

    #[arg(long, env = "DB_PORT")]
    pub db_port: Option<u16>,

    #[arg(long, env = "DB_USER")]
    pub db_user: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,

    /// Upload exported.sql next to the schema after a successful apply.
    #[arg(long, env = "EXPORT_AFTER_APPLY")]
    pub export_after_apply: bool,

    /// Apply without the advisory lock.
    #[arg(long, env = "SKIP_LOCK")]
    pub skip_lock: bool,

    #[arg(long, env = "ON_BEFORE_APPLY")]
    pub on_before_apply: Option<String>,

    #[arg(long, env = "ON_APPLY_FAILED")]
    pub on_apply_failed: Option<String>,

    #[arg(long, env = "ON_APPLY_SUCCEEDED")]
    pub on_apply_succeeded: Option<String>,

    #[arg(long, env = "HOOK_TIMEOUT", value_parser = humantime::parse_duration)]
    pub hook_timeout: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Time between cycles, e.g. "1m".
    #[arg(long, env = "INTERVAL", value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,

    /// Listen address for /metrics and /health, e.g. "0.0.0.0:9090".
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<String>,

    #[arg(long, env = "ON_START")]
    pub on_start: Option<String>,

    /// Fires once consecutive fetch failures reach the threshold.
    #[arg(long, env = "ON_S3_FETCH_ERROR")]
    pub on_s3_fetch_error: Option<String>,
}

// =============================================================================
// Overlay
// =============================================================================

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

impl StoreArgs {
    fn overlay(&self, config: &mut SyncConfig) {
        let store = &mut config.store;
        set(&mut store.bucket, &self.s3_bucket);
        if self.s3_endpoint.is_some() {
            store.endpoint = self.s3_endpoint.clone();
        }
        if self.s3_region.is_some() {
            store.region = self.s3_region.clone();
        }
        set(&mut store.request_timeout, &self.s3_timeout);
        set(&mut store.path_prefix, &self.path_prefix);
        set(&mut store.schema_file, &self.schema_file);
        set(&mut store.completed_file, &self.completed_file);

        set(&mut config.apply.differ_bin, &self.differ_bin);
        set(&mut config.apply.differ_timeout, &self.differ_timeout);
    }
}

impl TargetArgs {
    fn overlay(&self, config: &mut SyncConfig) {
        let db = &mut config.database;
        set(&mut db.host, &self.db_host);
        set(&mut db.port, &self.db_port);
        set(&mut db.user, &self.db_user);
        set(&mut db.password, &self.db_password);
        set(&mut db.name, &self.db_name);

        // Flags only switch these on; a file setting stays otherwise.
        config.apply.export_after_apply |= self.export_after_apply;
        config.apply.skip_lock |= self.skip_lock;

        let hooks = &mut config.hooks;
        set(&mut hooks.on_before_apply, &self.on_before_apply);
        set(&mut hooks.on_apply_failed, &self.on_apply_failed);
        set(&mut hooks.on_apply_succeeded, &self.on_apply_succeeded);
        set(&mut hooks.timeout, &self.hook_timeout);
    }
}

impl WatchArgs {
    fn overlay(&self, config: &mut SyncConfig) {
        self.target.overlay(config);
        set(&mut config.watch.interval, &self.interval);
        if self.metrics_addr.is_some() {
            config.watch.metrics_addr = self.metrics_addr.clone();
        }
        set(&mut config.hooks.on_start, &self.on_start);
        set(&mut config.hooks.on_fetch_error, &self.on_s3_fetch_error);
    }
}

impl Cli {
    /// Builds the validated configuration for the selected command.
    pub fn sync_config(&self) -> Result<SyncConfig> {
        let mut config =
            SyncConfig::load(self.config.as_deref()).context("failed to load configuration")?;
        self.store.overlay(&mut config);

        match &self.command {
            Command::Watch(args) => args.overlay(&mut config),
            Command::Apply(args) => {
                args.overlay(&mut config);
                // Single shot: no daemon start and no failure streak to report.
                config.hooks.on_start.clear();
                config.hooks.on_fetch_error.clear();
            }
            Command::Plan { .. } | Command::FetchCompleted { .. } => {}
        }

        config.normalize();
        config.validate()?;
        if self.needs_database() {
            config.require_database()?;
        }
        Ok(config)
    }

    fn needs_database(&self) -> bool {
        matches!(self.command, Command::Watch(_) | Command::Apply(_))
    }
}
