//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. CLI flags / environment variables (highest priority)               │
//! │     --s3-bucket my-bucket   or   S3_BUCKET=my-bucket                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config sync.toml      or   DB_SCHEMA_SYNC_CONFIG=sync.toml       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     schema.sql, completed, 1m interval, psqldef                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! bucket = "schemas-prod"
//! endpoint = "http://minio:9000"   # optional, S3-compatible storage
//! path_prefix = "app/"
//! schema_file = "schema.sql"
//! completed_file = "completed"     # empty disables completion markers
//! request_timeout = "30s"
//!
//! [database]
//! host = "db.internal"
//! port = 5432
//! user = "migrator"
//! password = "..."
//! name = "app"
//! connect_timeout = "10s"
//!
//! [apply]
//! export_after_apply = true
//! skip_lock = false
//! differ_bin = "psqldef"
//! differ_timeout = "10m"
//!
//! [watch]
//! interval = "1m"
//! metrics_addr = "0.0.0.0:9090"
//!
//! [hooks]
//! on_apply_failed = "notify-slack.sh"
//! timeout = "5m"
//! ```

use std::path::Path;
use std::time::Duration;

use schema_sync_core::{normalize_prefix, HookContext, HookEvent};
use schema_sync_db::DbConfig;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Store Settings
// =============================================================================

/// Where the schema artifacts live.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Bucket name. Required.
    #[serde(default)]
    pub bucket: String,

    /// Custom endpoint for S3-compatible storage (MinIO, R2, ...).
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Region override. Falls back to the AWS provider chain.
    #[serde(default)]
    pub region: Option<String>,

    /// Key prefix holding the version directories. Required.
    #[serde(default)]
    pub path_prefix: String,

    /// Default: "schema.sql"
    #[serde(default = "default_schema_file")]
    pub schema_file: String,

    /// Marker file name. Empty disables completion markers.
    /// Default: "completed"
    #[serde(default = "default_completed_file")]
    pub completed_file: String,

    /// Per-operation timeout for store requests.
    /// Default: 30 seconds
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_schema_file() -> String {
    schema_sync_core::DEFAULT_SCHEMA_FILE.to_string()
}

fn default_completed_file() -> String {
    schema_sync_core::DEFAULT_COMPLETED_FILE.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            bucket: String::new(),
            endpoint: None,
            region: None,
            path_prefix: String::new(),
            schema_file: default_schema_file(),
            completed_file: default_completed_file(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl StoreSettings {
    /// Returns true if completion markers are in use.
    pub fn markers_enabled(&self) -> bool {
        !self.completed_file.is_empty()
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Target database. Needed by `watch` and `apply` only.
#[derive(Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub host: String,

    /// Default: 5432
    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub name: String,

    /// Default: 10 seconds
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

fn default_db_port() -> u16 {
    5432
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            host: String::new(),
            port: default_db_port(),
            user: String::new(),
            password: String::new(),
            name: String::new(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("name", &self.name)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl DatabaseSettings {
    /// Connection settings for the advisory lock session.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.host, &self.user, &self.name)
            .port(self.port)
            .password(&self.password)
            .connect_timeout(self.connect_timeout)
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.is_empty() {
            missing.push("host");
        }
        if self.user.is_empty() {
            missing.push("user");
        }
        if self.name.is_empty() {
            missing.push("name");
        }
        missing
    }
}

// =============================================================================
// Apply Settings
// =============================================================================

/// How a resolved schema is applied.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplySettings {
    /// Upload `exported.sql` after a successful apply.
    #[serde(default)]
    pub export_after_apply: bool,

    /// Skip the advisory lock. Removes all cross-instance exclusivity.
    #[serde(default)]
    pub skip_lock: bool,

    /// Run the differ in dry-run mode before applying.
    /// Default: true
    #[serde(default = "default_true")]
    pub plan_before_apply: bool,

    /// Differ executable.
    /// Default: "psqldef"
    #[serde(default = "default_differ_bin")]
    pub differ_bin: String,

    /// Upper bound on any single differ invocation.
    /// Default: 10 minutes
    #[serde(default = "default_differ_timeout", with = "humantime_serde")]
    pub differ_timeout: Duration,
}

fn default_true() -> bool {
    true
}

fn default_differ_bin() -> String {
    "psqldef".to_string()
}

fn default_differ_timeout() -> Duration {
    Duration::from_secs(600)
}

impl Default for ApplySettings {
    fn default() -> Self {
        ApplySettings {
            export_after_apply: false,
            skip_lock: false,
            plan_before_apply: true,
            differ_bin: default_differ_bin(),
            differ_timeout: default_differ_timeout(),
        }
    }
}

// =============================================================================
// Watch Settings
// =============================================================================

/// Daemon loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSettings {
    /// Sleep between cycles.
    /// Default: 1 minute
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Listen address for /metrics and /health. Disabled when unset.
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

fn default_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for WatchSettings {
    fn default() -> Self {
        WatchSettings {
            interval: default_interval(),
            metrics_addr: None,
        }
    }
}

// =============================================================================
// Hook Settings
// =============================================================================

/// Operator commands run at lifecycle points. Empty means disabled.
#[derive(Debug, Clone, Deserialize)]
pub struct HookSettings {
    #[serde(default)]
    pub on_start: String,

    /// Fires on every failing cycle once the failure threshold is reached.
    #[serde(default)]
    pub on_fetch_error: String,

    #[serde(default)]
    pub on_before_apply: String,

    #[serde(default)]
    pub on_apply_failed: String,

    #[serde(default)]
    pub on_apply_succeeded: String,

    /// Upper bound on a single hook run.
    /// Default: 5 minutes
    #[serde(default = "default_hook_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_hook_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for HookSettings {
    fn default() -> Self {
        HookSettings {
            on_start: String::new(),
            on_fetch_error: String::new(),
            on_before_apply: String::new(),
            on_apply_failed: String::new(),
            on_apply_succeeded: String::new(),
            timeout: default_hook_timeout(),
        }
    }
}

impl HookSettings {
    /// Returns the command configured for `event`, if any.
    pub fn command(&self, event: HookEvent) -> Option<&str> {
        let command = match event {
            HookEvent::Start => &self.on_start,
            HookEvent::FetchError => &self.on_fetch_error,
            HookEvent::BeforeApply => &self.on_before_apply,
            HookEvent::ApplyFailed => &self.on_apply_failed,
            HookEvent::ApplySucceeded => &self.on_apply_succeeded,
        };
        let command = command.trim();
        (!command.is_empty()).then_some(command)
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub apply: ApplySettings,

    #[serde(default)]
    pub watch: WatchSettings,

    #[serde(default)]
    pub hooks: HookSettings,
}

impl SyncConfig {
    /// Loads defaults, then the TOML file at `path` if one is given.
    ///
    /// CLI flags and environment variables are layered on top by the caller,
    /// which then calls [`SyncConfig::normalize`] and [`SyncConfig::validate`].
    pub fn load(path: Option<&Path>) -> SyncResult<Self> {
        let Some(path) = path else {
            debug!("No config file given, using defaults");
            return Ok(Self::default());
        };

        info!(path = %path.display(), "Loading config from file");
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::ConfigLoadFailed(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses a TOML document on top of the defaults.
    pub fn from_toml_str(contents: &str) -> SyncResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Ensures the path prefix ends with `/`.
    pub fn normalize(&mut self) {
        self.store.path_prefix = normalize_prefix(&self.store.path_prefix);
    }

    /// Validates the settings every command needs.
    pub fn validate(&self) -> SyncResult<()> {
        if self.store.bucket.trim().is_empty() {
            return Err(SyncError::InvalidConfig("S3 bucket must be set".into()));
        }

        if self.store.path_prefix.trim().is_empty() {
            return Err(SyncError::InvalidConfig("path prefix must be set".into()));
        }

        if self.store.schema_file.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "schema file name must not be empty".into(),
            ));
        }

        if self.store.schema_file.contains('/') || self.store.completed_file.contains('/') {
            return Err(SyncError::InvalidConfig(
                "schema and completed file names must not contain '/'".into(),
            ));
        }

        if self.watch.interval.is_zero() {
            return Err(SyncError::InvalidConfig(
                "interval must be greater than 0".into(),
            ));
        }

        if self.apply.differ_bin.trim().is_empty() {
            return Err(SyncError::InvalidConfig("differ binary must be set".into()));
        }

        Ok(())
    }

    /// Validates the database settings required by `watch` and `apply`.
    pub fn require_database(&self) -> SyncResult<()> {
        let missing = self.database.missing_fields();
        if !missing.is_empty() {
            return Err(SyncError::InvalidConfig(format!(
                "database settings missing: {}",
                missing.join(", ")
            )));
        }
        if self.database.port == 0 {
            return Err(SyncError::InvalidConfig("database port must not be 0".into()));
        }
        Ok(())
    }

    /// Hook context carrying only the static store settings.
    pub fn base_hook_context(&self, app_version: &str) -> HookContext {
        HookContext {
            bucket: self.store.bucket.clone(),
            path_prefix: self.store.path_prefix.clone(),
            schema_file: self.store.schema_file.clone(),
            completed_file: self.store.completed_file.clone(),
            app_version: app_version.to_string(),
            ..Default::default()
        }
    }
}
