//! # Engine Error Types
//!
//! Error types for object storage and synchronization cycles.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │  Fetch (HARD)   │  │   Apply (HARD)          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Resolution     │  │  LockFailed             │ │
//! │  │  ConfigLoad...  │  │  FetchFailed    │  │  ApplyFailed            │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                Best-effort (SOFT, logged only)                  │   │
//! │  │  MarkerFailed • ExportFailed • HookFailed • PlanFailed          │   │
//! │  │  DifferFailed                                                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  StoreError keeps NotFound as its own variant so callers never        │
//! │  inspect message text to detect a missing object.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use schema_sync_core::CoreError;
use schema_sync_db::DbError;
use thiserror::Error;

use crate::differ::ApplyOutput;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type alias for object store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Store Error
// =============================================================================

/// Object store failure, classified by status rather than message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The key does not exist.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// The request failed for any other reason.
    #[error("{operation} {key} failed: {message}")]
    Request {
        operation: &'static str,
        key: String,
        message: String,
    },

    /// The request did not finish within the configured timeout.
    #[error("{operation} {key} timed out")]
    Timeout { operation: &'static str, key: String },
}

impl StoreError {
    pub fn not_found(key: impl Into<String>) -> Self {
        StoreError::NotFound { key: key.into() }
    }

    pub fn request(operation: &'static str, key: impl Into<String>, message: impl ToString) -> Self {
        StoreError::Request {
            operation,
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Sync error type covering every way a cycle or command can fail.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read or parse a config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Fetch Errors (count towards the failure threshold)
    // =========================================================================
    /// No usable version could be resolved from the listing.
    #[error("failed to resolve latest schema: {0}")]
    Resolution(#[from] CoreError),

    /// Listing or downloading from the object store failed.
    #[error("failed to fetch {key}: {source}")]
    FetchFailed {
        key: String,
        #[source]
        source: StoreError,
    },

    // =========================================================================
    // Apply Errors
    // =========================================================================
    /// Lock infrastructure failure. "Already held" is not an error.
    #[error("advisory lock failed: {0}")]
    LockFailed(String),

    /// The differ exited non-zero while applying.
    #[error("failed to apply schema: {message}")]
    ApplyFailed { message: String, output: ApplyOutput },

    // =========================================================================
    // Best-effort Errors
    // =========================================================================
    /// Completion marker check or write failed.
    #[error("completion marker error: {0}")]
    MarkerFailed(String),

    /// Post-apply export or upload failed.
    #[error("schema export failed: {0}")]
    ExportFailed(String),

    /// A hook command failed or timed out.
    #[error("hook failed: {0}")]
    HookFailed(String),

    /// The dry run exited non-zero. `output` is its combined stdout and
    /// stderr.
    #[error("dry run failed: {message}")]
    PlanFailed { message: String, output: String },

    /// The differ failed outside a plan or apply exit (spawn, timeout,
    /// offline plan).
    #[error("differ failed: {0}")]
    DifferFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        SyncError::LockFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    pub fn fetch(key: impl Into<String>, source: StoreError) -> Self {
        SyncError::FetchFailed {
            key: key.into(),
            source,
        }
    }

    /// Returns true if this error aborts a cycle.
    ///
    /// ## Hard Errors
    /// - Resolution and fetch failures
    /// - Lock infrastructure failures
    /// - Apply failures
    ///
    /// Everything else is logged as a warning and the cycle carries on.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            SyncError::Resolution(_)
                | SyncError::FetchFailed { .. }
                | SyncError::LockFailed(_)
                | SyncError::ApplyFailed { .. }
        )
    }

    /// Returns true if this error counts towards the failure threshold.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, SyncError::Resolution(_) | SyncError::FetchFailed { .. })
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_) | SyncError::ConfigLoadFailed(_)
        )
    }

    /// Captured differ output, if this is an apply failure.
    pub fn apply_output(&self) -> Option<&ApplyOutput> {
        match self {
            SyncError::ApplyFailed { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Combined dry-run output, if this is a plan failure.
    pub fn plan_output(&self) -> Option<&str> {
        match self {
            SyncError::PlanFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_errors() {
        assert!(SyncError::Resolution(CoreError::no_candidates("s/", "schema.sql")).is_hard());
        assert!(SyncError::fetch("s/v1/schema.sql", StoreError::not_found("s/v1/schema.sql")).is_hard());
        assert!(SyncError::LockFailed("refused".into()).is_hard());
        assert!(SyncError::ApplyFailed {
            message: "exit status 1".into(),
            output: ApplyOutput::default(),
        }
        .is_hard());

        assert!(!SyncError::MarkerFailed("denied".into()).is_hard());
        assert!(!SyncError::ExportFailed("denied".into()).is_hard());
        assert!(!SyncError::HookFailed("exit 2".into()).is_hard());
        assert!(!SyncError::DifferFailed("plan".into()).is_hard());
        assert!(!SyncError::PlanFailed {
            message: "exit status 1".into(),
            output: String::new(),
        }
        .is_hard());
    }

    #[test]
    fn test_plan_output_only_on_plan_failure() {
        let err = SyncError::PlanFailed {
            message: "psqldef exited with exit status: 1".into(),
            output: "-- dry run --\nERROR: syntax error\n".into(),
        };
        assert_eq!(err.plan_output(), Some("-- dry run --\nERROR: syntax error\n"));
        assert_eq!(SyncError::DifferFailed("spawn".into()).plan_output(), None);
    }

    #[test]
    fn test_fetch_failures() {
        let listing = SyncError::fetch("s/", StoreError::request("list", "s/", "503"));
        assert!(listing.is_fetch_failure());
        assert!(!SyncError::LockFailed("x".into()).is_fetch_failure());
        assert!(SyncError::InvalidConfig("bucket".into()).is_config_error());
    }

    #[test]
    fn test_store_error_classification() {
        assert!(StoreError::not_found("k").is_not_found());
        assert!(!StoreError::request("head", "k", "NotFound").is_not_found());
        assert!(!StoreError::Timeout {
            operation: "get",
            key: "k".into()
        }
        .is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::fetch("s/v2/schema.sql", StoreError::request("get", "s/v2/schema.sql", "boom"));
        assert!(err.to_string().contains("s/v2/schema.sql"));
        assert!(err.to_string().contains("boom"));

        let err = SyncError::from(DbError::ConnectionFailed("refused".into()));
        assert!(matches!(err, SyncError::LockFailed(_)));
    }
}
