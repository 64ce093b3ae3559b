//! # Error Types
//!
//! Domain-specific error types for schema-sync-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  schema-sync-core errors (this file)                                   │
//! │  └── CoreError        - Version resolution failures                    │
//! │                                                                         │
//! │  schema-sync-db errors (separate crate)                                │
//! │  └── DbError          - Advisory lock connection/query failures        │
//! │                                                                         │
//! │  schema-sync-engine errors (separate crate)                            │
//! │  ├── StoreError       - Object store status (NotFound is typed)        │
//! │  └── SyncError        - What the cycle caller sees                     │
//! │                                                                         │
//! │  Flow: CoreError → SyncError::Resolution → logged by the caller        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Core Error
// =============================================================================

/// Resolution errors raised while ranking artifact versions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// No key under the prefix carries the schema file name.
    ///
    /// ## When This Occurs
    /// - Empty bucket or wrong prefix
    /// - Artifacts uploaded under a different file name
    /// - Completed-only query and no version has a marker yet
    #[error("no {file} artifacts found with prefix {prefix}")]
    NoCandidates { prefix: String, file: String },

    /// Candidates exist but none of their version tokens parse.
    #[error("no valid versions found among {candidates:?}")]
    NoValidVersions { candidates: Vec<String> },

    /// A single token failed to parse as a version.
    #[error("invalid version token: {0}")]
    InvalidVersion(String),
}

impl CoreError {
    /// Creates a NoCandidates error for a prefix and file name.
    pub fn no_candidates(prefix: impl Into<String>, file: impl Into<String>) -> Self {
        CoreError::NoCandidates {
            prefix: prefix.into(),
            file: file.into(),
        }
    }
}
