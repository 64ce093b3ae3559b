//! # schema-sync-core: Pure Logic for db-schema-sync
//!
//! Everything the sync engine decides without touching the network, the
//! database, or a subprocess lives here.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      db-schema-sync Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/db-schema-sync (CLI)                       │   │
//! │  │     watch ──► apply ──► plan <file> ──► fetch-completed         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            schema-sync-engine (orchestrator + I/O)             │   │
//! │  │        S3 store, psqldef, hooks, metrics, advisory lock        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            ★ schema-sync-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  version  │  │   keys    │  │ resolver  │  │  failure  │  │   │
//! │  │   │  Version  │  │ marker_key│  │  latest   │  │  Tracker  │  │   │
//! │  │   │  compare  │  │ exported  │  │ completed │  │   hooks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`version`] - Version token parsing and ordering
//! - [`keys`] - Artifact, marker and snapshot key layout
//! - [`resolver`] - Latest / latest-completed resolution over a key listing
//! - [`failure`] - Consecutive fetch failure counter
//! - [`hooks`] - Hook events and the context → environment mapping
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use schema_sync_core::resolver::resolve_latest;
//!
//! let keys = ["schemas/v9/schema.sql", "schemas/v10/schema.sql"];
//! let latest = resolve_latest(&keys, "schemas/", "schema.sql").unwrap();
//!
//! // Numeric, not lexicographic
//! assert_eq!(latest.version, "v10");
//! assert_eq!(latest.key, "schemas/v10/schema.sql");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod failure;
pub mod hooks;
pub mod keys;
pub mod resolver;
pub mod version;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use failure::{FailureTracker, DEFAULT_FAILURE_THRESHOLD};
pub use hooks::{HookContext, HookEvent, HOOK_ENV_PREFIX};
pub use keys::{artifact_key, exported_key, marker_key, normalize_prefix, EXPORTED_FILE_NAME};
pub use resolver::{resolve_latest, resolve_latest_completed, Resolution};
pub use version::{compare_versions, find_max_version, MaxVersion, Version};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default schema file name inside each version directory.
pub const DEFAULT_SCHEMA_FILE: &str = "schema.sql";

/// Default completion marker file name.
pub const DEFAULT_COMPLETED_FILE: &str = "completed";
