//! # schema-sync-db: Database Layer for db-schema-sync
//!
//! Holds the PostgreSQL session that serializes schema application across
//! every engine instance pointed at the same database.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      db-schema-sync Apply Path                          │
//! │                                                                         │
//! │  SyncOrchestrator (schema-sync-engine)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  schema-sync-db (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐                  ┌──────────────────────┐  │   │
//! │  │   │   DbConfig    │ ───────────────► │    AdvisoryLocker    │  │   │
//! │  │   │ host/port/... │                  │  one PgConnection    │  │   │
//! │  │   └───────────────┘                  │  try_lock / unlock   │  │   │
//! │  │                                      └──────────────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Target PostgreSQL Database                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`lock`] - Connection settings and the advisory lock session
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use schema_sync_db::{AdvisoryLocker, DbConfig};
//!
//! let config = DbConfig::new("localhost", "postgres", "app");
//! let mut locker = AdvisoryLocker::connect(&config).await?;
//!
//! if locker.try_lock().await? {
//!     // ... apply ...
//!     locker.unlock().await?;
//! }
//! locker.close().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod lock;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use lock::{AdvisoryLocker, DbConfig, ADVISORY_LOCK_ID};
