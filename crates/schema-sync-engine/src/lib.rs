//! # schema-sync-engine: Sync Engine for db-schema-sync
//!
//! This crate turns versioned schema artifacts in an object store into
//! applied database schema, one cycle at a time.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Engine Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 SyncOrchestrator (Main Orchestrator)             │  │
//! │  │                                                                  │  │
//! │  │  run_cycle(): resolve → compare → marker → download → lock →    │  │
//! │  │               plan → apply → export → mark → release            │  │
//! │  │  watch():     run_cycle every interval until shutdown           │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌──────────────┬──────┴───────┬──────────────┐                 │
//! │         ▼              ▼              ▼              ▼                  │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐          │
//! │  │ObjectStore │ │ ApplyLock  │ │   Differ   │ │   Hooks    │          │
//! │  │            │ │            │ │            │ │            │          │
//! │  │ S3 / MinIO │ │ pg advisory│ │  psqldef   │ │  sh -c     │          │
//! │  │ in-memory  │ │ in-memory  │ │ subprocess │ │ env vars   │          │
//! │  └────────────┘ └────────────┘ └────────────┘ └────────────┘          │
//! │                                                                         │
//! │  SIDE CHANNELS:                                                        │
//! │  • metrics: Prometheus counters/gauges, /metrics and /health           │
//! │  • commands: read-only plan and fetch-completed                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Cycle
//! - [`orchestrator`] - Main `SyncOrchestrator` and the watch loop
//! - [`resolver`] - Listing + latest version resolution
//! - [`completion`] - Completion marker check and write
//! - [`lock`] - Non-blocking apply lock
//! - [`differ`] - psqldef subprocess runner
//! - [`hooks`] - Lifecycle hook dispatch
//!
//! ### Infrastructure
//! - [`config`] - TOML configuration and validation
//! - [`store`] - Object store trait and in-memory store
//! - [`s3`] - S3 implementation of the store
//! - [`metrics`] - Prometheus recorder and HTTP routes
//! - [`commands`] - One-shot read-only commands
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use schema_sync_engine::{SyncConfig, SyncOrchestrator};
//!
//! let mut config = SyncConfig::load(Some(path))?;
//! config.normalize();
//! config.validate()?;
//!
//! let mut orchestrator = SyncOrchestrator::connect(&config, env!("CARGO_PKG_VERSION")).await;
//! orchestrator.watch(config.watch.interval, shutdown_signal()).await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Cycle
pub mod completion;
pub mod differ;
pub mod hooks;
pub mod lock;
pub mod orchestrator;
pub mod resolver;

// Infrastructure
pub mod commands;
pub mod config;
pub mod error;
pub mod metrics;
pub mod s3;
pub mod store;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use commands::{fetch_completed_schema, plan_against_local, CompletedSchema};
pub use completion::CompletionTracker;
pub use config::{
    ApplySettings, DatabaseSettings, HookSettings, StoreSettings, SyncConfig, WatchSettings,
};
pub use differ::{ApplyOutput, Differ, PsqldefDiffer};
pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use hooks::{HookDispatcher, HookRunner, ShellHookRunner};
pub use lock::{ApplyLock, HeldLock, LockOutcome, MemoryApplyLock, PostgresApplyLock};
pub use orchestrator::{CycleOutcome, SkipReason, SyncOrchestrator};
pub use resolver::ArtifactResolver;
pub use s3::S3ObjectStore;
pub use store::{MemoryObjectStore, ObjectStore, StoreOp};
