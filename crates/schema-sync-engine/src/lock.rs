//! # Exclusive Apply Coordinator
//!
//! Non-blocking, database-scoped mutual exclusion around one apply.
//!
//! ## Lock Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  try_acquire()                                                          │
//! │     │                                                                   │
//! │     ├── AlreadyHeld ──► cycle ends as a no-op skip                      │
//! │     │                                                                   │
//! │     └── Acquired(held) ──► plan ─► apply ─► ... ─► held.release()       │
//! │                                                                         │
//! │  Lock infrastructure failures are errors, never "AlreadyHeld".         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The PostgreSQL implementation opens a fresh session per attempt. If the
//! process dies mid-apply the server closes the session and the lock goes
//! with it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use schema_sync_db::{AdvisoryLocker, DbConfig};
use tracing::debug;

use crate::error::SyncResult;

/// Result of a lock attempt.
pub enum LockOutcome {
    Acquired(Box<dyn HeldLock>),
    AlreadyHeld,
}

impl std::fmt::Debug for LockOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockOutcome::Acquired(_) => f.write_str("Acquired"),
            LockOutcome::AlreadyHeld => f.write_str("AlreadyHeld"),
        }
    }
}

/// Acquires the apply lock without blocking.
#[async_trait]
pub trait ApplyLock: Send + Sync {
    async fn try_acquire(&self) -> SyncResult<LockOutcome>;
}

/// A held lock. Dropping it without `release` still frees it eventually.
#[async_trait]
pub trait HeldLock: Send {
    async fn release(self: Box<Self>) -> SyncResult<()>;
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// Advisory lock on the target database.
#[derive(Debug, Clone)]
pub struct PostgresApplyLock {
    config: DbConfig,
}

impl PostgresApplyLock {
    pub fn new(config: DbConfig) -> Self {
        PostgresApplyLock { config }
    }
}

#[async_trait]
impl ApplyLock for PostgresApplyLock {
    async fn try_acquire(&self) -> SyncResult<LockOutcome> {
        let mut locker = AdvisoryLocker::connect(&self.config).await?;

        if locker.try_lock().await? {
            return Ok(LockOutcome::Acquired(Box::new(PostgresHeldLock { locker })));
        }

        // Not ours: drop the session right away.
        if let Err(e) = locker.close().await {
            debug!(error = %e, "Closing idle lock session failed");
        }
        Ok(LockOutcome::AlreadyHeld)
    }
}

struct PostgresHeldLock {
    locker: AdvisoryLocker,
}

#[async_trait]
impl HeldLock for PostgresHeldLock {
    async fn release(self: Box<Self>) -> SyncResult<()> {
        let mut locker = self.locker;
        let unlocked = locker.unlock().await;
        // The session goes away either way, which also drops the lock.
        let closed = locker.close().await;
        unlocked?;
        closed?;
        Ok(())
    }
}

// =============================================================================
// In-Memory
// =============================================================================

/// Process-local lock keyed by name. Useful for tests and single-host runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryApplyLock {
    name: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl MemoryApplyLock {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryApplyLock {
            name: name.into(),
            held: Arc::default(),
        }
    }

    /// Another handle on the same lock table with a different name.
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        MemoryApplyLock {
            name: name.into(),
            held: Arc::clone(&self.held),
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&self.name)
    }
}

#[async_trait]
impl ApplyLock for MemoryApplyLock {
    async fn try_acquire(&self) -> SyncResult<LockOutcome> {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        if !held.insert(self.name.clone()) {
            return Ok(LockOutcome::AlreadyHeld);
        }
        Ok(LockOutcome::Acquired(Box::new(MemoryHeldLock {
            name: self.name.clone(),
            held: Arc::clone(&self.held),
        })))
    }
}

struct MemoryHeldLock {
    name: String,
    held: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl HeldLock for MemoryHeldLock {
    async fn release(self: Box<Self>) -> SyncResult<()> {
        self.held
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_lock_excludes_second_holder() {
        let first = MemoryApplyLock::new("app");
        let second = first.sibling("app");

        let held = match first.try_acquire().await.unwrap() {
            LockOutcome::Acquired(h) => h,
            LockOutcome::AlreadyHeld => panic!("first attempt should acquire"),
        };
        assert!(matches!(
            second.try_acquire().await.unwrap(),
            LockOutcome::AlreadyHeld
        ));

        held.release().await.unwrap();
        assert!(!first.is_held());
        assert!(matches!(
            second.try_acquire().await.unwrap(),
            LockOutcome::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_memory_lock_names_are_independent() {
        let a = MemoryApplyLock::new("a");
        let b = a.sibling("b");
        assert!(matches!(a.try_acquire().await.unwrap(), LockOutcome::Acquired(_)));
        assert!(matches!(b.try_acquire().await.unwrap(), LockOutcome::Acquired(_)));
    }

    #[tokio::test]
    async fn test_postgres_lock_unreachable_is_lock_failure() {
        let config = DbConfig::new("127.0.0.1", "nobody", "nothing")
            .port(1)
            .connect_timeout(std::time::Duration::from_secs(2));
        let err = PostgresApplyLock::new(config).try_acquire().await.unwrap_err();
        assert!(matches!(err, crate::error::SyncError::LockFailed(_)));
        assert!(err.is_hard());
    }
}
