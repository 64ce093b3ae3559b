//! # Database Error Types
//!
//! Error types for the advisory lock session.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  PostgreSQL Error (sqlx::Error)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError::LockFailed (engine) ← Aborts the cycle                     │
//! │                                                                         │
//! │  DbError::LockNotHeld on release is only logged as a warning           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Advisory lock session errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Could not open the lock session.
    ///
    /// ## When This Occurs
    /// - Host unreachable or wrong port
    /// - Authentication rejected
    /// - Connect timeout elapsed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A lock query failed on an open session.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// `pg_advisory_unlock` reported that this session did not hold the lock.
    #[error("advisory lock {lock_id} was not held")]
    LockNotHeld { lock_id: i64 },
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::Io / Tls / PoolTimedOut  → DbError::ConnectionFailed
/// sqlx::Error::Database                 → DbError::QueryFailed
/// Other                                 → DbError::QueryFailed
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
                DbError::ConnectionFailed(err.to_string())
            }
            sqlx::Error::Database(db_err) => DbError::QueryFailed(db_err.message().to_string()),
            _ => DbError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_error_mapping() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            DbError::from(sqlx::Error::Io(io)),
            DbError::ConnectionFailed(_)
        ));
        assert!(matches!(
            DbError::from(sqlx::Error::RowNotFound),
            DbError::QueryFailed(_)
        ));
    }

    #[test]
    fn test_lock_not_held_display() {
        let err = DbError::LockNotHeld { lock_id: 42 };
        assert_eq!(err.to_string(), "advisory lock 42 was not held");
    }
}
