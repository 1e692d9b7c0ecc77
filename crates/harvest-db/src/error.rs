//! # Database Error Types
//!
//! Error types for engine operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  MySQL Error (sqlx::Error)          ValidationError (harvest-core)     │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  HTTP layer: is_client_error() → 4xx, NotFound → 404, else 5xx         │
//! │                                                                         │
//! │  Never surfaced:                                                        │
//! │  • cache faults          → treated as a miss                           │
//! │  • estimator faults      → next strategy                               │
//! │  • cursor probe misses   → plain OFFSET                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use harvest_core::ValidationError;
use thiserror::Error;

use crate::config::ConfigError;

/// Engine operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Target row does not exist or is soft-deleted.
    ///
    /// ## When This Occurs
    /// - `get_by_id` matches no live row
    /// - `update`/`delete` affects zero rows
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Malformed input (bad id, empty payload, unknown column).
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The pool could not be created or a connection could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Statement rejected or failed on the server.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Statement did not complete within the configured timeout.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Engine configuration rejected at construction.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Internal engine error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given table and id.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Whether the caller sent something wrong (4xx) rather than the
    /// engine failing (5xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, DbError::Validation(_) | DbError::NotFound { .. })
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::Database       → DbError::QueryFailed
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// sqlx::Error::PoolClosed     → DbError::ConnectionFailed
/// sqlx::Error::Io / Tls       → DbError::ConnectionFailed
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => DbError::QueryFailed(db_err.message().to_string()),

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Configuration(_) => {
                DbError::ConnectionFailed(err.to_string())
            }

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
