//! # Error Types
//!
//! Error types for harvest-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  harvest-core errors (this file)                                       │
//! │  └── ValidationError  - Malformed request input (4xx-equivalent)       │
//! │                                                                         │
//! │  harvest-db errors (separate crate)                                    │
//! │  └── DbError          - Driver, pool, not-found, timeout               │
//! │                                                                         │
//! │  Flow: ValidationError → DbError::Validation → caller's HTTP layer     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Planning never fails on odd search input: the planners fall back to a
//! safer strategy instead. Only input that cannot be turned into a safe
//! statement (unknown table, unknown column, bad id) is rejected here.

use thiserror::Error;

/// Input validation errors.
///
/// These errors occur when caller input cannot be mapped onto a statement.
/// They are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Table name is not one of the managed tables.
    #[error("Unknown table: '{0}'")]
    UnknownTable(String),

    /// Column is not part of the table's descriptor.
    #[error("Unknown column '{column}' for table {table}")]
    UnknownColumn { table: String, column: String },

    /// Column exists but callers may not write it.
    #[error("Column '{column}' of table {table} is read-only")]
    ReadOnlyColumn { table: String, column: String },

    /// Record id is not a positive integer.
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// A mutation was issued with nothing to write.
    #[error("Empty payload for {operation}")]
    EmptyPayload { operation: String },

    /// The table does not support the requested operation.
    #[error("{operation} is not supported on table {table}")]
    Unsupported { table: String, operation: String },
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Unit Tests
// =============================================================================
