//! # Validation Module
//!
//! Input checks run before a mutation statement is built.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP handler (outside this workspace)                        │
//! │  └── Deserialization into QueryParams / JSON payloads                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── ids are positive integers                                         │
//! │  └── payload columns exist and are writable                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: MySQL                                                        │
//! │  └── NOT NULL / type constraints                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub use crate::error::ValidationResult;
use crate::error::ValidationError;
use crate::table::TableDescriptor;
use crate::types::Row;

/// Validates a record id. Auto-increment ids start at 1.
pub fn validate_id(id: u64) -> ValidationResult<u64> {
    if id == 0 {
        return Err(ValidationError::InvalidId(id.to_string()));
    }
    Ok(id)
}

/// Parses an id received as text (path segment, query string).
///
/// ## Example
/// ```rust
/// use harvest_core::validation::parse_id;
///
/// assert_eq!(parse_id(" 42 ").unwrap(), 42);
/// assert!(parse_id("abc").is_err());
/// assert!(parse_id("0").is_err());
/// ```
pub fn parse_id(raw: &str) -> ValidationResult<u64> {
    let id = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| ValidationError::InvalidId(raw.to_string()))?;
    validate_id(id)
}

/// Validates a create/update payload against the table's columns.
///
/// ## Rules
/// - At least one field
/// - Every field is a known column
/// - The primary key is never written
pub fn validate_write_fields(
    table: &TableDescriptor,
    fields: &Row,
    operation: &str,
) -> ValidationResult<()> {
    if fields.is_empty() {
        return Err(ValidationError::EmptyPayload {
            operation: operation.to_string(),
        });
    }

    for column in fields.keys() {
        table.check_column(column)?;
        if column == table.primary_key {
            return Err(ValidationError::ReadOnlyColumn {
                table: table.name().to_string(),
                column: column.clone(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id(1).is_ok());
        assert!(validate_id(0).is_err());
        assert!(parse_id("-1").is_err());
        assert!(parse_id("").is_err());
        assert_eq!(parse_id("9000000000").unwrap(), 9_000_000_000);
    }

    #[test]
    fn test_validate_write_fields() {
        let table = TableDescriptor::crawler();

        assert!(validate_write_fields(&table, &row(json!({"title": "x"})), "create").is_ok());

        assert!(matches!(
            validate_write_fields(&table, &Row::new(), "update"),
            Err(ValidationError::EmptyPayload { .. })
        ));
        assert!(matches!(
            validate_write_fields(&table, &row(json!({"id": 5})), "update"),
            Err(ValidationError::ReadOnlyColumn { .. })
        ));
        assert!(matches!(
            validate_write_fields(&table, &row(json!({"title": "x", "evil`": 1})), "create"),
            Err(ValidationError::UnknownColumn { .. })
        ));
    }
}
