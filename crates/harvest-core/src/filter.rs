//! # Filter Builder
//!
//! Composes the full WHERE clause for a list query.
//!
//! ## Emission Order
//! ```text
//! soft delete → search predicate → type → date → range
//! ```
//! Fragments are joined with AND and parameters are pushed in exactly the
//! same order, because binding is positional.

use chrono::NaiveDate;

use crate::search::SearchPredicate;
use crate::table::{quote_ident, TableDescriptor};
use crate::types::{NormalizedQuery, SqlValue};

/// A WHERE clause under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    fragments: Vec<String>,
    params: Vec<SqlValue>,
    /// True once a caller-driven predicate was added (soft delete does not count).
    has_conditions: bool,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a predicate that only hides soft-deleted rows.
    pub fn push_guard(&mut self, fragment: impl Into<String>) {
        self.fragments.push(fragment.into());
    }

    /// Adds a caller-driven predicate and its parameters.
    pub fn push(&mut self, fragment: impl Into<String>, params: impl IntoIterator<Item = SqlValue>) {
        self.fragments.push(fragment.into());
        self.params.extend(params);
        self.has_conditions = true;
    }

    /// Whether any filter beyond the soft-delete guard is present.
    pub fn has_conditions(&self) -> bool {
        self.has_conditions
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Fragments joined with AND, without the `WHERE` keyword.
    pub fn predicate(&self) -> Option<String> {
        if self.fragments.is_empty() {
            None
        } else {
            Some(self.fragments.join(" AND "))
        }
    }

    /// ` WHERE ...` (leading space) or an empty string.
    pub fn to_sql(&self) -> String {
        self.predicate()
            .map(|p| format!(" WHERE {}", p))
            .unwrap_or_default()
    }

    /// Renders this clause with one extra predicate appended.
    pub fn to_sql_with(&self, extra: &str) -> String {
        match self.predicate() {
            Some(p) => format!(" WHERE {} AND {}", p, extra),
            None => format!(" WHERE {}", extra),
        }
    }
}

/// Builds the WHERE clause for a list query.
pub fn build_where(
    table: &TableDescriptor,
    query: &NormalizedQuery,
    search: &SearchPredicate,
) -> WhereClause {
    let mut clause = WhereClause::new();

    if let Some(guard) = table.live_rows_predicate() {
        clause.push_guard(guard);
    }

    if let Some(fragment) = &search.clause {
        clause.push(fragment.clone(), search.params.iter().cloned());
    }

    if let (Some(value), Some(col)) = (&query.item_type, table.type_column) {
        clause.push(format!("{} = ?", quote_ident(col)), [SqlValue::Text(value.clone())]);
    }

    let date_col = quote_ident(table.date_column);

    if let Some(date) = &query.date {
        match parse_day(date) {
            Some(day) => {
                // half-open day range keeps the date index usable
                let next = day.succ_opt().unwrap_or(day);
                clause.push(
                    format!("{0} >= ? AND {0} < ?", date_col),
                    [
                        SqlValue::Text(day.format("%Y-%m-%d").to_string()),
                        SqlValue::Text(next.format("%Y-%m-%d").to_string()),
                    ],
                );
            }
            None => {
                clause.push(
                    format!("{} LIKE ?", date_col),
                    [SqlValue::Text(format!("%{}%", crate::search::escape_like(date)))],
                );
            }
        }
    }

    match (&query.start_time, &query.end_time) {
        (Some(start), Some(end)) => clause.push(
            format!("{} BETWEEN ? AND ?", date_col),
            [SqlValue::Text(start.clone()), SqlValue::Text(end.clone())],
        ),
        (Some(start), None) => {
            clause.push(format!("{} >= ?", date_col), [SqlValue::Text(start.clone())])
        }
        (None, Some(end)) => {
            clause.push(format!("{} <= ?", date_col), [SqlValue::Text(end.clone())])
        }
        (None, None) => {}
    }

    clause
}

/// Strict `YYYY-MM-DD`.
fn parse_day(s: &str) -> Option<NaiveDate> {
    if s.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

// =============================================================================
// Unit Tests
// =============================================================================
