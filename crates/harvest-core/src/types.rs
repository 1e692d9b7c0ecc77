//! # Request and Response Types
//!
//! Types exchanged between the engine and its callers.
//!
//! ## Request Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  QueryParams (raw, from the HTTP layer)                                │
//! │       │                                                                 │
//! │       ▼  normalize(&TableDescriptor)                                    │
//! │  NormalizedQuery (clamped page/pageSize, trimmed strings,              │
//! │                   allow-listed sort column)                             │
//! │       │                                                                 │
//! │       ▼  planners + executor                                            │
//! │  PaginatedResult<Row> { data, pagination }                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::table::TableDescriptor;
use crate::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MAX_TITLE_CHARS};

/// One result row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Bound Parameters
// =============================================================================

/// A positionally bound statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl SqlValue {
    /// Converts a JSON field value from a mutation payload.
    ///
    /// Arrays and objects are stored as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    SqlValue::UInt(u)
                } else {
                    SqlValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::UInt(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Statement {
            sql: sql.into(),
            params,
        }
    }
}

// =============================================================================
// Sort Order
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Case-insensitive parse; anything unrecognised is DESC.
    pub fn parse_lenient(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }
}

// =============================================================================
// Query Parameters
// =============================================================================

/// Raw list-query parameters as received from the caller.
///
/// Immutable per request and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    /// Free-text search term.
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    /// `YYYY-MM-DD` for an exact day, anything else is a substring match.
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_size(mut self, page_size: i64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn range(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.start_time = start.map(str::to_string);
        self.end_time = end.map(str::to_string);
        self
    }

    pub fn sort(mut self, sort_by: impl Into<String>, sort_order: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self.sort_order = Some(sort_order.into());
        self
    }

    /// Clamps and cleans the parameters for a given table.
    ///
    /// - page < 1 becomes 1
    /// - pageSize absent or < 1 becomes 10, above 1000 becomes 1000
    /// - blank strings become `None`
    /// - the title is cut to 200 characters
    /// - sortBy is replaced by the table default unless allow-listed
    pub fn normalize(&self, table: &TableDescriptor) -> NormalizedQuery {
        let page = self.page.filter(|p| *p >= 1).unwrap_or(1) as u64;
        let page_size = match self.page_size {
            Some(size) if size >= 1 => size.min(MAX_PAGE_SIZE as i64) as u64,
            _ => DEFAULT_PAGE_SIZE,
        };

        let title = clean(&self.title).map(|t| {
            if t.chars().count() > MAX_TITLE_CHARS {
                t.chars().take(MAX_TITLE_CHARS).collect()
            } else {
                t
            }
        });

        NormalizedQuery {
            page,
            page_size,
            title,
            item_type: clean(&self.item_type),
            date: clean(&self.date),
            start_time: clean(&self.start_time),
            end_time: clean(&self.end_time),
            sort_by: table.resolve_sort_column(clean(&self.sort_by).as_deref()),
            sort_order: self
                .sort_order
                .as_deref()
                .map(SortOrder::parse_lenient)
                .unwrap_or_default(),
        }
    }
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parameters after clamping. This is what cache keys are built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NormalizedQuery {
    pub page: u64,
    pub page_size: u64,
    pub title: Option<String>,
    pub item_type: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub sort_by: String,
    pub sort_order: SortOrder,
}

impl NormalizedQuery {
    /// `(page - 1) * pageSize`, saturating at `u64::MAX` for absurd pages.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    /// Whether any user-supplied filter is present.
    pub fn has_filters(&self) -> bool {
        self.title.is_some()
            || self.item_type.is_some()
            || self.date.is_some()
            || self.start_time.is_some()
            || self.end_time.is_some()
    }

    /// Stable text of the filter fields only; page, pageSize and sort are
    /// excluded because the row count does not depend on them.
    ///
    /// Encoded as a JSON array so user text containing delimiters cannot
    /// make two different filters collide.
    pub fn filter_signature(&self) -> String {
        let fields = [
            &self.title,
            &self.item_type,
            &self.date,
            &self.start_time,
            &self.end_time,
        ];
        serde_json::Value::Array(
            fields
                .iter()
                .map(|v| match v {
                    Some(s) => serde_json::Value::String(s.clone()),
                    None => serde_json::Value::Null,
                })
                .collect(),
        )
        .to_string()
    }
}

// =============================================================================
// Result Envelope
// =============================================================================

/// How trustworthy `total_records` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CountAccuracy {
    /// A real `COUNT`.
    Exact,
    /// Read from engine statistics or id ranges.
    Estimated,
    /// Every estimate failed; the configured default was used.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_records: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub count_accuracy: CountAccuracy,
}

impl Pagination {
    pub fn new(total_records: u64, page: u64, page_size: u64, accuracy: CountAccuracy) -> Self {
        let page_size = page_size.max(1);
        Pagination {
            total_records,
            page,
            page_size,
            total_pages: total_records.div_ceil(page_size),
            count_accuracy: accuracy,
        }
    }
}

/// One page of rows plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> PaginatedResult<T> {
    /// A page past the end: no rows, true totals.
    pub fn empty(pagination: Pagination) -> Self {
        PaginatedResult {
            data: Vec::new(),
            pagination,
        }
    }
}

/// Outcome of a create, update or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    /// Generated id, for inserts.
    pub id: Option<u64>,
    pub affected_rows: u64,
}

// =============================================================================
// Unit Tests
// =============================================================================
