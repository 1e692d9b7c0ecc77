//! # Table Descriptors
//!
//! The engine serves a small closed set of tables. Each one is described
//! once here, and every planner decision that depends on the table (soft
//! delete, full-text capability, sortable columns, count strategy) reads
//! the descriptor instead of comparing table names.
//!
//! ## Managed Tables
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TableId::Crawler ("u3c3")          TableId::CrawlLog ("crawl_log")    │
//! │  ─────────────────────────          ───────────────────────────────    │
//! │  • millions of rows                 • small append-only log            │
//! │  • soft delete (is_deleted)         • hard delete only                 │
//! │  • FULLTEXT(title), ngram parser    • LIKE search on message           │
//! │  • idx_u3c3_date_desc               • exact COUNT(*) is cheap          │
//! │  • approximate unfiltered counts                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};

// =============================================================================
// Table Identity
// =============================================================================

/// Typed identifier for a managed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableId {
    /// The crawler result set.
    Crawler,
    /// Auxiliary crawl log.
    CrawlLog,
}

impl TableId {
    /// Every managed table.
    pub const ALL: [TableId; 2] = [TableId::Crawler, TableId::CrawlLog];

    /// SQL table name.
    pub fn table_name(&self) -> &'static str {
        match self {
            TableId::Crawler => "u3c3",
            TableId::CrawlLog => "crawl_log",
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for TableId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "u3c3" | "crawler" => Ok(TableId::Crawler),
            "crawl_log" | "crawllog" | "log" => Ok(TableId::CrawlLog),
            other => Err(ValidationError::UnknownTable(other.to_string())),
        }
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// Everything the planners need to know about one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub id: TableId,

    /// Integer auto-increment primary key.
    pub primary_key: &'static str,

    /// All known columns. Projections and writes are checked against this.
    pub columns: &'static [&'static str],

    /// Flag column for soft delete (`0`/`NULL` = live, `1` = deleted).
    pub soft_delete_column: Option<&'static str>,

    /// Columns covered by a FULLTEXT index. Empty = no full-text search.
    pub full_text_columns: &'static [&'static str],

    /// Column the free-text `title` parameter searches.
    pub search_column: &'static str,

    /// Column the `type` parameter filters on.
    pub type_column: Option<&'static str>,

    /// Column the date and range filters apply to; also the seek column
    /// for cursor pagination.
    pub date_column: &'static str,

    /// Descending index on `date_column`, used as an index hint.
    pub date_index: Option<&'static str>,

    /// Columns allowed in ORDER BY.
    pub sortable_columns: Vec<String>,

    /// Sort column used when the request names none (or a disallowed one).
    pub default_sort: &'static str,

    /// Large tables never get an unfiltered `COUNT(*)`.
    pub large_table: bool,

    /// Server-maintained creation timestamp.
    pub created_at_column: Option<&'static str>,

    /// Server-maintained modification timestamp.
    pub updated_at_column: Option<&'static str>,
}

const CRAWLER_COLUMNS: &[&str] = &[
    "id",
    "title",
    "type",
    "url",
    "magnet",
    "torrent",
    "size",
    "date",
    "is_deleted",
    "created_at",
    "updated_at",
];

const CRAWL_LOG_COLUMNS: &[&str] = &["id", "level", "source", "message", "created_at"];

impl TableDescriptor {
    /// Descriptor for the crawler result table.
    pub fn crawler() -> Self {
        TableDescriptor {
            id: TableId::Crawler,
            primary_key: "id",
            columns: CRAWLER_COLUMNS,
            soft_delete_column: Some("is_deleted"),
            full_text_columns: &["title"],
            search_column: "title",
            type_column: Some("type"),
            date_column: "date",
            date_index: Some("idx_u3c3_date_desc"),
            sortable_columns: ["id", "title", "type", "size", "date", "created_at", "updated_at"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            default_sort: "date",
            large_table: true,
            created_at_column: Some("created_at"),
            updated_at_column: Some("updated_at"),
        }
    }

    /// Descriptor for the crawl log table.
    pub fn crawl_log() -> Self {
        TableDescriptor {
            id: TableId::CrawlLog,
            primary_key: "id",
            columns: CRAWL_LOG_COLUMNS,
            soft_delete_column: None,
            full_text_columns: &[],
            search_column: "message",
            type_column: Some("level"),
            date_column: "created_at",
            date_index: None,
            sortable_columns: ["id", "level", "source", "created_at"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            default_sort: "created_at",
            large_table: false,
            created_at_column: Some("created_at"),
            updated_at_column: None,
        }
    }

    /// SQL table name.
    pub fn name(&self) -> &'static str {
        self.id.table_name()
    }

    /// Whether the table carries a FULLTEXT index.
    pub fn supports_full_text(&self) -> bool {
        !self.full_text_columns.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }

    /// Returns the allowed sort column matching `requested`, or the
    /// table default.
    pub fn resolve_sort_column(&self, requested: Option<&str>) -> String {
        requested
            .and_then(|r| self.sortable_columns.iter().find(|c| c.as_str() == r))
            .cloned()
            .unwrap_or_else(|| self.default_sort.to_string())
    }

    /// `(col = 0 OR col IS NULL)` for tables with soft delete.
    pub fn live_rows_predicate(&self) -> Option<String> {
        self.soft_delete_column
            .map(|col| format!("({0} = 0 OR {0} IS NULL)", quote_ident(col)))
    }

    /// Checks every projection column and renders the select list.
    pub fn select_list(&self, projection: Option<&[String]>) -> ValidationResult<String> {
        match projection {
            None => Ok("*".to_string()),
            Some([]) => Ok("*".to_string()),
            Some(cols) => {
                let mut rendered = Vec::with_capacity(cols.len());
                for col in cols {
                    self.check_column(col)?;
                    rendered.push(quote_ident(col));
                }
                Ok(rendered.join(", "))
            }
        }
    }

    /// Rejects names that are not columns of this table.
    pub fn check_column(&self, column: &str) -> ValidationResult<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(ValidationError::UnknownColumn {
                table: self.name().to_string(),
                column: column.to_string(),
            })
        }
    }
}

/// Backtick-quotes an identifier. Only ever called with names taken from a
/// descriptor, so the input never contains a backtick.
pub fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident)
}

// =============================================================================
// Registry
// =============================================================================

/// Lookup of descriptors keyed by [`TableId`].
#[derive(Debug, Clone)]
pub struct TableRegistry {
    tables: BTreeMap<TableId, TableDescriptor>,
}

impl Default for TableRegistry {
    fn default() -> Self {
        let tables = [TableDescriptor::crawler(), TableDescriptor::crawl_log()]
            .into_iter()
            .map(|d| (d.id, d))
            .collect();
        TableRegistry { tables }
    }
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies per-table sortable column allow-lists.
    ///
    /// Keys are table names (anything [`TableId::from_str`] accepts). Every
    /// listed column must exist on the table.
    pub fn with_sortable_overrides(
        mut self,
        overrides: &BTreeMap<String, Vec<String>>,
    ) -> ValidationResult<Self> {
        for (table, columns) in overrides {
            let id: TableId = table.parse()?;
            let descriptor = self.get_mut(id)?;
            for col in columns {
                descriptor.check_column(col)?;
            }
            if columns.is_empty() {
                return Err(ValidationError::Required {
                    field: format!("sortable columns for {}", id),
                });
            }
            descriptor.sortable_columns = columns.clone();
        }
        Ok(self)
    }

    pub fn get(&self, id: TableId) -> ValidationResult<&TableDescriptor> {
        self.tables
            .get(&id)
            .ok_or_else(|| ValidationError::UnknownTable(id.to_string()))
    }

    fn get_mut(&mut self, id: TableId) -> ValidationResult<&mut TableDescriptor> {
        self.tables
            .get_mut(&id)
            .ok_or_else(|| ValidationError::UnknownTable(id.to_string()))
    }

    /// Resolves a caller-supplied table name.
    pub fn resolve(&self, name: &str) -> ValidationResult<&TableDescriptor> {
        self.get(name.parse()?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
