//! # Pagination Planner
//!
//! Chooses how a page is read and renders the statements for it.
//!
//! ## Plan Selection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  full-text search? ──yes──► FullText      LIMIT n OFFSET m,            │
//! │       │ no                                relevance first              │
//! │       ▼                                                                 │
//! │  filtered? ──yes──► offset == 0 ? FilteredFirstPage (LIMIT n)          │
//! │       │ no                      : FilteredOffset    (LIMIT n OFFSET m) │
//! │       ▼                                                                 │
//! │  offset == 0           ──► IndexedFirstPage  (index hint)              │
//! │  offset < threshold    ──► ShallowOffset     (index hint, OFFSET)      │
//! │  sort == date column   ──► Cursor            (probe + seek)            │
//! │  otherwise             ──► DeepOffset        (plain OFFSET)            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cursor Pagination
//! `LIMIT n OFFSET m` makes the server walk and discard `m` rows. For deep
//! pages on the date-sorted table we instead:
//! 1. probe `(date, id)` of the first row of the page with
//!    `ORDER BY date, id LIMIT 1 OFFSET m` (index-only walk), then
//! 2. seek `WHERE (date, id) <= (b_date, b_id) ORDER BY date, id LIMIT n`.
//!
//! Seeking on the `(date, id)` pair keeps rows that share the boundary date
//! from being skipped or repeated.

use crate::filter::WhereClause;
use crate::search::SearchPredicate;
use crate::table::{quote_ident, TableDescriptor};
use crate::types::{NormalizedQuery, SortOrder, SqlValue, Statement};

/// How a single page is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePlan {
    FullText { offset: u64, limit: u64 },
    IndexedFirstPage { index: Option<&'static str>, limit: u64 },
    ShallowOffset { index: Option<&'static str>, offset: u64, limit: u64 },
    Cursor { offset: u64, limit: u64 },
    DeepOffset { offset: u64, limit: u64 },
    FilteredFirstPage { limit: u64 },
    FilteredOffset { offset: u64, limit: u64 },
}

impl PagePlan {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            PagePlan::FullText { .. } => "full_text",
            PagePlan::IndexedFirstPage { .. } => "indexed_first_page",
            PagePlan::ShallowOffset { .. } => "shallow_offset",
            PagePlan::Cursor { .. } => "cursor",
            PagePlan::DeepOffset { .. } => "deep_offset",
            PagePlan::FilteredFirstPage { .. } => "filtered_first_page",
            PagePlan::FilteredOffset { .. } => "filtered_offset",
        }
    }
}

/// Selects a [`PagePlan`].
pub fn plan_page(
    table: &TableDescriptor,
    query: &NormalizedQuery,
    has_conditions: bool,
    uses_full_text: bool,
    deep_offset_threshold: u64,
) -> PagePlan {
    let offset = query.offset();
    let limit = query.page_size;

    if uses_full_text {
        return PagePlan::FullText { offset, limit };
    }

    if has_conditions {
        return if offset == 0 {
            PagePlan::FilteredFirstPage { limit }
        } else {
            PagePlan::FilteredOffset { offset, limit }
        };
    }

    let index = date_index_hint(table, query);

    if offset == 0 {
        PagePlan::IndexedFirstPage { index, limit }
    } else if offset < deep_offset_threshold {
        PagePlan::ShallowOffset { index, offset, limit }
    } else if query.sort_by == table.date_column {
        PagePlan::Cursor { offset, limit }
    } else {
        PagePlan::DeepOffset { offset, limit }
    }
}

/// The descending date index only helps a `date DESC` sort.
fn date_index_hint(table: &TableDescriptor, query: &NormalizedQuery) -> Option<&'static str> {
    if query.sort_by == table.date_column && query.sort_order == SortOrder::Desc {
        table.date_index
    } else {
        None
    }
}

// =============================================================================
// Statement Rendering
// =============================================================================

/// Renders the statements for one list request.
#[derive(Debug, Clone, Copy)]
pub struct PageQuery<'a> {
    pub table: &'a TableDescriptor,
    pub query: &'a NormalizedQuery,
    pub select_list: &'a str,
    pub filter: &'a WhereClause,
    pub search: &'a SearchPredicate,
}

impl<'a> PageQuery<'a> {
    fn from_clause(&self, index: Option<&str>) -> String {
        match index {
            Some(idx) => format!(
                "{} FORCE INDEX ({})",
                quote_ident(self.table.name()),
                quote_ident(idx)
            ),
            None => quote_ident(self.table.name()),
        }
    }

    /// `sort dir[, id dir]`
    fn order_keys(&self) -> String {
        let dir = self.query.sort_order.as_sql();
        let sort = &self.query.sort_by;
        if sort == self.table.primary_key {
            format!("{} {}", quote_ident(sort), dir)
        } else {
            format!(
                "{0} {2}, {1} {2}",
                quote_ident(sort),
                quote_ident(self.table.primary_key),
                dir
            )
        }
    }

    fn limit_clause(limit: u64, offset: Option<u64>) -> String {
        match offset {
            Some(offset) => format!(" LIMIT {} OFFSET {}", limit, offset),
            None => format!(" LIMIT {}", limit),
        }
    }

    /// The data statement for every plan except [`PagePlan::Cursor`], which
    /// needs [`Self::probe`] and [`Self::seek`] instead. For a cursor plan
    /// this renders the plain OFFSET fallback.
    pub fn render(&self, plan: &PagePlan) -> Statement {
        let (index, offset, limit) = match *plan {
            PagePlan::FullText { offset, limit } => return self.render_full_text(offset, limit),
            PagePlan::IndexedFirstPage { index, limit } => (index, None, limit),
            PagePlan::ShallowOffset { index, offset, limit } => (index, Some(offset), limit),
            PagePlan::Cursor { offset, limit } | PagePlan::DeepOffset { offset, limit } => {
                (None, Some(offset), limit)
            }
            PagePlan::FilteredFirstPage { limit } => (None, None, limit),
            PagePlan::FilteredOffset { offset, limit } => (None, Some(offset), limit),
        };

        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {}{}",
            self.select_list,
            self.from_clause(index),
            self.filter.to_sql(),
            self.order_keys(),
            Self::limit_clause(limit, offset)
        );
        Statement::new(sql, self.filter.params().to_vec())
    }

    fn render_full_text(&self, offset: u64, limit: u64) -> Statement {
        let mut params = self.filter.params().to_vec();
        let order = match &self.search.relevance {
            Some(expr) => {
                params.extend(self.search.relevance_params.iter().cloned());
                format!("{} DESC, {}", expr, self.order_keys())
            }
            None => self.order_keys(),
        };
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {}{}",
            self.select_list,
            self.from_clause(None),
            self.filter.to_sql(),
            order,
            Self::limit_clause(limit, Some(offset))
        );
        Statement::new(sql, params)
    }

    /// Single-row probe for the `(date, id)` at `offset`.
    pub fn probe(&self, offset: u64) -> Statement {
        let date = quote_ident(self.table.date_column);
        let pk = quote_ident(self.table.primary_key);
        let dir = self.query.sort_order.as_sql();
        let sql = format!(
            "SELECT {0}, {1} FROM {2}{3} ORDER BY {0} {4}, {1} {4} LIMIT 1 OFFSET {5}",
            date,
            pk,
            self.from_clause(date_index_hint(self.table, self.query)),
            self.filter.to_sql(),
            dir,
            offset
        );
        Statement::new(sql, self.filter.params().to_vec())
    }

    /// Bounded read starting at the probed boundary.
    ///
    /// MySQL sorts NULL dates last under DESC, so a descending seek also
    /// admits them; under ASC they sort first and lie before any non-NULL
    /// boundary.
    pub fn seek(&self, boundary_date: SqlValue, boundary_id: SqlValue, limit: u64) -> Statement {
        let date = quote_ident(self.table.date_column);
        let pk = quote_ident(self.table.primary_key);
        let dir = self.query.sort_order.as_sql();
        let seek = match self.query.sort_order {
            SortOrder::Desc => format!(
                "({0} < ? OR ({0} = ? AND {1} <= ?) OR {0} IS NULL)",
                date, pk
            ),
            SortOrder::Asc => format!("({0} > ? OR ({0} = ? AND {1} >= ?))", date, pk),
        };
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {3} {4}, {5} {4} LIMIT {6}",
            self.select_list,
            quote_ident(self.table.name()),
            self.filter.to_sql_with(&seek),
            date,
            dir,
            pk,
            limit
        );
        let mut params = self.filter.params().to_vec();
        params.push(boundary_date.clone());
        params.push(boundary_date);
        params.push(boundary_id);
        Statement::new(sql, params)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::build_where;
    use crate::search::plan_search;
    use crate::types::QueryParams;

    const THRESHOLD: u64 = 10_000;

    struct Fixture {
        table: TableDescriptor,
        query: NormalizedQuery,
        filter: WhereClause,
        search: SearchPredicate,
    }

    impl Fixture {
        fn new(params: QueryParams) -> Self {
            let table = TableDescriptor::crawler();
            let query = params.normalize(&table);
            let search = plan_search(query.title.as_deref(), &table);
            let filter = build_where(&table, &query, &search);
            Fixture {
                table,
                query,
                filter,
                search,
            }
        }

        fn plan(&self) -> PagePlan {
            plan_page(
                &self.table,
                &self.query,
                self.filter.has_conditions(),
                self.search.uses_full_text(),
                THRESHOLD,
            )
        }

        fn page_query(&self) -> PageQuery<'_> {
            PageQuery {
                table: &self.table,
                query: &self.query,
                select_list: "*",
                filter: &self.filter,
                search: &self.search,
            }
        }
    }

    #[test]
    fn test_first_page_uses_date_index() {
        let f = Fixture::new(QueryParams::new());
        let plan = f.plan();
        assert_eq!(
            plan,
            PagePlan::IndexedFirstPage {
                index: Some("idx_u3c3_date_desc"),
                limit: 10
            }
        );
        let stmt = f.page_query().render(&plan);
        assert_eq!(
            stmt.sql,
            "SELECT * FROM `u3c3` FORCE INDEX (`idx_u3c3_date_desc`) \
             WHERE (`is_deleted` = 0 OR `is_deleted` IS NULL) \
             ORDER BY `date` DESC, `id` DESC LIMIT 10"
        );
    }

    #[test]
    fn test_ascending_sort_skips_hint() {
        let f = Fixture::new(QueryParams::new().sort("date", "ASC"));
        assert_eq!(
            f.plan(),
            PagePlan::IndexedFirstPage {
                index: None,
                limit: 10
            }
        );
    }

    #[test]
    fn test_shallow_offset() {
        let f = Fixture::new(QueryParams::new().page(3));
        let plan = f.plan();
        assert!(matches!(plan, PagePlan::ShallowOffset { offset: 20, .. }));
        assert!(f.page_query().render(&plan).sql.ends_with("LIMIT 10 OFFSET 20"));
    }

    #[test]
    fn test_deep_date_sort_uses_cursor() {
        let f = Fixture::new(QueryParams::new().page(5001).page_size(10));
        let plan = f.plan();
        assert_eq!(
            plan,
            PagePlan::Cursor {
                offset: 50_000,
                limit: 10
            }
        );

        let probe = f.page_query().probe(50_000);
        assert_eq!(
            probe.sql,
            "SELECT `date`, `id` FROM `u3c3` FORCE INDEX (`idx_u3c3_date_desc`) \
             WHERE (`is_deleted` = 0 OR `is_deleted` IS NULL) \
             ORDER BY `date` DESC, `id` DESC LIMIT 1 OFFSET 50000"
        );

        let seek = f.page_query().seek(
            SqlValue::Text("2024-01-01 00:00:00".into()),
            SqlValue::Int(777),
            10,
        );
        assert_eq!(
            seek.sql,
            "SELECT * FROM `u3c3` \
             WHERE (`is_deleted` = 0 OR `is_deleted` IS NULL) \
             AND (`date` < ? OR (`date` = ? AND `id` <= ?) OR `date` IS NULL) \
             ORDER BY `date` DESC, `id` DESC LIMIT 10"
        );
        assert!(!seek.sql.contains("OFFSET"));
        assert_eq!(seek.params.len(), 3);
        assert_eq!(seek.params[2], SqlValue::Int(777));
    }

    #[test]
    fn test_ascending_cursor_flips_comparisons() {
        let f = Fixture::new(QueryParams::new().page(2000).sort("date", "asc"));
        assert!(matches!(f.plan(), PagePlan::Cursor { .. }));
        let seek = f
            .page_query()
            .seek(SqlValue::Text("d".into()), SqlValue::Int(1), 10);
        assert!(seek.sql.contains("(`date` > ? OR (`date` = ? AND `id` >= ?))"));
        assert!(seek.sql.contains("ORDER BY `date` ASC, `id` ASC"));
        assert!(!seek.sql.contains("`date` IS NULL"));
    }

    #[test]
    fn test_descending_cursor_keeps_null_dates() {
        let f = Fixture::new(QueryParams::new().page(1500).page_size(10));
        assert!(matches!(f.plan(), PagePlan::Cursor { .. }));

        let seek = f
            .page_query()
            .seek(SqlValue::Text("2020-01-01 00:00:00".into()), SqlValue::Int(8), 10);
        assert!(seek
            .sql
            .contains("AND (`date` < ? OR (`date` = ? AND `id` <= ?) OR `date` IS NULL)"));
        // The NULL arm takes no parameter
        assert_eq!(seek.params.len(), 3);
    }

    #[test]
    fn test_deep_non_date_sort_is_plain_offset() {
        let f = Fixture::new(QueryParams::new().page(2000).sort("size", "DESC"));
        let plan = f.plan();
        assert_eq!(
            plan,
            PagePlan::DeepOffset {
                offset: 19_990,
                limit: 10
            }
        );
        let stmt = f.page_query().render(&plan);
        assert!(stmt.sql.contains("ORDER BY `size` DESC, `id` DESC"));
        assert!(stmt.sql.ends_with("LIMIT 10 OFFSET 19990"));
    }

    #[test]
    fn test_filtered_pages() {
        let f = Fixture::new(QueryParams::new().item_type("movie"));
        let plan = f.plan();
        assert_eq!(plan, PagePlan::FilteredFirstPage { limit: 10 });
        let stmt = f.page_query().render(&plan);
        assert!(!stmt.sql.contains("OFFSET"));
        assert!(!stmt.sql.contains("FORCE INDEX"));

        let f = Fixture::new(QueryParams::new().item_type("movie").page(20_000));
        assert!(matches!(f.plan(), PagePlan::FilteredOffset { .. }));
    }

    #[test]
    fn test_full_text_orders_by_relevance() {
        let f = Fixture::new(QueryParams::new().title("hello world").page(2));
        let plan = f.plan();
        assert_eq!(
            plan,
            PagePlan::FullText {
                offset: 10,
                limit: 10
            }
        );
        let stmt = f.page_query().render(&plan);
        assert_eq!(
            stmt.sql,
            "SELECT * FROM `u3c3` \
             WHERE (`is_deleted` = 0 OR `is_deleted` IS NULL) \
             AND MATCH(`title`) AGAINST(? IN NATURAL LANGUAGE MODE) \
             ORDER BY MATCH(`title`) AGAINST(? IN NATURAL LANGUAGE MODE) DESC, \
             `date` DESC, `id` DESC LIMIT 10 OFFSET 10"
        );
        assert_eq!(stmt.params.len(), 2);
    }
}
