//! # Row Count Estimation
//!
//! Totals for pagination without a full-table scan.
//!
//! ## Decision
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  filtered, or small table ──► SELECT COUNT(*) ... WHERE ...   (exact)  │
//! │                                                                         │
//! │  unfiltered large table   ──► ESTIMATE_CHAIN, first success wins:      │
//! │       1. SHOW TABLE STATUS           (Rows)                             │
//! │       2. information_schema.TABLES   (TABLE_ROWS)                       │
//! │       3. AUTO_INCREMENT - MIN(id)                                       │
//! │       4. MAX(id) - MIN(id) + 1                                          │
//! │       └─ all failed ──► fallback_row_estimate, flagged Fallback         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failing estimate never fails the request; only the exact `COUNT`
//! propagates driver errors.

use harvest_core::{quote_ident, CountAccuracy, Row, SqlValue, Statement, TableDescriptor, WhereClause};
use serde_json::Value;
use tracing::debug;

use crate::error::DbResult;
use crate::executor::TimedExecutor;
use crate::stats::FallbackEvent;

/// One way of estimating an unfiltered row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountStrategy {
    /// `Rows` from `SHOW TABLE STATUS`.
    TableStatus,
    /// `TABLE_ROWS` from `information_schema.TABLES`.
    InformationSchema,
    /// Next auto-increment value minus the smallest live id.
    AutoIncrementSpan,
    /// Size of the `[MIN(id), MAX(id)]` range.
    IdRange,
}

/// Order in which estimates are attempted.
pub const ESTIMATE_CHAIN: [CountStrategy; 4] = [
    CountStrategy::TableStatus,
    CountStrategy::InformationSchema,
    CountStrategy::AutoIncrementSpan,
    CountStrategy::IdRange,
];

/// Result of one strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Resolved(u64),
    /// Try the next strategy.
    Continue(String),
}

/// A resolved total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountResolution {
    pub total: u64,
    pub accuracy: CountAccuracy,
}

impl CountResolution {
    /// Fallback totals are guesses and must not be cached.
    pub fn is_cacheable(&self) -> bool {
        self.accuracy != CountAccuracy::Fallback
    }
}

/// Resolves totals for list requests.
#[derive(Debug)]
pub struct CountEstimator<'a> {
    executor: &'a TimedExecutor,
    fallback_row_estimate: u64,
}

impl<'a> CountEstimator<'a> {
    pub fn new(executor: &'a TimedExecutor, fallback_row_estimate: u64) -> Self {
        CountEstimator {
            executor,
            fallback_row_estimate,
        }
    }

    /// Counts the rows `filter` selects, returning any fallback that was
    /// taken so the caller can report it.
    pub async fn resolve(
        &self,
        table: &TableDescriptor,
        filter: &WhereClause,
    ) -> DbResult<(CountResolution, Option<FallbackEvent>)> {
        if filter.has_conditions() || !table.large_table {
            let total = self.exact(table, filter).await?;
            return Ok((
                CountResolution {
                    total,
                    accuracy: CountAccuracy::Exact,
                },
                None,
            ));
        }

        for strategy in ESTIMATE_CHAIN {
            match self.attempt(strategy, table).await {
                StrategyOutcome::Resolved(total) => {
                    debug!(table = table.name(), ?strategy, total, "Row count estimated");
                    return Ok((
                        CountResolution {
                            total,
                            accuracy: CountAccuracy::Estimated,
                        },
                        None,
                    ));
                }
                StrategyOutcome::Continue(reason) => {
                    debug!(table = table.name(), ?strategy, %reason, "Count strategy skipped");
                }
            }
        }

        Ok((
            CountResolution {
                total: self.fallback_row_estimate,
                accuracy: CountAccuracy::Fallback,
            },
            Some(FallbackEvent::CountEstimateUnavailable {
                table: table.name(),
                fallback: self.fallback_row_estimate,
            }),
        ))
    }

    /// `SELECT COUNT(*)` with the request's WHERE clause.
    async fn exact(&self, table: &TableDescriptor, filter: &WhereClause) -> DbResult<u64> {
        let statement = Statement::new(
            format!(
                "SELECT COUNT(*) AS total FROM {}{}",
                quote_ident(table.name()),
                filter.to_sql()
            ),
            filter.params().to_vec(),
        );
        let row = self.executor.fetch_optional(&statement).await?;
        Ok(row.as_ref().and_then(|r| column_u64(r, "total")).unwrap_or(0))
    }

    /// Runs one strategy. Errors turn into [`StrategyOutcome::Continue`].
    pub async fn attempt(&self, strategy: CountStrategy, table: &TableDescriptor) -> StrategyOutcome {
        match self.run_strategy(strategy, table).await {
            Ok(outcome) => outcome,
            Err(e) => StrategyOutcome::Continue(e.to_string()),
        }
    }

    async fn run_strategy(
        &self,
        strategy: CountStrategy,
        table: &TableDescriptor,
    ) -> DbResult<StrategyOutcome> {
        let name = table.name();
        let pk = quote_ident(table.primary_key);

        match strategy {
            CountStrategy::TableStatus => {
                let row = self
                    .executor
                    .fetch_optional(&Statement::new(
                        "SHOW TABLE STATUS LIKE ?",
                        vec![SqlValue::from(name)],
                    ))
                    .await?;
                Ok(positive(row.as_ref().and_then(|r| column_u64(r, "Rows"))))
            }

            CountStrategy::InformationSchema => {
                let row = self
                    .executor
                    .fetch_optional(&Statement::new(
                        "SELECT TABLE_ROWS AS total FROM information_schema.TABLES \
                         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
                        vec![SqlValue::from(name)],
                    ))
                    .await?;
                Ok(positive(row.as_ref().and_then(|r| column_u64(r, "total"))))
            }

            CountStrategy::AutoIncrementSpan => {
                let next = self
                    .executor
                    .fetch_optional(&Statement::new(
                        "SELECT AUTO_INCREMENT AS next_id FROM information_schema.TABLES \
                         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
                        vec![SqlValue::from(name)],
                    ))
                    .await?
                    .and_then(|r| column_u64(&r, "next_id"));
                let Some(next) = next else {
                    return Ok(StrategyOutcome::Continue("no auto-increment value".into()));
                };

                let min = self
                    .executor
                    .fetch_optional(&Statement::new(
                        format!("SELECT MIN({}) AS min_id FROM {}", pk, quote_ident(name)),
                        Vec::new(),
                    ))
                    .await?
                    .and_then(|r| column_u64(&r, "min_id"));

                Ok(match min {
                    Some(min) if next > min => StrategyOutcome::Resolved(next - min),
                    _ => StrategyOutcome::Continue("empty id span".into()),
                })
            }

            CountStrategy::IdRange => {
                let row = self
                    .executor
                    .fetch_optional(&Statement::new(
                        format!(
                            "SELECT MIN({0}) AS min_id, MAX({0}) AS max_id FROM {1}",
                            pk,
                            quote_ident(name)
                        ),
                        Vec::new(),
                    ))
                    .await?;
                let bounds = row
                    .as_ref()
                    .map(|r| (column_u64(r, "min_id"), column_u64(r, "max_id")));

                Ok(match bounds {
                    Some((Some(min), Some(max))) if max >= min => {
                        StrategyOutcome::Resolved(max - min + 1)
                    }
                    // MIN/MAX of an empty table are NULL: the table really is empty
                    Some((None, None)) => StrategyOutcome::Resolved(0),
                    _ => StrategyOutcome::Continue("no id range".into()),
                })
            }
        }
    }
}

/// Statistics report 0 for tables they have not analyzed yet, so a zero
/// estimate is treated as unknown.
fn positive(value: Option<u64>) -> StrategyOutcome {
    match value {
        Some(n) if n > 0 => StrategyOutcome::Resolved(n),
        Some(_) => StrategyOutcome::Continue("zero estimate".into()),
        None => StrategyOutcome::Continue("no estimate".into()),
    }
}

/// Reads a non-negative integer column. MySQL returns some catalog numbers
/// as DECIMAL or text, so strings are parsed too.
pub(crate) fn column_u64(row: &Row, column: &str) -> Option<u64> {
    match row.get(column)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
