//! # Statement Executor
//!
//! The seam between the engine and the database driver.
//!
//! The engine only ever needs three things from a connection: fetch rows,
//! execute a write, and shut down. Keeping that behind a trait lets the
//! production [`MySqlExecutor`](crate::pool::MySqlExecutor) and the
//! recording executor used in tests share the same orchestration code,
//! and lets tests assert on the exact SQL that would have been sent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use harvest_core::{Row, Statement};

use crate::error::{DbError, DbResult};

/// Result of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// `LAST_INSERT_ID()` for inserts, 0 otherwise.
    pub last_insert_id: u64,
}

/// Runs statements against the database.
///
/// Implementations borrow a connection per call and return it before the
/// call completes; nothing is held between calls.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Runs a read and decodes every row.
    async fn fetch_all(&self, statement: &Statement) -> DbResult<Vec<Row>>;

    /// Runs an INSERT/UPDATE/DELETE.
    async fn execute(&self, statement: &Statement) -> DbResult<ExecOutcome>;

    /// Checks the database is reachable.
    async fn health_check(&self) -> bool {
        self.fetch_all(&Statement::new("SELECT 1", Vec::new()))
            .await
            .is_ok()
    }

    /// Releases every connection.
    async fn close(&self);
}

/// An executor with a per-statement deadline.
///
/// Every statement the engine issues goes through here, so a stalled probe
/// or data query surfaces as [`DbError::Timeout`] instead of hanging the
/// request.
#[derive(Clone)]
pub struct TimedExecutor {
    inner: Arc<dyn SqlExecutor>,
    timeout: Duration,
}

impl TimedExecutor {
    pub fn new(inner: Arc<dyn SqlExecutor>, timeout: Duration) -> Self {
        TimedExecutor { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn fetch_all(&self, statement: &Statement) -> DbResult<Vec<Row>> {
        tokio::time::timeout(self.timeout, self.inner.fetch_all(statement))
            .await
            .map_err(|_| DbError::Timeout(self.timeout))?
    }

    /// First row, if any.
    pub async fn fetch_optional(&self, statement: &Statement) -> DbResult<Option<Row>> {
        Ok(self.fetch_all(statement).await?.into_iter().next())
    }

    pub async fn execute(&self, statement: &Statement) -> DbResult<ExecOutcome> {
        tokio::time::timeout(self.timeout, self.inner.execute(statement))
            .await
            .map_err(|_| DbError::Timeout(self.timeout))?
    }

    pub async fn health_check(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, self.inner.health_check()).await,
            Ok(true)
        )
    }

    pub async fn close(&self) {
        self.inner.close().await;
    }
}

impl std::fmt::Debug for TimedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedExecutor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
