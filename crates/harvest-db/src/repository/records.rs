//! # Record Repository
//!
//! Single-row operations on one table.
//!
//! ## Statements
//! ```text
//! create      INSERT INTO `t` (`a`, `b`, ...) VALUES (?, ?, ...)
//! update      UPDATE `t` SET `a` = ?, ... WHERE `id` = ? [AND live]
//! soft delete UPDATE `t` SET `is_deleted` = 1, `updated_at` = ? WHERE `id` = ? AND live
//! hard delete DELETE FROM `t` WHERE `id` = ?
//! get         SELECT ... FROM `t` WHERE `id` = ? [AND live] LIMIT 1
//!
//! live = (`is_deleted` = 0 OR `is_deleted` IS NULL)
//! ```
//!
//! Every successful write clears both engine caches.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use harvest_core::validation::{validate_id, validate_write_fields};
use harvest_core::{quote_ident, MutationResult, Row, SqlValue, Statement, TableDescriptor, ValidationError};

use crate::engine::{CachedResult, QueryEngine};
use crate::error::{DbError, DbResult};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Repository for one table's rows.
///
/// ## Usage
/// ```rust,ignore
/// let records = engine.records(TableId::Crawler)?;
///
/// let created = records.create(&fields).await?;
/// let row = records.get_by_id(created.id.unwrap(), true, None, None).await?;
/// records.delete(created.id.unwrap(), false).await?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RecordRepository<'a> {
    engine: &'a QueryEngine,
    table: &'a TableDescriptor,
}

impl<'a> RecordRepository<'a> {
    pub(crate) fn new(engine: &'a QueryEngine, table: &'a TableDescriptor) -> Self {
        RecordRepository { engine, table }
    }

    pub fn table(&self) -> &TableDescriptor {
        self.table
    }

    /// Inserts a row.
    ///
    /// Timestamps the caller did not supply are set to the current UTC time
    /// and the soft-delete flag starts at 0.
    pub async fn create(&self, fields: &Row) -> DbResult<MutationResult> {
        validate_write_fields(self.table, fields, "create")?;

        let mut values = fields.clone();
        let now = now_text();
        for column in [self.table.created_at_column, self.table.updated_at_column]
            .into_iter()
            .flatten()
        {
            if values.get(column).map_or(true, Value::is_null) {
                values.insert(column.to_string(), Value::String(now.clone()));
            }
        }
        if let Some(flag) = self.table.soft_delete_column {
            values.insert(flag.to_string(), Value::from(0));
        }

        let columns: Vec<String> = values.keys().map(|c| quote_ident(c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let statement = Statement::new(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(self.table.name()),
                columns.join(", "),
                placeholders
            ),
            values.values().map(SqlValue::from_json).collect(),
        );

        let outcome = self.engine.executor().execute(&statement).await?;
        self.engine.clear_cache();

        info!(table = self.table.name(), id = outcome.last_insert_id, "Record created");
        Ok(MutationResult {
            id: Some(outcome.last_insert_id),
            affected_rows: outcome.rows_affected,
        })
    }

    /// Updates the given fields and refreshes `updated_at`.
    ///
    /// ## Errors
    /// - `NotFound` when no row (or, with `enforce_soft_delete`, no live
    ///   row) has this id
    pub async fn update(
        &self,
        id: u64,
        fields: &Row,
        enforce_soft_delete: bool,
    ) -> DbResult<MutationResult> {
        validate_id(id)?;
        validate_write_fields(self.table, fields, "update")?;

        let mut values = fields.clone();
        if let Some(column) = self.table.updated_at_column {
            values.insert(column.to_string(), Value::String(now_text()));
        }

        let assignments: Vec<String> = values
            .keys()
            .map(|c| format!("{} = ?", quote_ident(c)))
            .collect();
        let mut params: Vec<SqlValue> = values.values().map(SqlValue::from_json).collect();
        params.push(SqlValue::UInt(id));

        let statement = Statement::new(
            format!(
                "UPDATE {} SET {}{}",
                quote_ident(self.table.name()),
                assignments.join(", "),
                self.where_id(enforce_soft_delete)
            ),
            params,
        );

        self.write(&statement, id, "updated").await
    }

    /// Deletes a row: soft by default, a real `DELETE` when `hard`.
    ///
    /// Soft-deleting an already deleted row is `NotFound`. Soft delete on a
    /// table without a soft-delete column is rejected.
    pub async fn delete(&self, id: u64, hard: bool) -> DbResult<MutationResult> {
        validate_id(id)?;

        let statement = if hard {
            Statement::new(
                format!(
                    "DELETE FROM {}{}",
                    quote_ident(self.table.name()),
                    self.where_id(false)
                ),
                vec![SqlValue::UInt(id)],
            )
        } else {
            let flag = self
                .table
                .soft_delete_column
                .ok_or_else(|| ValidationError::Unsupported {
                    table: self.table.name().to_string(),
                    operation: "soft delete".to_string(),
                })?;

            let mut assignments = vec![format!("{} = 1", quote_ident(flag))];
            let mut params = Vec::new();
            if let Some(column) = self.table.updated_at_column {
                assignments.push(format!("{} = ?", quote_ident(column)));
                params.push(SqlValue::Text(now_text()));
            }
            params.push(SqlValue::UInt(id));

            Statement::new(
                format!(
                    "UPDATE {} SET {}{}",
                    quote_ident(self.table.name()),
                    assignments.join(", "),
                    self.where_id(true)
                ),
                params,
            )
        };

        self.write(&statement, id, if hard { "deleted" } else { "soft-deleted" })
            .await
    }

    /// Fetches one row.
    ///
    /// With `cache_ttl` the row is served from, and stored in, the result
    /// cache; without it the database is always asked.
    pub async fn get_by_id(
        &self,
        id: u64,
        enforce_soft_delete: bool,
        projection: Option<&[String]>,
        cache_ttl: Option<Duration>,
    ) -> DbResult<Row> {
        validate_id(id)?;
        let select_list = self.table.select_list(projection)?;

        let key = cache_ttl.map(|_| {
            format!(
                "{}|id={}|live={}|{}",
                self.table.name(),
                id,
                enforce_soft_delete,
                select_list
            )
        });
        if let Some(key) = &key {
            if let Some(CachedResult::Record(row)) = self.engine.result_cache().get(key) {
                return Ok(row);
            }
        }

        let statement = Statement::new(
            format!(
                "SELECT {} FROM {}{} LIMIT 1",
                select_list,
                quote_ident(self.table.name()),
                self.where_id(enforce_soft_delete)
            ),
            vec![SqlValue::UInt(id)],
        );

        let row = self
            .engine
            .executor()
            .fetch_optional(&statement)
            .await?
            .ok_or_else(|| DbError::not_found(self.table.name(), id))?;

        if let (Some(key), Some(ttl)) = (key, cache_ttl) {
            self.engine
                .result_cache()
                .set(key, CachedResult::Record(row.clone()), ttl);
        }
        Ok(row)
    }

    /// ` WHERE `id` = ?` plus the live-rows guard when asked for and the
    /// table has one.
    fn where_id(&self, enforce_soft_delete: bool) -> String {
        let mut clause = format!(" WHERE {} = ?", quote_ident(self.table.primary_key));
        if enforce_soft_delete {
            if let Some(guard) = self.table.live_rows_predicate() {
                clause.push_str(" AND ");
                clause.push_str(&guard);
            }
        }
        clause
    }

    /// Runs an UPDATE/DELETE that must hit exactly the addressed row.
    async fn write(&self, statement: &Statement, id: u64, verb: &str) -> DbResult<MutationResult> {
        let outcome = self.engine.executor().execute(statement).await?;
        if outcome.rows_affected == 0 {
            debug!(table = self.table.name(), id, "Write matched no row");
            return Err(DbError::not_found(self.table.name(), id));
        }

        self.engine.clear_cache();
        info!(table = self.table.name(), id, "Record {}", verb);
        Ok(MutationResult {
            id: Some(id),
            affected_rows: outcome.rows_affected,
        })
    }
}

fn now_text() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDateTime;
    use serde_json::json;

    use harvest_core::{QueryParams, TableId};

    use super::*;
    use crate::config::EngineConfig;
    use crate::test_support::{row, FakeExecutor, MemoryTable};

    fn engine_over(table: Arc<MemoryTable>) -> (QueryEngine, Arc<FakeExecutor>) {
        let fake = FakeExecutor::new(move |stmt| table.handle(stmt));
        let engine = QueryEngine::with_executor(fake.clone(), EngineConfig::default()).unwrap();
        (engine, fake)
    }

    fn sample() -> Row {
        row(json!({
            "title": "Ubuntu 24.04 LTS",
            "type": "software",
            "url": "https://example.org/ubuntu",
            "size": "5.7 GB",
            "date": "2024-04-25 10:00:00"
        }))
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let store = MemoryTable::new();
        let (engine, fake) = engine_over(store);
        let records = engine.records(TableId::Crawler).unwrap();
        // Stored timestamps have second precision
        let started = Utc::now().naive_utc() - chrono::Duration::seconds(1);

        let created = records.create(&sample()).await.unwrap();
        assert_eq!(created.affected_rows, 1);
        let id = created.id.unwrap();

        assert_eq!(
            fake.sql_log()[0],
            "INSERT INTO `u3c3` (`created_at`, `date`, `is_deleted`, `size`, `title`, `type`, `updated_at`, `url`) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        );

        let fetched = records.get_by_id(id, true, None, None).await.unwrap();
        for (column, value) in sample() {
            assert_eq!(fetched.get(&column), Some(&value), "column {}", column);
        }
        for column in ["created_at", "updated_at"] {
            let text = fetched[column].as_str().unwrap();
            let stamp = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).unwrap();
            assert!(stamp >= started);
        }
    }

    #[tokio::test]
    async fn test_soft_delete_hides_row_unless_disabled() {
        let store = MemoryTable::new();
        let (engine, fake) = engine_over(store.clone());
        let records = engine.records(TableId::Crawler).unwrap();
        let id = records.create(&sample()).await.unwrap().id.unwrap();

        fake.clear_log();
        records.delete(id, false).await.unwrap();
        assert_eq!(
            fake.sql_log()[0],
            "UPDATE `u3c3` SET `is_deleted` = 1, `updated_at` = ? \
             WHERE `id` = ? AND (`is_deleted` = 0 OR `is_deleted` IS NULL)"
        );

        let err = records.get_by_id(id, true, None, None).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let row = records.get_by_id(id, false, None, None).await.unwrap();
        assert_eq!(row["is_deleted"], json!(1));
        assert!(store.raw(id).is_some());

        // Deleting again is a conflict, not a silent no-op
        let err = records.delete(id, false).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_hard_delete_removes_row() {
        let store = MemoryTable::new();
        let (engine, fake) = engine_over(store.clone());
        let records = engine.records(TableId::Crawler).unwrap();
        let id = records.create(&sample()).await.unwrap().id.unwrap();

        fake.clear_log();
        let result = records.delete(id, true).await.unwrap();
        assert_eq!(result.affected_rows, 1);
        assert_eq!(fake.sql_log()[0], "DELETE FROM `u3c3` WHERE `id` = ?");
        assert!(store.raw(id).is_none());

        let err = records.get_by_id(id, false, None, None).await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let (engine, _) = engine_over(MemoryTable::new());
        let records = engine.records(TableId::Crawler).unwrap();

        let err = records
            .update(99, &row(json!({ "title": "x" })), true)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "u3c3 not found: 99");
    }

    #[tokio::test]
    async fn test_update_refreshes_updated_at() {
        let store = MemoryTable::new();
        let (engine, fake) = engine_over(store.clone());
        let records = engine.records(TableId::Crawler).unwrap();
        let mut fields = sample();
        fields.insert("updated_at".into(), json!("2000-01-01 00:00:00"));
        let id = records.create(&fields).await.unwrap().id.unwrap();
        assert_eq!(store.raw(id).unwrap()["updated_at"], json!("2000-01-01 00:00:00"));

        fake.clear_log();
        records
            .update(id, &row(json!({ "title": "Ubuntu 24.04.1" })), true)
            .await
            .unwrap();

        assert_eq!(
            fake.sql_log()[0],
            "UPDATE `u3c3` SET `title` = ?, `updated_at` = ? \
             WHERE `id` = ? AND (`is_deleted` = 0 OR `is_deleted` IS NULL)"
        );
        let stored = store.raw(id).unwrap();
        assert_eq!(stored["title"], json!("Ubuntu 24.04.1"));
        assert_ne!(stored["updated_at"], json!("2000-01-01 00:00:00"));
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_sql() {
        let (engine, fake) = engine_over(MemoryTable::new());
        let records = engine.records(TableId::Crawler).unwrap();

        assert!(matches!(
            records.get_by_id(0, true, None, None).await,
            Err(DbError::Validation(ValidationError::InvalidId(_)))
        ));
        assert!(matches!(
            records.update(1, &Row::new(), true).await,
            Err(DbError::Validation(ValidationError::EmptyPayload { .. }))
        ));
        assert!(matches!(
            records.update(1, &row(json!({ "id": 5 })), true).await,
            Err(DbError::Validation(ValidationError::ReadOnlyColumn { .. }))
        ));
        assert!(matches!(
            records.create(&row(json!({ "nope": 1 }))).await,
            Err(DbError::Validation(ValidationError::UnknownColumn { .. }))
        ));

        let logs = engine.records(TableId::CrawlLog).unwrap();
        assert!(matches!(
            logs.delete(1, false).await,
            Err(DbError::Validation(ValidationError::Unsupported { .. }))
        ));
        assert!(fake.sql_log().is_empty());
    }

    #[tokio::test]
    async fn test_mutation_invalidates_cached_pages() {
        let store = MemoryTable::new();
        let (engine, fake) = engine_over(store);
        let records = engine.records(TableId::Crawler).unwrap();
        records.create(&sample()).await.unwrap();

        let params = QueryParams::new().item_type("software");
        let before = engine
            .query_with_pagination(TableId::Crawler, &params, None)
            .await
            .unwrap();
        assert_eq!(before.pagination.total_records, 1);

        // Cached: no statements on the repeat
        fake.clear_log();
        engine
            .query_with_pagination(TableId::Crawler, &params, None)
            .await
            .unwrap();
        assert!(fake.sql_log().is_empty());

        let mut second = sample();
        second.insert("title".into(), json!("Debian 12"));
        records.create(&second).await.unwrap();
        assert_eq!(engine.get_cache_stats().result_cache_size, 0);

        fake.clear_log();
        let after = engine
            .query_with_pagination(TableId::Crawler, &params, None)
            .await
            .unwrap();
        assert!(fake.sql_log()[0].starts_with("SELECT COUNT(*)"));
        assert_eq!(after.pagination.total_records, 2);
        assert_eq!(after.data.len(), 2);
    }

    #[tokio::test]
    async fn test_get_by_id_caches_only_with_ttl() {
        let store = MemoryTable::new();
        let (engine, fake) = engine_over(store);
        let records = engine.records(TableId::Crawler).unwrap();
        let id = records.create(&sample()).await.unwrap().id.unwrap();

        fake.clear_log();
        records.get_by_id(id, true, None, None).await.unwrap();
        records.get_by_id(id, true, None, None).await.unwrap();
        assert_eq!(fake.sql_log().len(), 2);

        fake.clear_log();
        let ttl = Some(Duration::from_secs(30));
        let projection = vec!["title".to_string()];
        records.get_by_id(id, true, Some(&projection), ttl).await.unwrap();
        records.get_by_id(id, true, Some(&projection), ttl).await.unwrap();
        let log = fake.sql_log();
        assert_eq!(log.len(), 1);
        assert_eq!(
            log[0],
            "SELECT `title` FROM `u3c3` WHERE `id` = ? AND (`is_deleted` = 0 OR `is_deleted` IS NULL) LIMIT 1"
        );
    }
}
