//! Test-only executors.
//!
//! [`FakeExecutor`] answers each statement with a scripted closure and keeps
//! every statement it saw, so tests can assert on query shape.
//! [`MemoryTable`] is a scripted answer that understands the handful of
//! statements the record repository emits.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use harvest_core::{Row, SqlValue, Statement};

use crate::error::{DbError, DbResult};
use crate::executor::{ExecOutcome, SqlExecutor};

/// What the fake returns for one statement.
pub(crate) enum Reply {
    Rows(Vec<Row>),
    Exec(ExecOutcome),
    Fail(DbError),
}

type Handler = Box<dyn Fn(&Statement) -> Reply + Send + Sync>;

pub(crate) struct FakeExecutor {
    handler: Handler,
    log: Mutex<Vec<Statement>>,
}

impl FakeExecutor {
    pub(crate) fn new(handler: impl Fn(&Statement) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(FakeExecutor {
            handler: Box::new(handler),
            log: Mutex::new(Vec::new()),
        })
    }

    /// Every statement seen so far, oldest first.
    pub(crate) fn statements(&self) -> Vec<Statement> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn sql_log(&self) -> Vec<String> {
        self.statements().into_iter().map(|s| s.sql).collect()
    }

    pub(crate) fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    fn reply(&self, statement: &Statement) -> Reply {
        self.log.lock().unwrap().push(statement.clone());
        (self.handler)(statement)
    }
}

#[async_trait]
impl SqlExecutor for FakeExecutor {
    async fn fetch_all(&self, statement: &Statement) -> DbResult<Vec<Row>> {
        match self.reply(statement) {
            Reply::Rows(rows) => Ok(rows),
            Reply::Exec(_) => Ok(Vec::new()),
            Reply::Fail(err) => Err(err),
        }
    }

    async fn execute(&self, statement: &Statement) -> DbResult<ExecOutcome> {
        match self.reply(statement) {
            Reply::Exec(outcome) => Ok(outcome),
            Reply::Rows(_) => Ok(ExecOutcome::default()),
            Reply::Fail(err) => Err(err),
        }
    }

    async fn close(&self) {}
}

/// Builds a row from a JSON object literal.
pub(crate) fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

pub(crate) fn total(n: u64) -> Reply {
    Reply::Rows(vec![row(json!({ "total": n }))])
}

fn to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Int(v) => json!(v),
        SqlValue::UInt(v) => json!(v),
        SqlValue::Float(v) => json!(v),
        SqlValue::Bool(v) => json!(v),
        SqlValue::Text(v) => json!(v),
    }
}

fn id_of(value: &SqlValue) -> u64 {
    match value {
        SqlValue::Int(v) => *v as u64,
        SqlValue::UInt(v) => *v,
        _ => 0,
    }
}

fn unquote(ident: &str) -> String {
    ident.trim().trim_matches('`').to_string()
}

fn is_live(row: &Row) -> bool {
    match row.get("is_deleted") {
        None | Some(Value::Null) => true,
        Some(v) => v.as_i64() == Some(0) || v.as_bool() == Some(false),
    }
}

// =============================================================================
// In-memory table
// =============================================================================

/// A single table held in memory.
#[derive(Default)]
pub(crate) struct MemoryTable {
    rows: Mutex<BTreeMap<u64, Row>>,
}

impl MemoryTable {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(MemoryTable::default())
    }

    pub(crate) fn raw(&self, id: u64) -> Option<Row> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub(crate) fn handle(&self, stmt: &Statement) -> Reply {
        let sql = stmt.sql.as_str();
        let guarded = sql.contains("IS NULL");
        let mut rows = self.rows.lock().unwrap();

        if sql.starts_with("INSERT INTO") {
            let (Some(open), Some(close)) = (sql.find('('), sql.find(')')) else {
                return Reply::Fail(DbError::QueryFailed(sql.to_string()));
            };
            let mut record = Row::new();
            for (column, value) in sql[open + 1..close].split(',').zip(&stmt.params) {
                record.insert(unquote(column), to_json(value));
            }
            let id = rows.keys().next_back().copied().unwrap_or(0) + 1;
            record.insert("id".to_string(), json!(id));
            rows.insert(id, record);
            return Reply::Exec(ExecOutcome {
                rows_affected: 1,
                last_insert_id: id,
            });
        }

        if sql.starts_with("UPDATE") {
            let (Some(set), Some(wh)) = (sql.find(" SET "), sql.find(" WHERE ")) else {
                return Reply::Fail(DbError::QueryFailed(sql.to_string()));
            };
            let mut params = stmt.params.iter();
            let mut changes = Vec::new();
            for assignment in sql[set + 5..wh].split(", ") {
                let (column, value) = assignment.split_once(" = ").unwrap_or((assignment, "?"));
                let value = match value.trim() {
                    "?" => params.next().map(to_json).unwrap_or(Value::Null),
                    literal => literal.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
                };
                changes.push((unquote(column), value));
            }
            let id = params.next().map(id_of).unwrap_or(0);
            let affected = match rows.get_mut(&id) {
                Some(record) if !guarded || is_live(record) => {
                    for (column, value) in changes {
                        record.insert(column, value);
                    }
                    1
                }
                _ => 0,
            };
            return Reply::Exec(ExecOutcome {
                rows_affected: affected,
                last_insert_id: 0,
            });
        }

        if sql.starts_with("DELETE") {
            let id = stmt.params.first().map(id_of).unwrap_or(0);
            let affected = rows.remove(&id).map_or(0, |_| 1);
            return Reply::Exec(ExecOutcome {
                rows_affected: affected,
                last_insert_id: 0,
            });
        }

        let live: Vec<&Row> = rows
            .values()
            .filter(|r| !guarded || is_live(r))
            .collect();

        if sql.starts_with("SELECT COUNT(*)") {
            return total(live.len() as u64);
        }

        if sql.contains("WHERE `id` = ?") {
            let id = stmt.params.first().map(id_of).unwrap_or(0);
            let found = rows
                .get(&id)
                .filter(|r| !guarded || is_live(r))
                .cloned()
                .into_iter()
                .collect();
            return Reply::Rows(found);
        }

        Reply::Rows(live.into_iter().rev().cloned().collect())
    }
}
