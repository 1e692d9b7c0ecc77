//! # Database Pool Management
//!
//! Lazily created MySQL connection pool and the production
//! [`SqlExecutor`].
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Process startup                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  MySqlExecutor::new(PoolConfig) ← no connection yet                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  first statement ──► OnceCell::get_or_try_init ──► MySqlPool           │
//! │  (concurrent first callers wait on the same initialization)            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            MySqlPool                     │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       │ each statement borrows one connection and returns it           │
//! │       ▼                                                                 │
//! │  Request 1 ──► Conn1     Request 2 ──► Conn2     ...                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, MySql, MySqlPool, Row as _};
use tokio::sync::OnceCell;
use tracing::{debug, info, trace};

use harvest_core::{Row, SqlValue, Statement};

use crate::error::{DbError, DbResult};
use crate::executor::{ExecOutcome, SqlExecutor};
use crate::migrations;

// =============================================================================
// Configuration
// =============================================================================

/// Connection pool configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = PoolConfig::new("db.internal", "crawler", "secret", "harvest")
///     .max_connections(30)
///     .timezone("+08:00");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Full `mysql://` URL. Takes precedence over the discrete fields.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_database")]
    pub database: String,

    /// Default: utf8mb4 (titles are mostly CJK)
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Session time zone, e.g. `+08:00`.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Maximum number of connections in the pool.
    /// Default: 20 (read-heavy listing traffic)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 2
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long a statement waits for a free connection.
    /// Default: 30 seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Whether to run the embedded migrations when the pool is created.
    /// Default: false (the crawler writes these tables, not us)
    #[serde(default)]
    pub run_migrations: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_user() -> String {
    "root".to_string()
}

fn default_database() -> String {
    "harvest".to_string()
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

fn default_timezone() -> String {
    "+08:00".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            url: None,
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
            charset: default_charset(),
            timezone: default_timezone(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: false,
        }
    }
}

impl PoolConfig {
    /// Creates a configuration from discrete connection parameters.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        PoolConfig {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    /// Creates a configuration from a `mysql://` URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        PoolConfig {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the session time zone.
    pub fn timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    fn connect_options(&self) -> DbResult<MySqlConnectOptions> {
        let base = match &self.url {
            Some(url) => MySqlConnectOptions::from_str(url)
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?,
            None => MySqlConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .username(&self.user)
                .password(&self.password)
                .database(&self.database),
        };

        Ok(base
            .charset(&self.charset)
            .timezone(Some(self.timezone.clone())))
    }
}

// =============================================================================
// MySQL Executor
// =============================================================================

/// Production [`SqlExecutor`] over a lazily created [`MySqlPool`].
#[derive(Debug)]
pub struct MySqlExecutor {
    config: PoolConfig,
    pool: OnceCell<MySqlPool>,
}

impl MySqlExecutor {
    /// Creates the executor. No connection is opened until the first
    /// statement runs.
    pub fn new(config: PoolConfig) -> Self {
        MySqlExecutor {
            config,
            pool: OnceCell::new(),
        }
    }

    /// Returns the pool, creating it on first use.
    ///
    /// ## What This Does
    /// 1. Builds connect options (charset, session time zone)
    /// 2. Creates the pool sized by `max_connections`
    /// 3. Runs migrations (if enabled)
    ///
    /// Only one caller performs the initialization; the rest await it.
    /// A failed initialization is not memoized, so the next caller retries.
    pub async fn pool(&self) -> DbResult<&MySqlPool> {
        self.pool
            .get_or_try_init(|| async {
                info!(
                    host = %self.config.host,
                    database = %self.config.database,
                    "Initializing database connection pool"
                );

                let options = self.config.connect_options()?;
                let pool = MySqlPoolOptions::new()
                    .max_connections(self.config.max_connections)
                    .min_connections(self.config.min_connections)
                    .acquire_timeout(Duration::from_secs(self.config.acquire_timeout_secs))
                    .idle_timeout(Some(Duration::from_secs(self.config.idle_timeout_secs)))
                    .connect_with(options)
                    .await
                    .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

                info!(
                    max_connections = self.config.max_connections,
                    "Database pool created"
                );

                if self.config.run_migrations {
                    migrations::run_migrations(&pool).await?;
                }

                Ok(pool)
            })
            .await
    }

    /// Whether the pool has been created yet.
    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }
}

#[async_trait]
impl SqlExecutor for MySqlExecutor {
    async fn fetch_all(&self, statement: &Statement) -> DbResult<Vec<Row>> {
        let pool = self.pool().await?;
        trace!(sql = %statement.sql, params = statement.params.len(), "fetch_all");

        let rows = bind_params(sqlx::query(&statement.sql), &statement.params)
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&self, statement: &Statement) -> DbResult<ExecOutcome> {
        let pool = self.pool().await?;
        trace!(sql = %statement.sql, params = statement.params.len(), "execute");

        let result = bind_params(sqlx::query(&statement.sql), &statement.params)
            .execute(pool)
            .await?;

        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_id(),
        })
    }

    async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            info!("Closing database connection pool");
            pool.close().await;
        }
    }
}

fn bind_params<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::UInt(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
        };
    }
    query
}

// =============================================================================
// Row Decoding
// =============================================================================

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Decodes a row without a static schema.
fn decode_row(row: &MySqlRow) -> Row {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), decode_value(row, idx));
    }
    out
}

/// Tries each supported Rust type in turn. `try_get` rejects a type whose
/// SQL type is incompatible, so the first success is the right one; NULL
/// decodes as `None` on the first attempt.
fn decode_value(row: &MySqlRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
        return v
            .map(|d| Value::from(d.format(DATETIME_FORMAT).to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
        return v
            .map(|d| Value::from(d.format(DATETIME_FORMAT).to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(idx) {
        return v
            .map(|d| Value::from(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v
            .map(|bytes| Value::from(String::from_utf8_lossy(&bytes).into_owned()))
            .unwrap_or(Value::Null);
    }

    debug!(column = idx, "Unsupported column type, returning null");
    Value::Null
}

// =============================================================================
// Unit Tests
// =============================================================================
