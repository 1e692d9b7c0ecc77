//! # harvest-db: Query/Cache Engine for the Crawler Tables
//!
//! Runs paginated listing and row-level operations against the MySQL
//! crawler tables, with result and count caching in front of them.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Harvest Data Flow                                │
//! │                                                                         │
//! │  HTTP handler (list / get / create / update / delete)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   harvest-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  QueryEngine  │    │    Caches     │    │    Count     │  │   │
//! │  │   │  (engine.rs)  │───►│  (cache.rs)   │    │  Estimator   │  │   │
//! │  │   │               │    │ result, count │    │  (count.rs)  │  │   │
//! │  │   │ RecordRepo    │    │ + sweeper     │    │              │  │   │
//! │  │   └───────┬───────┘    └───────────────┘    └──────────────┘  │   │
//! │  │           │                                                     │   │
//! │  │           ▼                                                     │   │
//! │  │   TimedExecutor ──► SqlExecutor ──► MySqlExecutor (pool.rs)     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     MySQL (u3c3, crawl_log)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - `QueryEngine`: listing, cache management, lifecycle
//! - [`repository`] - create / update / delete / get-by-id
//! - [`cache`] - TTL caches and the cleanup task
//! - [`count`] - exact counts and the estimate chain
//! - [`pool`] - lazily created MySQL pool
//! - [`executor`] - the statement execution seam and timeouts
//! - [`stats`] - performance counters and fallback events
//! - [`config`] - engine configuration (TOML, environment)
//! - [`migrations`] - embedded schema for development databases
//! - [`error`] - database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use harvest_core::{QueryParams, TableId};
//! use harvest_db::{EngineConfig, QueryEngine};
//!
//! let engine = QueryEngine::connect(EngineConfig::from_env()?).await?;
//!
//! let page = engine
//!     .query_with_pagination(TableId::Crawler, &QueryParams::new().title("ubuntu"), None)
//!     .await?;
//!
//! let row = engine.records(TableId::Crawler)?.get_by_id(42, true, None, None).await?;
//!
//! engine.close().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod config;
pub mod count;
pub mod engine;
pub mod error;
pub mod executor;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod stats;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{CacheSettings, ConfigError, EngineConfig, PlannerSettings};
pub use engine::{CachedResult, QueryEngine};
pub use error::{DbError, DbResult};
pub use executor::{ExecOutcome, SqlExecutor, TimedExecutor};
pub use pool::{MySqlExecutor, PoolConfig};
pub use repository::RecordRepository;
pub use stats::{CacheStats, FallbackEvent, StatsSnapshot};
