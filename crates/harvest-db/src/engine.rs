//! # Query Engine
//!
//! One instance per process. Owns the executor, both caches, the counters
//! and the cleanup task, and is shared by handle with request handlers.
//!
//! ## Request Flow (`query_with_pagination`)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  QueryParams ──► normalize ──► result cache key                        │
//! │                                     │                                   │
//! │                         hit ◄───────┤                                   │
//! │                          │          │ miss                              │
//! │                          │          ▼                                   │
//! │                          │   plan_search + build_where                  │
//! │                          │          │                                   │
//! │                          │          ▼                                   │
//! │                          │   count cache ──miss──► CountEstimator       │
//! │                          │          │                                   │
//! │                          │          ▼                                   │
//! │                          │   offset >= total ? ──yes──► empty page      │
//! │                          │          │ no                                │
//! │                          │          ▼                                   │
//! │                          │   plan_page ──► probe/seek or one SELECT     │
//! │                          │          │                                   │
//! │                          │          ▼                                   │
//! │                          │   store (60s full-text / 300s otherwise)     │
//! │                          ▼          ▼                                   │
//! │                     PaginatedResult<Row>                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Staleness
//! Mutations clear both caches wholesale after the write commits. A read
//! that started before the clear can still store its (older) page, so a
//! reader may see pre-write data until that entry's TTL expires.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use harvest_core::{
    build_where, plan_page, plan_search, NormalizedQuery, PagePlan, PageQuery, PaginatedResult,
    Pagination, QueryParams, Row, SqlValue, TableDescriptor, TableId, TableRegistry, WhereClause,
};

use crate::cache::{CacheSweeper, Sweep, TtlCache};
use crate::config::EngineConfig;
use crate::count::{CountEstimator, CountResolution};
use crate::error::DbResult;
use crate::executor::{SqlExecutor, TimedExecutor};
use crate::pool::MySqlExecutor;
use crate::repository::RecordRepository;
use crate::stats::{CacheStats, FallbackEvent, PerformanceStats};

/// What the result cache holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CachedResult {
    Page(PaginatedResult<Row>),
    Record(Row),
}

/// The adaptive query/cache engine.
///
/// ## Usage
/// ```rust,ignore
/// let engine = QueryEngine::connect(EngineConfig::from_env()?).await?;
///
/// let page = engine
///     .query_with_pagination(TableId::Crawler, &QueryParams::new().title("ubuntu"), None)
///     .await?;
///
/// engine.close().await;
/// ```
pub struct QueryEngine {
    config: EngineConfig,
    registry: TableRegistry,
    executor: TimedExecutor,
    result_cache: Arc<TtlCache<CachedResult>>,
    count_cache: Arc<TtlCache<CountResolution>>,
    stats: Arc<PerformanceStats>,
    sweeper: CacheSweeper,
}

impl QueryEngine {
    /// Builds an engine over MySQL. No connection is opened until the
    /// first statement runs, and the cleanup task is not started.
    pub fn new(config: EngineConfig) -> DbResult<Self> {
        let executor: Arc<dyn SqlExecutor> = Arc::new(MySqlExecutor::new(config.pool.clone()));
        Self::with_executor(executor, config)
    }

    /// Builds an engine over MySQL and starts the cache cleanup task.
    pub async fn connect(config: EngineConfig) -> DbResult<Self> {
        let engine = Self::new(config)?;
        engine.start_cleanup();
        Ok(engine)
    }

    /// Builds an engine over any executor.
    pub fn with_executor(executor: Arc<dyn SqlExecutor>, config: EngineConfig) -> DbResult<Self> {
        config.validate()?;
        let registry = TableRegistry::new().with_sortable_overrides(&config.sortable_overrides)?;

        let stats = Arc::new(PerformanceStats::new());
        let result_cache = Arc::new(TtlCache::new(
            "result",
            config.cache.result_max_entries,
            stats.clone(),
        ));
        let count_cache = Arc::new(TtlCache::new(
            "count",
            config.cache.count_max_entries,
            stats.clone(),
        ));

        let sweepable: Vec<Arc<dyn Sweep>> = vec![result_cache.clone(), count_cache.clone()];
        let sweeper = CacheSweeper::new(sweepable, config.cache.cleanup_interval());

        Ok(QueryEngine {
            executor: TimedExecutor::new(executor, config.planner.query_timeout()),
            registry,
            result_cache,
            count_cache,
            stats,
            sweeper,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    /// Starts the periodic cache sweep. Idempotent; must be called from
    /// within a tokio runtime.
    pub fn start_cleanup(&self) -> bool {
        self.sweeper.start()
    }

    pub async fn stop_cleanup(&self) {
        self.sweeper.stop().await;
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Returns one page of `table`.
    ///
    /// `projection` limits the returned columns; every name must be a column
    /// of the table. Driver failures, timeouts and validation errors are
    /// returned; cache and estimator problems are not.
    pub async fn query_with_pagination(
        &self,
        table: TableId,
        params: &QueryParams,
        projection: Option<&[String]>,
    ) -> DbResult<PaginatedResult<Row>> {
        let span = info_span!("query", request_id = %Uuid::new_v4(), table = %table);
        let started = Instant::now();

        let result = self.run_query(table, params, projection).instrument(span.clone()).await;

        let elapsed = started.elapsed();
        let slow = self
            .stats
            .record_query(elapsed, self.config.planner.slow_query_threshold());
        span.in_scope(|| {
            if slow {
                warn!(elapsed_ms = elapsed.as_millis() as u64, "Slow query");
            }
            if let Err(e) = &result {
                warn!(error = %e, "Query failed");
            }
        });

        result
    }

    async fn run_query(
        &self,
        table: TableId,
        params: &QueryParams,
        projection: Option<&[String]>,
    ) -> DbResult<PaginatedResult<Row>> {
        let descriptor = self.registry.get(table)?;
        let select_list = descriptor.select_list(projection)?;
        let query = params.normalize(descriptor);
        if let Some(requested) = params.sort_by.as_deref().map(str::trim) {
            if !requested.is_empty() && requested != query.sort_by {
                debug!(requested, used = %query.sort_by, "Sort column not allowed, using default");
            }
        }

        let key = result_key(table, &query, projection);
        if let Some(CachedResult::Page(page)) = key.as_deref().and_then(|k| self.result_cache.get(k)) {
            debug!(rows = page.data.len(), "Result cache hit");
            return Ok(page);
        }

        let search = plan_search(query.title.as_deref(), descriptor);
        let filter = build_where(descriptor, &query, &search);
        debug!(
            strategy = ?search.strategy,
            conditions = filter.has_conditions(),
            "Search planned"
        );

        let count_started = Instant::now();
        let count = self.resolve_count(table, descriptor, &query, &filter).await?;
        debug!(
            total = count.total,
            accuracy = ?count.accuracy,
            elapsed_ms = count_started.elapsed().as_millis() as u64,
            "Count resolved"
        );

        let pagination = Pagination::new(count.total, query.page, query.page_size, count.accuracy);
        let offset = query.offset();

        let result = if count.total > 0 && offset >= count.total {
            debug!(offset, total = count.total, "Offset past end, returning empty page");
            PaginatedResult::empty(pagination)
        } else {
            let plan = plan_page(
                descriptor,
                &query,
                filter.has_conditions(),
                search.uses_full_text(),
                self.config.planner.deep_offset_threshold,
            );
            let page_query = PageQuery {
                table: descriptor,
                query: &query,
                select_list: &select_list,
                filter: &filter,
                search: &search,
            };

            let fetch_started = Instant::now();
            let data = self.fetch_page(&page_query, &plan).await?;
            debug!(
                plan = plan.name(),
                rows = data.len(),
                elapsed_ms = fetch_started.elapsed().as_millis() as u64,
                "Page fetched"
            );
            PaginatedResult { data, pagination }
        };

        if let Some(key) = key {
            if count.is_cacheable() {
                let ttl = if search.uses_full_text() {
                    self.config.cache.full_text_ttl()
                } else {
                    self.config.cache.result_ttl()
                };
                self.result_cache
                    .set(key, CachedResult::Page(result.clone()), ttl);
            }
        }

        Ok(result)
    }

    async fn resolve_count(
        &self,
        table: TableId,
        descriptor: &TableDescriptor,
        query: &NormalizedQuery,
        filter: &WhereClause,
    ) -> DbResult<CountResolution> {
        let key = format!("{}|{}", table, query.filter_signature());
        if let Some(count) = self.count_cache.get(&key) {
            return Ok(count);
        }

        let (count, event) =
            CountEstimator::new(&self.executor, self.config.planner.fallback_row_estimate)
                .resolve(descriptor, filter)
                .await?;

        if let Some(event) = event {
            event.report(&self.stats);
        }
        if count.is_cacheable() {
            self.count_cache
                .set(key, count, self.config.cache.count_ttl());
        }
        Ok(count)
    }

    /// Runs the plan. A cursor plan probes for the boundary row first and
    /// drops back to plain OFFSET when the probe comes back empty.
    async fn fetch_page(&self, page: &PageQuery<'_>, plan: &PagePlan) -> DbResult<Vec<Row>> {
        let PagePlan::Cursor { offset, limit } = *plan else {
            return self.executor.fetch_all(&page.render(plan)).await;
        };

        let boundary = self.executor.fetch_optional(&page.probe(offset)).await?;
        let bounds = boundary.as_ref().and_then(|row| {
            let date = row.get(page.table.date_column).filter(|v| !v.is_null())?;
            let id = row.get(page.table.primary_key).filter(|v| !v.is_null())?;
            Some((SqlValue::from_json(date), SqlValue::from_json(id)))
        });

        match bounds {
            Some((date, id)) => self.executor.fetch_all(&page.seek(date, id, limit)).await,
            None => {
                FallbackEvent::CursorProbeMiss {
                    table: page.table.name(),
                    offset,
                }
                .report(&self.stats);
                self.executor.fetch_all(&page.render(plan)).await
            }
        }
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Create/update/delete/get for one table.
    pub fn records(&self, table: TableId) -> DbResult<RecordRepository<'_>> {
        Ok(RecordRepository::new(self, self.registry.get(table)?))
    }

    pub(crate) fn executor(&self) -> &TimedExecutor {
        &self.executor
    }

    pub(crate) fn result_cache(&self) -> &TtlCache<CachedResult> {
        &self.result_cache
    }

    // =========================================================================
    // Cache Management & Lifecycle
    // =========================================================================

    /// Drops every cached page, record and count.
    pub fn clear_cache(&self) {
        self.result_cache.clear();
        self.count_cache.clear();
        debug!("Caches cleared");
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        CacheStats {
            result_cache_size: self.result_cache.len(),
            count_cache_size: self.count_cache.len(),
            stats: self.stats.snapshot(),
        }
    }

    /// Multi-line human-readable report.
    pub fn performance_report(&self) -> String {
        self.get_cache_stats().to_string()
    }

    pub fn print_performance_report(&self) {
        info!("\n{}", self.performance_report());
    }

    pub async fn health_check(&self) -> bool {
        self.executor.health_check().await
    }

    /// Stops the sweep, closes the pool and empties the caches. Call on
    /// shutdown.
    pub async fn close(&self) {
        info!("Shutting down query engine");
        self.sweeper.stop().await;
        self.executor.close().await;
        self.clear_cache();
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("executor", &self.executor)
            .field("result_cache", &self.result_cache.len())
            .field("count_cache", &self.count_cache.len())
            .field("sweeper", &self.sweeper)
            .finish()
    }
}

/// `table|normalized query|projection`. `None` when the key cannot be
/// built, which only disables caching for the request.
fn result_key(table: TableId, query: &NormalizedQuery, projection: Option<&[String]>) -> Option<String> {
    match (serde_json::to_string(query), serde_json::to_string(&projection)) {
        (Ok(q), Ok(p)) => Some(format!("{}|{}|{}", table, q, p)),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Could not build cache key");
            None
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
