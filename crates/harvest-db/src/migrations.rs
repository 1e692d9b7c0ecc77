//! # Database Migrations
//!
//! Embedded schema for development databases and live tests.
//!
//! The crawler tables are owned by the crawler, not by this engine, so
//! migrations only run when [`PoolConfig::run_migrations`] is set or when
//! the `seed` binary prepares a fresh database.
//!
//! [`PoolConfig::run_migrations`]: crate::pool::PoolConfig::run_migrations
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/mysql/` with the next sequence number
//! 2. Name format: `NNN_description.sql`
//! 3. Write idempotent SQL (use `IF NOT EXISTS` where possible)
//! 4. **NEVER** modify existing migrations - always add new ones

use sqlx::MySqlPool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the `migrations/mysql` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/mysql");

/// Runs all pending database migrations.
///
/// ## Safety
/// - Idempotent: safe to run multiple times
/// - Ordered: migrations run in filename order (001, 002, ...)
pub async fn run_migrations(pool: &MySqlPool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}
