//! # Engine Configuration
//!
//! Everything the engine reads at construction time.
//!
//! ## Sources
//! ```text
//! harvest.toml ──► EngineConfig::from_file / from_toml_str
//! environment  ──► EngineConfig::from_env   (HARVEST_* variables)
//! neither      ──► EngineConfig::default()
//! ```
//!
//! ## Example (TOML)
//! ```toml
//! [pool]
//! host = "db.internal"
//! user = "crawler"
//! password = "secret"
//! max_connections = 30
//!
//! [cache]
//! result_ttl_secs = 120
//!
//! [planner]
//! deep_offset_threshold = 5000
//!
//! [sortable_overrides]
//! u3c3 = ["date", "id", "size"]
//! ```

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pool::PoolConfig;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub planner: PlannerSettings,

    /// Table name → columns allowed in ORDER BY. Replaces the built-in
    /// allow-list for that table.
    #[serde(default)]
    pub sortable_overrides: BTreeMap<String, Vec<String>>,
}

/// TTLs and capacities for the two caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Default: 300 seconds
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,

    /// Full-text pages expire sooner. Default: 60 seconds
    #[serde(default = "default_full_text_ttl")]
    pub full_text_ttl_secs: u64,

    /// Default: 600 seconds
    #[serde(default = "default_count_ttl")]
    pub count_ttl_secs: u64,

    /// Default: 60 seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Default: 1000
    #[serde(default = "default_result_max_entries")]
    pub result_max_entries: usize,

    /// Default: 5000
    #[serde(default = "default_count_max_entries")]
    pub count_max_entries: usize,
}

fn default_result_ttl() -> u64 {
    300
}

fn default_full_text_ttl() -> u64 {
    60
}

fn default_count_ttl() -> u64 {
    600
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_result_max_entries() -> usize {
    1000
}

fn default_count_max_entries() -> usize {
    5000
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            result_ttl_secs: default_result_ttl(),
            full_text_ttl_secs: default_full_text_ttl(),
            count_ttl_secs: default_count_ttl(),
            cleanup_interval_secs: default_cleanup_interval(),
            result_max_entries: default_result_max_entries(),
            count_max_entries: default_count_max_entries(),
        }
    }
}

impl CacheSettings {
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn full_text_ttl(&self) -> Duration {
        Duration::from_secs(self.full_text_ttl_secs)
    }

    pub fn count_ttl(&self) -> Duration {
        Duration::from_secs(self.count_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Knobs for pagination, timing and count estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Unfiltered offsets at or beyond this use cursor pagination.
    /// Default: 10,000 rows
    #[serde(default = "default_deep_offset_threshold")]
    pub deep_offset_threshold: u64,

    /// Requests at or above this are counted as slow.
    /// Default: 1000 ms
    #[serde(default = "default_slow_query_threshold")]
    pub slow_query_threshold_ms: u64,

    /// Per-statement timeout. Default: 30 seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Row count reported when every estimate fails.
    /// Default: 1,000,000
    #[serde(default = "default_fallback_row_estimate")]
    pub fallback_row_estimate: u64,
}

fn default_deep_offset_threshold() -> u64 {
    10_000
}

fn default_slow_query_threshold() -> u64 {
    1000
}

fn default_query_timeout() -> u64 {
    30
}

fn default_fallback_row_estimate() -> u64 {
    1_000_000
}

impl Default for PlannerSettings {
    fn default() -> Self {
        PlannerSettings {
            deep_offset_threshold: default_deep_offset_threshold(),
            slow_query_threshold_ms: default_slow_query_threshold(),
            query_timeout_secs: default_query_timeout(),
            fallback_row_estimate: default_fallback_row_estimate(),
        }
    }
}

impl PlannerSettings {
    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

// =============================================================================
// Loading
// =============================================================================

impl EngineConfig {
    /// Parses a TOML document. Missing sections and fields take defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable                     | Field                          |
    /// |------------------------------|--------------------------------|
    /// | `HARVEST_DATABASE_URL`       | `pool.url`                     |
    /// | `HARVEST_DB_HOST`            | `pool.host`                    |
    /// | `HARVEST_DB_PORT`            | `pool.port`                    |
    /// | `HARVEST_DB_USER`            | `pool.user`                    |
    /// | `HARVEST_DB_PASSWORD`        | `pool.password`                |
    /// | `HARVEST_DB_NAME`            | `pool.database`                |
    /// | `HARVEST_DB_MAX_CONNECTIONS` | `pool.max_connections`         |
    /// | `HARVEST_QUERY_TIMEOUT_SECS` | `planner.query_timeout_secs`   |
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = EngineConfig::default();

        if let Some(url) = lookup("HARVEST_DATABASE_URL") {
            config.pool.url = Some(url);
        }
        if let Some(host) = lookup("HARVEST_DB_HOST") {
            config.pool.host = host;
        }
        if let Some(port) = lookup("HARVEST_DB_PORT") {
            config.pool.port = parse_var("HARVEST_DB_PORT", &port)?;
        }
        if let Some(user) = lookup("HARVEST_DB_USER") {
            config.pool.user = user;
        }
        if let Some(password) = lookup("HARVEST_DB_PASSWORD") {
            config.pool.password = password;
        }
        if let Some(name) = lookup("HARVEST_DB_NAME") {
            config.pool.database = name;
        }
        if let Some(max) = lookup("HARVEST_DB_MAX_CONNECTIONS") {
            config.pool.max_connections = parse_var("HARVEST_DB_MAX_CONNECTIONS", &max)?;
        }
        if let Some(timeout) = lookup("HARVEST_QUERY_TIMEOUT_SECS") {
            config.planner.query_timeout_secs = parse_var("HARVEST_QUERY_TIMEOUT_SECS", &timeout)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_connections == 0 {
            return Err(ConfigError::InvalidValue("pool.max_connections".to_string()));
        }
        if self.pool.min_connections > self.pool.max_connections {
            return Err(ConfigError::InvalidValue("pool.min_connections".to_string()));
        }
        if self.planner.query_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "planner.query_timeout_secs".to_string(),
            ));
        }
        if self.cache.cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "cache.cleanup_interval_secs".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },
}

// =============================================================================
// Unit Tests
// =============================================================================
