//! Postgres pool sizing and creation.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use sift_core::{defaults, Error, Result};

/// Connections kept for the job queue and status reads on top of pipeline runs.
const RESERVED_CONNECTIONS: u32 = 4;

/// Pool sizing.
///
/// Every concurrent pipeline run holds at most one connection at a time, so
/// the pool is sized from the trigger and worker concurrency rather than a
/// fixed number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::for_concurrency(defaults::BATCH_CONCURRENCY)
    }
}

impl PoolConfig {
    /// Enough connections for `concurrent_runs` pipelines plus the job queue.
    pub fn for_concurrency(concurrent_runs: usize) -> Self {
        let runs = u32::try_from(concurrent_runs).unwrap_or(u32::MAX);
        Self {
            max_connections: runs.saturating_add(RESERVED_CONNECTIONS),
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }

    /// [`PoolConfig::for_concurrency`] overridden by `DATABASE_MAX_CONNECTIONS`
    /// and `DATABASE_ACQUIRE_TIMEOUT_SECS`.
    pub fn from_env(concurrent_runs: usize) -> Self {
        let mut config = Self::for_concurrency(concurrent_runs);
        if let Some(n) = env_parse::<u32>("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = n.max(1);
        }
        if let Some(secs) = env_parse::<u64>("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n.max(1);
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Connect with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}
