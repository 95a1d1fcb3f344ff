//! Service configuration.
//!
//! Everything is read from the environment (after `.env` is loaded by the
//! binary). Backend endpoints are read by the backends' own `from_env`
//! constructors; this module collects the rest.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sift_core::{defaults, Error};
use sift_db::PoolConfig;
use sift_graph::GraphConfig;
use sift_jobs::{RetryPolicy, WorkerConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config(format!("unknown log format: {}", other))),
        }
    }
}

/// Logging configuration.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `LOG_FORMAT` | `text` | `text` or `json` |
/// | `LOG_FILE` | unset | Log to a daily-rotated file instead of stdout |
/// | `LOG_ANSI` | auto | Force ANSI colors on or off |
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub file: Option<PathBuf>,
    pub ansi: Option<bool>,
}

impl LogConfig {
    pub fn from_env() -> Self {
        let format = std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        let file = std::env::var("LOG_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let ansi = std::env::var("LOG_ANSI")
            .ok()
            .map(|v| v == "true" || v == "1");
        Self { format, file, ansi }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct SiftConfig {
    /// Postgres connection string. `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub pool: PoolConfig,
    pub worker: WorkerConfig,
    pub retry: RetryPolicy,
    pub graph: GraphConfig,
    /// How often every organization's topics are reclustered. Zero disables it.
    pub graph_rebuild_interval: Duration,
    pub log: LogConfig,
}

impl Default for SiftConfig {
    fn default() -> Self {
        let worker = WorkerConfig::default();
        Self {
            database_url: None,
            pool: PoolConfig::for_concurrency(pool_runs(&worker)),
            worker,
            retry: RetryPolicy::default(),
            graph: GraphConfig::default(),
            graph_rebuild_interval: Duration::from_secs(defaults::GRAPH_REBUILD_INTERVAL_SECS),
            log: LogConfig::default(),
        }
    }
}

impl SiftConfig {
    /// Read configuration from the environment.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DATABASE_URL` | unset | Postgres URL |
    /// | `DATABASE_MAX_CONNECTIONS` | sized from concurrency | Pool size |
    /// | `GRAPH_REBUILD_INTERVAL_SECS` | `3600` | Topic rebuild period |
    ///
    /// Worker, retry and graph settings are read by their own `from_env`.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let graph_rebuild_interval = std::env::var("GRAPH_REBUILD_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(defaults::GRAPH_REBUILD_INTERVAL_SECS));

        let worker = WorkerConfig::from_env();
        Self {
            database_url,
            pool: PoolConfig::from_env(pool_runs(&worker)),
            worker,
            retry: RetryPolicy::from_env(),
            graph: GraphConfig::from_env(),
            graph_rebuild_interval,
            log: LogConfig::from_env(),
        }
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Ignore any configured database and use the in-memory store.
    pub fn in_memory(mut self) -> Self {
        self.database_url = None;
        self
    }

    /// Also resizes the pool to the new concurrency.
    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.pool = PoolConfig::for_concurrency(pool_runs(&worker));
        self.worker = worker;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_graph(mut self, graph: GraphConfig) -> Self {
        self.graph = graph;
        self
    }

    pub fn with_graph_rebuild_interval(mut self, interval: Duration) -> Self {
        self.graph_rebuild_interval = interval;
        self
    }
}

/// Batch triggers and worker jobs can run pipelines at the same time.
fn pool_runs(worker: &WorkerConfig) -> usize {
    defaults::BATCH_CONCURRENCY + worker.max_concurrent_jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" Text ".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = SiftConfig::default();
        assert!(config.database_url.is_none());
        assert_eq!(config.graph_rebuild_interval, Duration::from_secs(3600));
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn test_builders() {
        let config = SiftConfig::default()
            .with_database_url("postgres://localhost/sift")
            .with_graph_rebuild_interval(Duration::ZERO);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/sift")
        );
        assert!(config.graph_rebuild_interval.is_zero());
        assert!(config.in_memory().database_url.is_none());
    }

    #[test]
    fn test_pool_follows_worker_concurrency() {
        let worker = |n| WorkerConfig::default().with_max_concurrent(n);
        let small = SiftConfig::default().with_worker(worker(1));
        let large = SiftConfig::default().with_worker(worker(8));
        assert_eq!(large.pool.max_connections - small.pool.max_connections, 7);
    }
}
