//! # sift-db
//!
//! Storage layer for sift.
//!
//! This crate provides:
//! - Connection pool management
//! - PostgreSQL repositories for content items, action items, decisions, topics and jobs
//! - The pgvector-backed embedding index
//! - An in-memory store implementing every repository trait
//! - Sentence-window transcript chunking
//!
//! ## Example
//!
//! ```rust,ignore
//! use sift_db::{Database, Stores};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/sift").await?;
//!     let stores = Stores::from_database(&db);
//!     let pending = stores.jobs.pending_count().await?;
//!     println!("{} pending jobs", pending);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::Notify;

pub mod action_items;
pub mod chunking;
pub mod decisions;
pub mod embeddings;
pub mod items;
pub mod jobs;
pub mod memory;
pub mod pool;
pub mod test_fixtures;
pub mod topics;

// Re-export core types
pub use sift_core::*;

pub use action_items::PgActionItemRepository;
pub use chunking::{Chunk, Chunker, ChunkerConfig, SentenceWindowChunker};
pub use decisions::PgDecisionRepository;
pub use embeddings::PgEmbeddingIndex;
pub use items::PgContentItemRepository;
pub use jobs::PgJobRepository;
pub use memory::MemoryStore;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use topics::{PgOrgSettingsRepository, PgTopicRepository};

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub items: PgContentItemRepository,
    pub action_items: PgActionItemRepository,
    /// Vector storage for transcript chunks and decisions.
    pub embeddings: PgEmbeddingIndex,
    pub decisions: PgDecisionRepository,
    pub topics: PgTopicRepository,
    pub settings: PgOrgSettingsRepository,
    /// Job repository for background processing.
    pub jobs: PgJobRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            items: PgContentItemRepository::new(pool.clone()),
            action_items: PgActionItemRepository::new(pool.clone()),
            embeddings: PgEmbeddingIndex::new(pool.clone()),
            decisions: PgDecisionRepository::new(pool.clone()),
            topics: PgTopicRepository::new(pool.clone()),
            settings: PgOrgSettingsRepository::new(pool.clone()),
            jobs: PgJobRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        let mut db = Self::new(self.pool.clone());
        // Queued jobs must keep waking the same worker.
        db.jobs = PgJobRepository::with_notify(self.pool.clone(), self.jobs.job_notify());
        db
    }
}

/// Trait-object handles to every repository, independent of the backend.
#[derive(Clone)]
pub struct Stores {
    pub items: Arc<dyn ContentItemRepository>,
    pub action_items: Arc<dyn ActionItemRepository>,
    pub embeddings: Arc<dyn EmbeddingIndex>,
    pub decisions: Arc<dyn DecisionRepository>,
    pub topics: Arc<dyn TopicRepository>,
    pub settings: Arc<dyn OrgSettingsRepository>,
    pub jobs: Arc<dyn JobRepository>,
    /// Signalled whenever a job is queued.
    pub job_notify: Arc<Notify>,
}

impl Stores {
    /// PostgreSQL-backed stores sharing one pool.
    pub fn from_database(db: &Database) -> Self {
        let pool = db.pool.clone();
        let notify = db.jobs.job_notify();
        Self {
            items: Arc::new(PgContentItemRepository::new(pool.clone())),
            action_items: Arc::new(PgActionItemRepository::new(pool.clone())),
            embeddings: Arc::new(PgEmbeddingIndex::new(pool.clone())),
            decisions: Arc::new(PgDecisionRepository::new(pool.clone())),
            topics: Arc::new(PgTopicRepository::new(pool.clone())),
            settings: Arc::new(PgOrgSettingsRepository::new(pool.clone())),
            jobs: Arc::new(PgJobRepository::with_notify(pool, notify.clone())),
            job_notify: notify,
        }
    }

    /// Stores backed by a single shared [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::from_memory(MemoryStore::new())
    }

    pub fn from_memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            items: store.clone(),
            action_items: store.clone(),
            embeddings: store.clone(),
            decisions: store.clone(),
            topics: store.clone(),
            settings: store.clone(),
            job_notify: store.job_notify(),
            jobs: store,
        }
    }
}
