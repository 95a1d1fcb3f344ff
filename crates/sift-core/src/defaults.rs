//! Centralized default constants for the sift pipeline.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration structs fall back to these when the matching environment
//! variable is unset.

// =============================================================================
// CHUNKING
// =============================================================================

/// Target characters per transcript chunk.
pub const CHUNK_SIZE: usize = 1000;

/// Minimum characters per chunk (smaller trailing chunks are merged).
pub const CHUNK_MIN_SIZE: usize = 100;

/// Characters of trailing sentences carried into the next chunk.
pub const CHUNK_OVERLAP: usize = 100;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Chunks sent to the embedding backend per request.
pub const EMBED_BATCH_SIZE: usize = 16;

/// Maximum in-flight calls when fanning out over a batch.
pub const BATCH_CONCURRENCY: usize = 10;

// =============================================================================
// SEARCH
// =============================================================================

/// Default cosine similarity lower bound for semantic search.
pub const SEARCH_THRESHOLD: f32 = 0.5;

/// Default number of search hits.
pub const SEARCH_LIMIT: usize = 20;

/// Characters of source text kept in a search snippet.
pub const SNIPPET_LENGTH: usize = 200;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model.
pub const GEN_MODEL: &str = "gpt-oss:20b";

/// Embedding request timeout.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Generation request timeout.
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Transcription request timeout. Long recordings take a while.
pub const TRANSCRIBE_TIMEOUT_SECS: u64 = 600;

/// Characters of transcript sent to the analysis prompt.
pub const ANALYSIS_MAX_CHARS: usize = 24_000;

pub const ENV_OLLAMA_BASE: &str = "OLLAMA_BASE";
pub const ENV_OLLAMA_EMBED_MODEL: &str = "OLLAMA_EMBED_MODEL";
pub const ENV_OLLAMA_GEN_MODEL: &str = "OLLAMA_GEN_MODEL";
pub const ENV_OLLAMA_EMBED_DIM: &str = "OLLAMA_EMBED_DIM";

/// Environment variable for the Whisper-compatible transcription endpoint.
pub const ENV_WHISPER_BASE_URL: &str = "WHISPER_BASE_URL";

/// Default Whisper endpoint.
pub const DEFAULT_WHISPER_BASE_URL: &str = "http://localhost:8000";

pub const ENV_WHISPER_MODEL: &str = "WHISPER_MODEL";

pub const DEFAULT_WHISPER_MODEL: &str = "Systran/faster-distil-whisper-large-v3";

/// Environment variable for the diarization endpoint. Unset disables diarization.
pub const ENV_DIARIZATION_BASE_URL: &str = "DIARIZATION_BASE_URL";

// =============================================================================
// JOBS & PIPELINE
// =============================================================================

/// Job-level redelivery attempts before a job is marked failed.
pub const JOB_MAX_RETRIES: i32 = 3;

/// Worker poll interval when no notification arrives.
pub const JOB_POLL_INTERVAL_MS: u64 = 5_000;

/// Maximum concurrently executing jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Per-job execution deadline. Running jobs older than this are re-queued on startup.
pub const JOB_TIMEOUT_SECS: u64 = 1_800;

/// In-stage attempts for transient executor failures.
pub const STAGE_MAX_ATTEMPTS: u32 = 3;

/// Base delay for in-stage exponential backoff.
pub const STAGE_BACKOFF_BASE_MS: u64 = 1_000;

/// Upper bound on a single backoff sleep.
pub const STAGE_BACKOFF_MAX_MS: u64 = 30_000;

/// Event bus buffer.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// KNOWLEDGE GRAPH
// =============================================================================

/// Item-to-item centroid similarity required to join a cluster.
pub const TOPIC_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Clusters smaller than this are discarded.
pub const TOPIC_MIN_CLUSTER_SIZE: usize = 3;

/// Maximum topics produced per rebuild.
pub const TOPIC_MAX_CLUSTERS: usize = 20;

/// Keyword Jaccard overlap needed to match a cluster to an existing topic.
pub const TOPIC_KEYWORD_OVERLAP: f32 = 0.3;

/// Keywords kept per topic.
pub const TOPIC_KEYWORD_COUNT: usize = 8;

/// Deadline for AI topic naming before falling back to keywords.
pub const TOPIC_NAMING_TIMEOUT_SECS: u64 = 20;

/// Days per trend window (recent vs previous).
pub const TREND_WINDOW_DAYS: i64 = 7;

/// Decision-pair similarity below which no conflict check runs.
pub const CONFLICT_SIMILARITY_FLOOR: f32 = 0.75;

/// Interval for scheduled knowledge graph rebuilds.
pub const GRAPH_REBUILD_INTERVAL_SECS: u64 = 3_600;
