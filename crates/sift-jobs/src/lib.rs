//! # sift-jobs
//!
//! Processing pipeline and background job system for sift.
//!
//! This crate provides:
//! - The [`Orchestrator`], which owns item status and drives items through
//!   transcription, diarization, embedding and analysis
//! - Stage executors wrapping the inference backends
//! - Per-step retry with exponential backoff for transient errors
//! - A job worker that runs queued pipeline runs and graph rebuilds
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sift_db::Stores;
//! use sift_jobs::{Orchestrator, PipelineStages, ProcessContentHandler, WorkerBuilder};
//!
//! let stores = Stores::in_memory();
//! let orchestrator = Arc::new(Orchestrator::new(&stores, stages));
//!
//! let handle = WorkerBuilder::from_stores(&stores)
//!     .with_events(orchestrator.events().clone())
//!     .with_handler(Arc::new(ProcessContentHandler::new(orchestrator.clone())))
//!     .build()
//!     .await
//!     .start();
//!
//! let item = orchestrator.ingest(raw).await?;
//! orchestrator.trigger(item.id).await?;
//!
//! handle.shutdown().await?;
//! ```

pub mod handler;
pub mod orchestrator;
pub mod retry;
pub mod sources;
pub mod stages;
pub mod worker;

pub use handler::{
    JobContext, JobHandler, JobResult, NoOpHandler, ProcessContentHandler, RebuildGraphHandler,
};
pub use orchestrator::{Orchestrator, PipelineStages};
pub use retry::RetryPolicy;
pub use sources::{SourceRegistry, StagedSource};
pub use stages::{
    AnalysisExecutor, DiarizationExecutor, EmbeddingExecutor, StageExecutor, StageOutput,
    TranscriptionExecutor,
};
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerHandle};

/// Default maximum retries for failed jobs.
pub const DEFAULT_MAX_RETRIES: i32 = sift_core::defaults::JOB_MAX_RETRIES;

/// Default polling interval for job processing (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = sift_core::defaults::JOB_POLL_INTERVAL_MS;
