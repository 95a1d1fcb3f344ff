//! Pipeline stage executors.
//!
//! Each executor turns a content item into the output of one pipeline step.
//! Executors never write to storage; the orchestrator persists their output
//! and owns every status change.

use async_trait::async_trait;

use sift_core::{
    AnalysisOutput, ContentItem, Embedding, PipelineStep, Result, TranscriptSegment,
    TranscriptionOutput,
};

pub mod analysis;
pub mod diarization;
pub mod embedding;
pub mod transcription;

pub use analysis::AnalysisExecutor;
pub use diarization::DiarizationExecutor;
pub use embedding::EmbeddingExecutor;
pub use transcription::TranscriptionExecutor;

/// Output of one pipeline step.
#[derive(Debug, Clone)]
pub enum StageOutput {
    Transcription(TranscriptionOutput),
    Diarization {
        segments: Vec<TranscriptSegment>,
        speaker_count: i32,
    },
    /// Transcript chunk embeddings, ordered by chunk index.
    Embeddings(Vec<Embedding>),
    Analysis(AnalysisOutput),
}

/// Executes one pipeline step for an item.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// The step this executor implements.
    fn step(&self) -> PipelineStep;

    /// Whether the step applies to `item`. Skipped steps are not failures.
    async fn applies(&self, _item: &ContentItem) -> Result<bool> {
        Ok(true)
    }

    async fn execute(&self, item: &ContentItem) -> Result<StageOutput>;
}
