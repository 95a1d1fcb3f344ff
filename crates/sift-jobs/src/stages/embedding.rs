//! Embedding step: chunk the transcript and embed every chunk.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, instrument};

use sift_core::{
    defaults, new_v7, ContentItem, Decision, EmbeddingBackend, Embedding, Error, OwnerType,
    PipelineStep, Result, Vector,
};
use sift_db::{Chunker, ChunkerConfig, SentenceWindowChunker};

use super::{StageExecutor, StageOutput};

pub struct EmbeddingExecutor {
    backend: Arc<dyn EmbeddingBackend>,
    chunker: SentenceWindowChunker,
    batch_size: usize,
    concurrency: usize,
}

impl EmbeddingExecutor {
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            backend,
            chunker: SentenceWindowChunker::new(ChunkerConfig::default()),
            batch_size: defaults::EMBED_BATCH_SIZE,
            concurrency: defaults::BATCH_CONCURRENCY,
        }
    }

    pub fn with_chunker_config(mut self, config: ChunkerConfig) -> Self {
        self.chunker = SentenceWindowChunker::new(config);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Embed `texts` in batches, at most `concurrency` batches in flight.
    /// Vectors come back in input order.
    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let expected = self.backend.dimension();
        // Owned batches keep the per-batch futures `Send`.
        let owned: Vec<Vec<String>> = texts
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect();
        let batches: Vec<Vec<Vector>> = stream::iter(owned)
            .map(|batch| async move {
                let vectors = self.backend.embed_texts(&batch).await?;
                if vectors.len() != batch.len() {
                    return Err(Error::Embedding(format!(
                        "expected {} vectors, got {}",
                        batch.len(),
                        vectors.len()
                    )));
                }
                if let Some(bad) = vectors.iter().find(|v| v.as_slice().len() != expected) {
                    return Err(Error::Embedding(format!(
                        "expected dimension {}, got {}",
                        expected,
                        bad.as_slice().len()
                    )));
                }
                Ok(vectors)
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;
        Ok(batches.into_iter().flatten().collect())
    }

    /// One summary embedding per decision, `chunk_index` 0.
    #[instrument(skip(self, decisions), fields(subsystem = "pipeline", component = "embedding", op = "embed_decisions", decision_count = decisions.len()))]
    pub async fn embed_decisions(&self, decisions: &[Decision]) -> Result<Vec<Embedding>> {
        let texts: Vec<String> = decisions.iter().map(|d| d.summary.clone()).collect();
        let vectors = self.embed_all(&texts).await?;
        let now = Utc::now();
        Ok(decisions
            .iter()
            .zip(vectors)
            .map(|(decision, vector)| Embedding {
                id: new_v7(),
                organization_id: decision.organization_id,
                owner_type: OwnerType::Decision,
                owner_id: decision.id,
                chunk_index: 0,
                vector,
                source_text: decision.summary.clone(),
                source_type: None,
                model: self.backend.model_name().to_string(),
                created_at: now,
            })
            .collect())
    }
}

#[async_trait]
impl StageExecutor for EmbeddingExecutor {
    fn step(&self) -> PipelineStep {
        PipelineStep::Embedding
    }

    #[instrument(skip(self, item), fields(subsystem = "pipeline", component = "embedding", item_id = %item.id, chunk_count = tracing::field::Empty))]
    async fn execute(&self, item: &ContentItem) -> Result<StageOutput> {
        let transcript = item
            .transcript
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::FatalInput("item has no transcript to embed".to_string()))?;

        let chunks = self.chunker.chunk(transcript);
        tracing::Span::current().record("chunk_count", chunks.len());
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_all(&texts).await?;

        let embeddings: Vec<Embedding> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| Embedding {
                id: new_v7(),
                organization_id: item.organization_id,
                owner_type: OwnerType::TranscriptChunk,
                owner_id: item.id,
                chunk_index: chunk.index as i32,
                vector,
                source_text: chunk.text,
                source_type: Some(item.source_type),
                model: self.backend.model_name().to_string(),
                created_at: item.updated_at,
            })
            .collect();
        debug!(embedding_count = embeddings.len(), "Embedded transcript");
        Ok(StageOutput::Embeddings(embeddings))
    }
}
