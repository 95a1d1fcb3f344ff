//! Transcription step: fetch the recording and transcribe it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use sift_core::{ContentItem, Error, PipelineStep, Result};
use sift_inference::{MediaFetcher, TranscriptionBackend};

use super::{StageExecutor, StageOutput};

pub struct TranscriptionExecutor {
    fetcher: Arc<dyn MediaFetcher>,
    backend: Arc<dyn TranscriptionBackend>,
    language: Option<String>,
}

impl TranscriptionExecutor {
    pub fn new(fetcher: Arc<dyn MediaFetcher>, backend: Arc<dyn TranscriptionBackend>) -> Self {
        Self {
            fetcher,
            backend,
            language: None,
        }
    }

    /// Force a transcription language instead of auto-detection.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[async_trait]
impl StageExecutor for TranscriptionExecutor {
    fn step(&self) -> PipelineStep {
        PipelineStep::Transcription
    }

    #[instrument(skip(self, item), fields(subsystem = "pipeline", component = "transcription", item_id = %item.id))]
    async fn execute(&self, item: &ContentItem) -> Result<StageOutput> {
        let location = item
            .raw_payload_ref
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::FatalInput("item has no media to transcribe".to_string()))?;

        let media = self
            .fetcher
            .fetch(location, item.mime_type.as_deref())
            .await?;
        debug!(
            mime_type = %media.mime_type,
            bytes = media.bytes.len(),
            "Fetched media"
        );

        let output = self
            .backend
            .transcribe(&media.bytes, &media.mime_type, self.language.as_deref())
            .await?;
        if output.transcript.trim().is_empty() {
            return Err(Error::FatalInput("no speech detected in media".to_string()));
        }
        debug!(
            segment_count = output.segments.len(),
            speaker_count = ?output.speaker_count,
            model = self.backend.model_name(),
            "Transcribed media"
        );
        Ok(StageOutput::Transcription(output))
    }
}
