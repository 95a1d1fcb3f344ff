//! Diarization step: label transcript segments with speakers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use sift_core::{ContentItem, Error, OrgSettingsRepository, PipelineStep, Result};
use sift_inference::{speaker_count, DiarizationBackend, MediaFetcher};

use super::{StageExecutor, StageOutput};

pub struct DiarizationExecutor {
    fetcher: Arc<dyn MediaFetcher>,
    backend: Arc<dyn DiarizationBackend>,
    settings: Arc<dyn OrgSettingsRepository>,
}

impl DiarizationExecutor {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        backend: Arc<dyn DiarizationBackend>,
        settings: Arc<dyn OrgSettingsRepository>,
    ) -> Self {
        Self {
            fetcher,
            backend,
            settings,
        }
    }
}

#[async_trait]
impl StageExecutor for DiarizationExecutor {
    fn step(&self) -> PipelineStep {
        PipelineStep::Diarization
    }

    /// Runs for multi-speaker recordings of organizations that have not
    /// switched diarization off. An unknown speaker count counts as multi-speaker.
    async fn applies(&self, item: &ContentItem) -> Result<bool> {
        if item.speaker_count.is_some_and(|n| n <= 1) {
            return Ok(false);
        }
        if item
            .transcript_segments
            .as_ref()
            .map_or(true, |s| s.is_empty())
        {
            return Ok(false);
        }
        let enabled = self
            .settings
            .get(item.organization_id)
            .await?
            .map_or(true, |s| s.diarization_enabled);
        Ok(enabled)
    }

    #[instrument(skip(self, item), fields(subsystem = "pipeline", component = "diarization", item_id = %item.id))]
    async fn execute(&self, item: &ContentItem) -> Result<StageOutput> {
        let segments = item
            .transcript_segments
            .as_deref()
            .ok_or_else(|| Error::Internal("diarization requires transcript segments".to_string()))?;
        let location = item
            .raw_payload_ref
            .as_deref()
            .ok_or_else(|| Error::FatalInput("item has no media to diarize".to_string()))?;

        let media = self
            .fetcher
            .fetch(location, item.mime_type.as_deref())
            .await?;
        let labeled = self
            .backend
            .diarize(&media.bytes, &media.mime_type, segments)
            .await?;
        let speakers = speaker_count(&labeled);
        debug!(segment_count = labeled.len(), speakers, "Diarized transcript");

        Ok(StageOutput::Diarization {
            segments: labeled,
            speaker_count: speakers,
        })
    }
}
