//! Analysis step: summary, tags, chapters, action items and decisions.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use sift_core::{defaults, ContentItem, Error, GenerationBackend, PipelineStep, Result};
use sift_inference::{analysis_prompt, parse_analysis_response, ANALYSIS_SYSTEM_PROMPT};

use super::{StageExecutor, StageOutput};

pub struct AnalysisExecutor {
    backend: Arc<dyn GenerationBackend>,
    max_chars: usize,
}

impl AnalysisExecutor {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            max_chars: defaults::ANALYSIS_MAX_CHARS,
        }
    }

    /// Characters of transcript included in the prompt.
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

#[async_trait]
impl StageExecutor for AnalysisExecutor {
    fn step(&self) -> PipelineStep {
        PipelineStep::Analysis
    }

    #[instrument(skip(self, item), fields(subsystem = "pipeline", component = "analysis", item_id = %item.id, model = self.backend.model_name()))]
    async fn execute(&self, item: &ContentItem) -> Result<StageOutput> {
        let transcript = item
            .transcript
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::FatalInput("item has no transcript to analyze".to_string()))?;

        let prompt = analysis_prompt(
            &item.title,
            item.source_type,
            transcript,
            item.transcript_segments.as_deref(),
            self.max_chars,
        );
        let raw = self
            .backend
            .generate_json(ANALYSIS_SYSTEM_PROMPT, &prompt)
            .await?;
        let output = parse_analysis_response(&raw)?;
        debug!(
            tag_count = output.tags.len(),
            action_item_count = output.action_items.len(),
            decision_count = output.decisions.len(),
            chapter_count = output.chapters.len(),
            "Analysis parsed"
        );
        Ok(StageOutput::Analysis(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_db::test_fixtures::text_item;
    use sift_inference::mock::MockGenerationBackend;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_parses_model_output() {
        let backend = MockGenerationBackend::new(
            r#"{"summary": "Team chose Postgres.", "tags": ["storage"],
                "action_items": [{"title": "Draft migration plan", "assignee": "Ana"}],
                "decisions": [{"summary": "Use Postgres for storage"}]}"#,
        );
        let executor = AnalysisExecutor::new(Arc::new(backend.clone()));
        let item = text_item(Uuid::new_v4(), "Storage sync", "We will use Postgres.");

        let StageOutput::Analysis(out) = executor.execute(&item).await.unwrap() else {
            panic!("expected analysis output");
        };
        assert_eq!(out.summary, "Team chose Postgres.");
        assert_eq!(out.action_items[0].assignee.as_deref(), Some("Ana"));
        assert_eq!(out.decisions.len(), 1);
        assert!(backend.prompts()[0].contains("We will use Postgres."));
    }

    #[tokio::test]
    async fn test_prose_response_is_transient() {
        let backend = MockGenerationBackend::new("Sorry, I can't do that.");
        let executor = AnalysisExecutor::new(Arc::new(backend));
        let item = text_item(Uuid::new_v4(), "Sync", "content");
        assert!(executor.execute(&item).await.unwrap_err().is_transient());
    }
}
