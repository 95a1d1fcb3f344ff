//! Processing orchestrator.
//!
//! The orchestrator is the only writer of an item's processing state. A run
//! is claimed with a compare-and-set on the status (so concurrent triggers
//! produce one run), queued as a `process_content` job, and executed step by
//! step by [`Orchestrator::run`] on the job worker.
//!
//! ```text
//! pending → transcribing → (diarizing) → analyzing → completed
//!               ↘               ↘             ↘
//!                          failed (resumable from the failed step)
//! ```

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use sift_core::{
    defaults, new_v7, plan_merge, ActionItemRepository, AnalysisOutput, ContentItem,
    ContentItemRepository, Decision, DecisionRepository, EmbeddingIndex, Error, EventBus,
    FailureKind, JobRepository, JobType, NewJob, OwnerType, PipelineStep, ProcessingStatus,
    RawBody, RawContentItem, Result, ServerEvent, SourceType, StageFailure, StatusView,
    TriggerOutcome,
};
use sift_db::Stores;

use crate::retry::RetryPolicy;
use crate::sources::SourceRegistry;
use crate::stages::{EmbeddingExecutor, StageExecutor, StageOutput};

/// Steps in execution order.
const PIPELINE: [PipelineStep; 4] = [
    PipelineStep::Transcription,
    PipelineStep::Diarization,
    PipelineStep::Embedding,
    PipelineStep::Analysis,
];

/// The executors a pipeline run uses.
///
/// Items that need a missing executor fail at that step; a missing
/// diarization executor skips diarization.
#[derive(Clone)]
pub struct PipelineStages {
    pub transcription: Option<Arc<dyn StageExecutor>>,
    pub diarization: Option<Arc<dyn StageExecutor>>,
    pub embedding: Arc<EmbeddingExecutor>,
    pub analysis: Arc<dyn StageExecutor>,
}

impl PipelineStages {
    /// Stages for text-only content: embedding and analysis.
    pub fn new(embedding: Arc<EmbeddingExecutor>, analysis: Arc<dyn StageExecutor>) -> Self {
        Self {
            transcription: None,
            diarization: None,
            embedding,
            analysis,
        }
    }

    pub fn with_transcription(mut self, executor: Arc<dyn StageExecutor>) -> Self {
        self.transcription = Some(executor);
        self
    }

    pub fn with_diarization(mut self, executor: Arc<dyn StageExecutor>) -> Self {
        self.diarization = Some(executor);
        self
    }
}

/// Drives items through the processing pipeline.
#[derive(Clone)]
pub struct Orchestrator {
    items: Arc<dyn ContentItemRepository>,
    action_items: Arc<dyn ActionItemRepository>,
    embeddings: Arc<dyn EmbeddingIndex>,
    decisions: Arc<dyn DecisionRepository>,
    jobs: Arc<dyn JobRepository>,
    events: Arc<EventBus>,
    stages: PipelineStages,
    retry: RetryPolicy,
    sources: SourceRegistry,
    trigger_concurrency: usize,
}

/// Status an item starts a fresh run in.
fn start_status(item: &ContentItem) -> ProcessingStatus {
    if item.has_transcript() {
        ProcessingStatus::Analyzing
    } else {
        ProcessingStatus::Transcribing
    }
}

/// First step executed under `status`.
fn first_step(status: ProcessingStatus) -> Option<PipelineStep> {
    match status {
        ProcessingStatus::Transcribing => Some(PipelineStep::Transcription),
        ProcessingStatus::Diarizing => Some(PipelineStep::Diarization),
        ProcessingStatus::Analyzing => Some(PipelineStep::Embedding),
        _ => None,
    }
}

impl Orchestrator {
    pub fn new(stores: &Stores, stages: PipelineStages) -> Self {
        Self {
            items: stores.items.clone(),
            action_items: stores.action_items.clone(),
            embeddings: stores.embeddings.clone(),
            decisions: stores.decisions.clone(),
            jobs: stores.jobs.clone(),
            events: Arc::new(EventBus::new(defaults::EVENT_BUS_CAPACITY)),
            stages,
            retry: RetryPolicy::default(),
            sources: SourceRegistry::new(),
            trigger_concurrency: defaults::BATCH_CONCURRENCY,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sources(mut self, sources: SourceRegistry) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_trigger_concurrency(mut self, concurrency: usize) -> Self {
        self.trigger_concurrency = concurrency.max(1);
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    // =========================================================================
    // INGESTION
    // =========================================================================

    /// Store a raw item as a new `pending` content item.
    ///
    /// Text bodies become the transcript directly, so their run starts at analysis.
    #[instrument(skip(self, raw), fields(subsystem = "pipeline", component = "orchestrator", op = "ingest", organization_id = %raw.organization_id, source_type = %raw.source_type))]
    pub async fn ingest(&self, raw: RawContentItem) -> Result<ContentItem> {
        match &raw.body {
            RawBody::Text(text) if text.trim().is_empty() => {
                return Err(Error::InvalidInput("text body is empty".to_string()));
            }
            RawBody::Media(media) if media.url.trim().is_empty() => {
                return Err(Error::InvalidInput("media reference has no url".to_string()));
            }
            _ => {}
        }

        let item = ContentItem::from_raw(raw, Utc::now());
        self.items.insert(&item).await?;
        self.events.emit(ServerEvent::ItemIngested {
            item_id: item.id,
            organization_id: item.organization_id,
            source_type: item.source_type.to_string(),
        });
        info!(item_id = %item.id, has_transcript = item.has_transcript(), "Item ingested");
        Ok(item)
    }

    /// Pull an item through the registered adapter for `source_type` and ingest it.
    pub async fn ingest_from_source(
        &self,
        source_type: SourceType,
        external_id: &str,
    ) -> Result<ContentItem> {
        let source = self.sources.get(source_type)?;
        let raw = source.fetch_raw_item(external_id).await?;
        if raw.source_type != source_type {
            return Err(Error::InvalidInput(format!(
                "{} source produced a {} item",
                source_type, raw.source_type
            )));
        }
        debug!(%source_type, external_id, "Fetched raw item from source");
        self.ingest(raw).await
    }

    // =========================================================================
    // RUN CONTROL
    // =========================================================================

    /// Claim a run for the item and queue it. Returns without waiting for the run.
    #[instrument(skip(self), fields(subsystem = "pipeline", component = "orchestrator", op = "trigger", item_id = %item_id))]
    pub async fn trigger(&self, item_id: Uuid) -> Result<TriggerOutcome> {
        let item = self.items.fetch(item_id).await?;
        match item.processing_status {
            status if status.is_in_flight() => Ok(TriggerOutcome::AlreadyRunning { status }),
            ProcessingStatus::Completed => Ok(TriggerOutcome::AlreadyCompleted),
            ProcessingStatus::Failed => self.resume(&item).await,
            _ => {
                self.claim(&item, &[ProcessingStatus::Pending], start_status(&item))
                    .await
            }
        }
    }

    /// Trigger several items with bounded concurrency.
    pub async fn trigger_many(&self, item_ids: &[Uuid]) -> Vec<(Uuid, Result<TriggerOutcome>)> {
        stream::iter(item_ids.iter().copied())
            .map(|id| async move { (id, self.trigger(id).await) })
            .buffered(self.trigger_concurrency)
            .collect()
            .await
    }

    /// Resume a failed item from the step that failed.
    #[instrument(skip(self), fields(subsystem = "pipeline", component = "orchestrator", op = "retry", item_id = %item_id))]
    pub async fn retry(&self, item_id: Uuid) -> Result<TriggerOutcome> {
        let item = self.items.fetch(item_id).await?;
        match item.processing_status {
            ProcessingStatus::Failed => self.resume(&item).await,
            status if status.is_in_flight() => Ok(TriggerOutcome::AlreadyRunning { status }),
            ProcessingStatus::Completed => Ok(TriggerOutcome::AlreadyCompleted),
            status => Err(Error::InvalidTransition(format!(
                "cannot retry an item in {}",
                status
            ))),
        }
    }

    /// Run a completed or failed item again from the start.
    ///
    /// Items that already carry a transcript restart at analysis. Unsupported
    /// input failures can only be restarted this way.
    #[instrument(skip(self), fields(subsystem = "pipeline", component = "orchestrator", op = "reprocess", item_id = %item_id))]
    pub async fn reprocess(&self, item_id: Uuid) -> Result<TriggerOutcome> {
        let item = self.items.fetch(item_id).await?;
        match item.processing_status {
            status if status.is_in_flight() => Ok(TriggerOutcome::AlreadyRunning { status }),
            ProcessingStatus::Pending => {
                self.claim(&item, &[ProcessingStatus::Pending], start_status(&item))
                    .await
            }
            _ => {
                self.claim(
                    &item,
                    &[ProcessingStatus::Completed, ProcessingStatus::Failed],
                    start_status(&item),
                )
                .await
            }
        }
    }

    pub async fn get_status(&self, item_id: Uuid) -> Result<StatusView> {
        let item = self.items.fetch(item_id).await?;
        Ok(StatusView::of(&item))
    }

    /// Queue a topic rebuild for an organization unless one is already queued.
    pub async fn schedule_graph_rebuild(&self, organization_id: Uuid) -> Result<Option<Uuid>> {
        let job = NewJob::rebuild_knowledge_graph(organization_id);
        let job_type = job.job_type;
        let job_id = self.jobs.queue_deduplicated(job).await?;
        if let Some(job_id) = job_id {
            self.events.emit(ServerEvent::JobQueued {
                job_id,
                job_type,
                item_id: None,
            });
            debug!(%organization_id, %job_id, "Queued knowledge graph rebuild");
        }
        Ok(job_id)
    }

    async fn resume(&self, item: &ContentItem) -> Result<TriggerOutcome> {
        if item.failure_kind == Some(FailureKind::UnsupportedInput) {
            return Ok(TriggerOutcome::NotRetryable);
        }
        let to = item
            .failed_stage
            .map(|step| step.status())
            .unwrap_or_else(|| start_status(item));
        self.claim(item, &[ProcessingStatus::Failed], to).await
    }

    /// Move the item from one of `from` to `to` and queue its run.
    async fn claim(
        &self,
        item: &ContentItem,
        from: &[ProcessingStatus],
        to: ProcessingStatus,
    ) -> Result<TriggerOutcome> {
        if !self.items.transition(item.id, from, to).await? {
            let current = self.items.fetch(item.id).await?;
            debug!(status = %current.processing_status, "Lost claim race");
            return Ok(match current.processing_status {
                ProcessingStatus::Completed => TriggerOutcome::AlreadyCompleted,
                ProcessingStatus::Failed
                    if current.failure_kind == Some(FailureKind::UnsupportedInput) =>
                {
                    TriggerOutcome::NotRetryable
                }
                status => TriggerOutcome::AlreadyRunning { status },
            });
        }
        self.emit_status(item, item.processing_status, to);

        match self
            .jobs
            .queue_deduplicated(NewJob::process_content(item.id, item.organization_id))
            .await
        {
            Ok(Some(job_id)) => {
                self.events.emit(ServerEvent::JobQueued {
                    job_id,
                    job_type: JobType::ProcessContent,
                    item_id: Some(item.id),
                });
                info!(%job_id, status = %to, "Processing run claimed");
            }
            Ok(None) => debug!("Processing job already queued"),
            Err(e) => {
                // Without a job nothing would ever advance the claimed item.
                if let Some(step) = first_step(to) {
                    self.fail_step(item, to, step, &e).await?;
                }
                return Err(e);
            }
        }
        Ok(TriggerOutcome::Started { status: to })
    }

    // =========================================================================
    // EXECUTION
    // =========================================================================

    /// Execute the remaining steps of a claimed run.
    ///
    /// Returns the final status. A failing step is recorded on the item and
    /// reported as `Ok(Failed)`; errors are reserved for storage failures, which
    /// leave the item in flight for the job to be redelivered.
    #[instrument(skip(self), fields(subsystem = "pipeline", component = "orchestrator", op = "run", item_id = %item_id))]
    pub async fn run(&self, item_id: Uuid) -> Result<ProcessingStatus> {
        let run_start = Instant::now();
        let mut item = self.items.fetch(item_id).await?;
        let Some(first) = first_step(item.processing_status) else {
            debug!(status = %item.processing_status, "No run in flight");
            return Ok(item.processing_status);
        };

        for step in PIPELINE.into_iter().skip_while(|s| *s != first) {
            let Some(executor) = self.executor_for(step) else {
                if step == PipelineStep::Diarization {
                    continue;
                }
                let err = Error::Config(format!("no {} backend configured", step));
                self.fail_step(&item, item.processing_status, step, &err).await?;
                return Ok(ProcessingStatus::Failed);
            };

            match executor.applies(&item).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(stage = %step, "Step skipped");
                    continue;
                }
                Err(e) => {
                    self.fail_step(&item, item.processing_status, step, &e).await?;
                    return Ok(ProcessingStatus::Failed);
                }
            }

            let target = step.status();
            if item.processing_status != target {
                if !item.processing_status.can_advance_to(target) {
                    return Err(Error::InvalidTransition(format!(
                        "{} -> {}",
                        item.processing_status, target
                    )));
                }
                if !self
                    .items
                    .transition(item.id, &[item.processing_status], target)
                    .await?
                {
                    let current = self.items.fetch(item.id).await?;
                    warn!(status = %current.processing_status, "Item changed under a running pipeline, stopping");
                    return Ok(current.processing_status);
                }
                self.emit_status(&item, item.processing_status, target);
                item = self.items.fetch(item.id).await?;
            }

            let step_start = Instant::now();
            let outcome = match self.execute_step(&item, step, executor).await {
                Ok(decisions) if !decisions.is_empty() => self
                    .index_decisions(&decisions)
                    .await
                    .map_err(|e| (PipelineStep::Embedding, e)),
                Ok(_) => Ok(()),
                Err(e) => Err((step, e)),
            };
            if let Err((failed, e)) = outcome {
                self.fail_step(&item, target, failed, &e).await?;
                return Ok(ProcessingStatus::Failed);
            }

            let duration_ms = step_start.elapsed().as_millis() as i64;
            self.events.emit(ServerEvent::StageCompleted {
                item_id: item.id,
                organization_id: item.organization_id,
                stage: step,
                duration_ms,
            });
            info!(stage = %step, duration_ms, "Step completed");
            item = self.items.fetch(item.id).await?;
        }

        if !self
            .items
            .transition(item.id, &[ProcessingStatus::Analyzing], ProcessingStatus::Completed)
            .await?
        {
            let current = self.items.fetch(item.id).await?;
            warn!(status = %current.processing_status, "Item changed before completion");
            return Ok(current.processing_status);
        }
        self.emit_status(&item, ProcessingStatus::Analyzing, ProcessingStatus::Completed);
        info!(
            duration_ms = run_start.elapsed().as_millis() as u64,
            "Item processing completed"
        );
        Ok(ProcessingStatus::Completed)
    }

    fn executor_for(&self, step: PipelineStep) -> Option<Arc<dyn StageExecutor>> {
        match step {
            PipelineStep::Transcription => self.stages.transcription.clone(),
            PipelineStep::Diarization => self.stages.diarization.clone(),
            PipelineStep::Embedding => {
                Some(self.stages.embedding.clone() as Arc<dyn StageExecutor>)
            }
            PipelineStep::Analysis => Some(self.stages.analysis.clone()),
        }
    }

    /// Run one executor (retrying transient errors) and persist its output.
    /// Returns the decisions written by analysis.
    async fn execute_step(
        &self,
        item: &ContentItem,
        step: PipelineStep,
        executor: Arc<dyn StageExecutor>,
    ) -> Result<Vec<Decision>> {
        let executor = executor.as_ref();
        let output = self
            .retry
            .run(step.as_str(), move || executor.execute(item))
            .await?;

        match output {
            StageOutput::Transcription(out) => {
                self.items.save_transcription(item.id, &out).await?;
                Ok(Vec::new())
            }
            StageOutput::Diarization { segments, .. } => {
                self.items.save_segments(item.id, &segments).await?;
                Ok(Vec::new())
            }
            StageOutput::Embeddings(embeddings) => {
                debug!(chunk_count = embeddings.len(), "Replacing transcript embeddings");
                self.embeddings
                    .replace_for_owner(OwnerType::TranscriptChunk, item.id, embeddings)
                    .await?;
                Ok(Vec::new())
            }
            StageOutput::Analysis(out) => self.save_analysis(item, out).await,
        }
    }

    /// Replace AI-derived fields, merge action items and replace decisions.
    async fn save_analysis(&self, item: &ContentItem, out: AnalysisOutput) -> Result<Vec<Decision>> {
        let now = Utc::now();
        self.items
            .save_analysis(item.id, &out.summary, &out.tags, &out.chapters)
            .await?;

        let existing = self.action_items.list_for_item(item.id).await?;
        let merge = plan_merge(
            item.id,
            item.organization_id,
            &existing,
            &out.action_items,
            now,
        );
        if !merge.is_empty() {
            debug!(
                upserts = merge.upserts.len(),
                deletes = merge.deletes.len(),
                "Merging action items"
            );
            self.action_items.apply_merge(&merge).await?;
        }

        let decisions: Vec<Decision> = out
            .decisions
            .iter()
            .map(|d| Decision {
                id: new_v7(),
                organization_id: item.organization_id,
                content_item_id: Some(item.id),
                summary: d.summary.clone(),
                context: d.context.clone(),
                status: d.status.unwrap_or_default(),
                decided_at: Some(item.created_at),
                tags: d.tags.clone(),
                created_at: now,
            })
            .collect();
        let removed = self.decisions.replace_for_item(item.id, &decisions).await?;
        for id in removed {
            self.embeddings
                .delete_for_owner(OwnerType::Decision, id)
                .await?;
        }
        Ok(decisions)
    }

    /// Store one summary embedding per decision.
    async fn index_decisions(&self, decisions: &[Decision]) -> Result<()> {
        let embedder = self.stages.embedding.as_ref();
        let embeddings = self
            .retry
            .run("embed_decisions", move || embedder.embed_decisions(decisions))
            .await?;
        for embedding in embeddings {
            self.embeddings
                .replace_for_owner(OwnerType::Decision, embedding.owner_id, vec![embedding])
                .await?;
        }
        Ok(())
    }

    // =========================================================================
    // STATE RECORDING
    // =========================================================================

    fn emit_status(&self, item: &ContentItem, from: ProcessingStatus, to: ProcessingStatus) {
        debug!(item_id = %item.id, %from, %to, "Status changed");
        self.events.emit(ServerEvent::ItemStatusChanged {
            item_id: item.id,
            organization_id: item.organization_id,
            from,
            to,
        });
    }

    /// Record a failed step on the item if it is still in `expected`.
    async fn fail_step(
        &self,
        item: &ContentItem,
        expected: ProcessingStatus,
        step: PipelineStep,
        err: &Error,
    ) -> Result<()> {
        let kind = if err.is_fatal_input() {
            FailureKind::UnsupportedInput
        } else {
            FailureKind::Retryable
        };
        let failure = StageFailure {
            step,
            kind,
            message: err.to_string(),
        };
        if !self.items.mark_failed(item.id, expected, &failure).await? {
            warn!(stage = %step, error = %err, "Item changed before failure could be recorded");
            return Ok(());
        }

        self.emit_status(item, expected, ProcessingStatus::Failed);
        self.events.emit(ServerEvent::ItemFailed {
            item_id: item.id,
            organization_id: item.organization_id,
            stage: step,
            kind,
            error: failure.message.clone(),
        });
        match kind {
            FailureKind::UnsupportedInput => {
                warn!(stage = %step, failure_kind = %kind, error = %err, "Item input unsupported")
            }
            FailureKind::Retryable => {
                error!(stage = %step, failure_kind = %kind, error = %err, "Item processing failed")
            }
        }
        Ok(())
    }
}
