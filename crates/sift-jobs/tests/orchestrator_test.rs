//! Pipeline runs over the in-memory store with mock backends.

use std::sync::Arc;
use std::time::Duration;

use sift_core::{
    ActionItemRepository, ActionItemStatus, ActionItemUpdate, ContentItemRepository,
    DecisionRepository, EmbeddingIndex, Error, EventBus, FailureKind, MediaRef, OwnerType,
    PipelineStep, ProcessingStatus, RawBody, RawContentItem, SourceType, StatusPhase,
    TriggerOutcome,
};
use sift_db::{MemoryStore, Stores};
use sift_inference::mock::{
    MockDiarizationBackend, MockEmbeddingBackend, MockGenerationBackend, MockMediaFetcher,
    MockTranscriptionBackend,
};
use sift_jobs::{
    AnalysisExecutor, DiarizationExecutor, EmbeddingExecutor, Orchestrator, PipelineStages,
    RetryPolicy, SourceRegistry, StagedSource, TranscriptionExecutor,
};
use uuid::Uuid;

const URL: &str = "https://cdn.test/standup.wav";
const WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt ";

const ANALYSIS: &str = r#"{
    "summary": "The team agreed to move storage to Postgres.",
    "tags": ["storage", "postgres"],
    "action_items": [
        {"title": "Send the migration plan", "assignee": "Ana", "priority": "high", "timestamp_start": 12.0, "confidence": 0.9}
    ],
    "chapters": [{"title": "Storage", "start_secs": 0.0}],
    "decisions": [{"summary": "Use Postgres for storage", "status": "decided", "tags": ["storage"]}]
}"#;

struct Harness {
    store: MemoryStore,
    orchestrator: Orchestrator,
    generation: MockGenerationBackend,
    transcription: MockTranscriptionBackend,
    diarization: MockDiarizationBackend,
    events: Arc<EventBus>,
}

fn harness_with_speakers(speakers: Option<i32>) -> Harness {
    let store = MemoryStore::new();
    let stores = Stores::from_memory(store.clone());
    let fetcher = Arc::new(MockMediaFetcher::new().with_media(URL, WAV.to_vec(), "audio/wav"));
    let transcription = MockTranscriptionBackend::from_lines(
        &["Morning all.", "Storage is slow.", "Let's move to Postgres."],
        speakers,
    );
    let diarization = MockDiarizationBackend::new();
    let generation = MockGenerationBackend::new(ANALYSIS);
    let embedding = MockEmbeddingBackend::new(8);
    let events = Arc::new(EventBus::default());

    let stages = PipelineStages::new(
        Arc::new(EmbeddingExecutor::new(Arc::new(embedding))),
        Arc::new(AnalysisExecutor::new(Arc::new(generation.clone()))),
    )
    .with_transcription(Arc::new(TranscriptionExecutor::new(
        fetcher.clone(),
        Arc::new(transcription.clone()),
    )))
    .with_diarization(Arc::new(DiarizationExecutor::new(
        fetcher,
        Arc::new(diarization.clone()),
        stores.settings.clone(),
    )));

    let orchestrator = Orchestrator::new(&stores, stages)
        .with_events(events.clone())
        .with_retry_policy(
            RetryPolicy::default()
                .with_base_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(2)),
        );

    Harness {
        store,
        orchestrator,
        generation,
        transcription,
        diarization,
        events,
    }
}

fn harness() -> Harness {
    harness_with_speakers(Some(2))
}

fn text_raw(org: Uuid, body: &str) -> RawContentItem {
    RawContentItem {
        organization_id: org,
        source_type: SourceType::ChatThread,
        title: "Storage thread".to_string(),
        body: RawBody::Text(body.to_string()),
        metadata: serde_json::Value::Null,
    }
}

fn audio_raw(org: Uuid) -> RawContentItem {
    RawContentItem {
        organization_id: org,
        source_type: SourceType::Audio,
        title: "Standup".to_string(),
        body: RawBody::Media(MediaRef {
            url: URL.to_string(),
            mime_type: Some("audio/wav".to_string()),
        }),
        metadata: serde_json::Value::Null,
    }
}

#[tokio::test]
async fn text_item_skips_to_analysis_and_completes() {
    let h = harness();
    let org = Uuid::new_v4();
    let item = h
        .orchestrator
        .ingest(text_raw(org, "Storage is slow. We should move to Postgres."))
        .await
        .unwrap();
    assert_eq!(item.processing_status, ProcessingStatus::Pending);

    let outcome = h.orchestrator.trigger(item.id).await.unwrap();
    assert_eq!(
        outcome,
        TriggerOutcome::Started {
            status: ProcessingStatus::Analyzing
        }
    );

    let status = h.orchestrator.run(item.id).await.unwrap();
    assert_eq!(status, ProcessingStatus::Completed);
    assert_eq!(h.transcription.call_count(), 0);

    let stored = h.store.fetch(item.id).await.unwrap();
    assert_eq!(
        stored.summary.as_deref(),
        Some("The team agreed to move storage to Postgres.")
    );
    assert_eq!(stored.tags, vec!["storage", "postgres"]);
    let chunks = h
        .store
        .for_owner(OwnerType::TranscriptChunk, item.id)
        .await
        .unwrap();
    assert!(!chunks.is_empty());
    assert!(chunks.iter().all(|c| c.source_type == Some(SourceType::ChatThread)));

    let view = h.orchestrator.get_status(item.id).await.unwrap();
    assert_eq!(view.phase, StatusPhase::Completed);
}

#[tokio::test]
async fn duplicate_trigger_reports_running_run() {
    let h = harness();
    let item = h
        .orchestrator
        .ingest(audio_raw(Uuid::new_v4()))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        h.orchestrator.trigger(item.id),
        h.orchestrator.trigger(item.id)
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    let started = outcomes
        .iter()
        .filter(|o| matches!(o, TriggerOutcome::Started { .. }))
        .count();
    assert_eq!(started, 1);
    assert!(outcomes.contains(&TriggerOutcome::AlreadyRunning {
        status: ProcessingStatus::Transcribing
    }));

    // One queued run for the item.
    let jobs = sift_core::JobRepository::list_for_item(&h.store, item.id)
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
}

#[tokio::test]
async fn reprocess_while_finished_job_is_still_running_queues_a_new_run() {
    use sift_core::{JobRepository, JobStatus, JobType};

    let h = harness();
    let raw = text_raw(Uuid::new_v4(), "Storage is slow. We should move to Postgres.");
    let item = h.orchestrator.ingest(raw).await.unwrap();
    h.orchestrator.trigger(item.id).await.unwrap();

    // The worker has claimed the job and the run has finished, but the job
    // is not marked complete yet.
    let job = h
        .store
        .claim_next_for_types(&[JobType::ProcessContent])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        h.orchestrator.run(item.id).await.unwrap(),
        ProcessingStatus::Completed
    );

    let outcome = h.orchestrator.reprocess(item.id).await.unwrap();
    assert_eq!(
        outcome,
        TriggerOutcome::Started {
            status: ProcessingStatus::Analyzing
        }
    );
    h.store.complete(job.id).await.unwrap();

    let jobs = JobRepository::list_for_item(&h.store, item.id).await.unwrap();
    let pending: Vec<_> = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Pending)
        .collect();
    assert_eq!(pending.len(), 1);

    let next = h
        .store
        .claim_next_for_types(&[JobType::ProcessContent])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.content_item_id, Some(item.id));
    assert_eq!(
        h.orchestrator.run(item.id).await.unwrap(),
        ProcessingStatus::Completed
    );
}

#[tokio::test]
async fn audio_item_runs_every_step() {
    let h = harness();
    let org = Uuid::new_v4();
    let mut rx = h.events.subscribe();
    let item = h.orchestrator.ingest(audio_raw(org)).await.unwrap();
    h.orchestrator.trigger(item.id).await.unwrap();

    let status = h.orchestrator.run(item.id).await.unwrap();
    assert_eq!(status, ProcessingStatus::Completed);
    assert_eq!(h.transcription.call_count(), 1);
    assert_eq!(h.diarization.call_count(), 1);

    let stored = h.store.fetch(item.id).await.unwrap();
    let segments = stored.transcript_segments.unwrap();
    assert_eq!(segments[0].speaker.as_deref(), Some("SPEAKER_00"));
    assert_eq!(segments[1].speaker.as_deref(), Some("SPEAKER_01"));
    assert_eq!(stored.speaker_count, Some(2));

    let mut types = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        types.push(envelope.event_type);
    }
    assert_eq!(types.first().map(String::as_str), Some("item.ingested"));
    assert_eq!(
        types.iter().filter(|t| *t == "item.stage_completed").count(),
        4
    );
    assert_eq!(types.last().map(String::as_str), Some("item.status_changed"));
}

#[tokio::test]
async fn single_speaker_recording_skips_diarization() {
    let h = harness_with_speakers(Some(1));
    let item = h
        .orchestrator
        .ingest(audio_raw(Uuid::new_v4()))
        .await
        .unwrap();
    h.orchestrator.trigger(item.id).await.unwrap();

    let status = h.orchestrator.run(item.id).await.unwrap();
    assert_eq!(status, ProcessingStatus::Completed);
    assert_eq!(h.diarization.call_count(), 0);
}

#[tokio::test]
async fn transient_failure_is_retried_within_the_step() {
    let h = harness();
    let item = h
        .orchestrator
        .ingest(audio_raw(Uuid::new_v4()))
        .await
        .unwrap();
    h.transcription.fail_next(1);
    h.orchestrator.trigger(item.id).await.unwrap();

    let status = h.orchestrator.run(item.id).await.unwrap();
    assert_eq!(status, ProcessingStatus::Completed);
    assert_eq!(h.transcription.call_count(), 2);
}

#[tokio::test]
async fn exhausted_retries_fail_and_resume_from_failed_step() {
    let h = harness();
    let item = h
        .orchestrator
        .ingest(audio_raw(Uuid::new_v4()))
        .await
        .unwrap();
    h.orchestrator.trigger(item.id).await.unwrap();
    h.generation.fail_next(3);

    let status = h.orchestrator.run(item.id).await.unwrap();
    assert_eq!(status, ProcessingStatus::Failed);
    let failed = h.store.fetch(item.id).await.unwrap();
    assert_eq!(failed.failed_stage, Some(PipelineStep::Analysis));
    assert_eq!(failed.failure_kind, Some(FailureKind::Retryable));
    assert_eq!(failed.attempt, 1);
    assert!(failed.processing_error.is_some());
    // Earlier steps kept their output.
    assert!(failed.transcript.is_some());

    let outcome = h.orchestrator.retry(item.id).await.unwrap();
    assert_eq!(
        outcome,
        TriggerOutcome::Started {
            status: ProcessingStatus::Analyzing
        }
    );
    let status = h.orchestrator.run(item.id).await.unwrap();
    assert_eq!(status, ProcessingStatus::Completed);
    assert_eq!(h.transcription.call_count(), 1);

    let done = h.store.fetch(item.id).await.unwrap();
    assert!(done.processing_error.is_none());
    assert!(done.failed_stage.is_none());
}

#[tokio::test]
async fn unsupported_input_is_not_retryable_until_reprocessed() {
    let h = harness();
    let item = h
        .orchestrator
        .ingest(audio_raw(Uuid::new_v4()))
        .await
        .unwrap();
    h.transcription.reject_next(1);
    h.orchestrator.trigger(item.id).await.unwrap();

    let status = h.orchestrator.run(item.id).await.unwrap();
    assert_eq!(status, ProcessingStatus::Failed);
    // Fatal input is not retried inside the step.
    assert_eq!(h.transcription.call_count(), 1);

    let view = h.orchestrator.get_status(item.id).await.unwrap();
    assert_eq!(view.phase, StatusPhase::FailedUnsupported);
    assert_eq!(
        h.orchestrator.retry(item.id).await.unwrap(),
        TriggerOutcome::NotRetryable
    );
    assert_eq!(
        h.orchestrator.trigger(item.id).await.unwrap(),
        TriggerOutcome::NotRetryable
    );

    let outcome = h.orchestrator.reprocess(item.id).await.unwrap();
    assert_eq!(
        outcome,
        TriggerOutcome::Started {
            status: ProcessingStatus::Transcribing
        }
    );
    assert_eq!(
        h.orchestrator.run(item.id).await.unwrap(),
        ProcessingStatus::Completed
    );
}

#[tokio::test]
async fn missing_media_fails_as_unsupported() {
    let h = harness();
    let mut raw = audio_raw(Uuid::new_v4());
    raw.body = RawBody::Media(MediaRef {
        url: "https://cdn.test/gone.wav".to_string(),
        mime_type: None,
    });
    let item = h.orchestrator.ingest(raw).await.unwrap();
    h.orchestrator.trigger(item.id).await.unwrap();

    assert_eq!(
        h.orchestrator.run(item.id).await.unwrap(),
        ProcessingStatus::Failed
    );
    let stored = h.store.fetch(item.id).await.unwrap();
    assert_eq!(stored.failure_kind, Some(FailureKind::UnsupportedInput));
    assert_eq!(stored.failed_stage, Some(PipelineStep::Transcription));
}

#[tokio::test]
async fn retry_requires_a_failed_item() {
    let h = harness();
    let item = h
        .orchestrator
        .ingest(text_raw(Uuid::new_v4(), "Short note."))
        .await
        .unwrap();

    let err = h.orchestrator.retry(item.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition(_)));

    h.orchestrator.trigger(item.id).await.unwrap();
    h.orchestrator.run(item.id).await.unwrap();
    assert_eq!(
        h.orchestrator.trigger(item.id).await.unwrap(),
        TriggerOutcome::AlreadyCompleted
    );
    assert_eq!(
        h.orchestrator.retry(item.id).await.unwrap(),
        TriggerOutcome::AlreadyCompleted
    );
}

#[tokio::test]
async fn reprocess_keeps_user_edits_to_action_items() {
    let h = harness();
    let item = h
        .orchestrator
        .ingest(text_raw(Uuid::new_v4(), "Ana will send the migration plan."))
        .await
        .unwrap();
    h.orchestrator.trigger(item.id).await.unwrap();
    h.orchestrator.run(item.id).await.unwrap();

    let actions = ActionItemRepository::list_for_item(&h.store, item.id).await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].assignee.as_deref(), Some("Ana"));
    let original_id = actions[0].id;

    h.store
        .update_by_user(
            original_id,
            &ActionItemUpdate {
                status: Some(ActionItemStatus::Completed),
                assignee: Some(Some("Bo".to_string())),
            },
        )
        .await
        .unwrap();

    let outcome = h.orchestrator.reprocess(item.id).await.unwrap();
    assert_eq!(
        outcome,
        TriggerOutcome::Started {
            status: ProcessingStatus::Analyzing
        }
    );
    h.orchestrator.run(item.id).await.unwrap();

    let actions = ActionItemRepository::list_for_item(&h.store, item.id).await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].id, original_id);
    assert_eq!(actions[0].status, ActionItemStatus::Completed);
    assert_eq!(actions[0].assignee.as_deref(), Some("Bo"));
    assert_eq!(h.generation.call_count(), 2);
}

#[tokio::test]
async fn decisions_are_replaced_and_embedded() {
    let h = harness();
    let org = Uuid::new_v4();
    let item = h
        .orchestrator
        .ingest(text_raw(org, "We decided to use Postgres for storage."))
        .await
        .unwrap();
    h.orchestrator.trigger(item.id).await.unwrap();
    h.orchestrator.run(item.id).await.unwrap();

    let first = DecisionRepository::list_for_organization(&h.store, org)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].content_item_id, Some(item.id));
    assert_eq!(first[0].decided_at, Some(item.created_at));
    let vectors = h
        .store
        .for_owner(OwnerType::Decision, first[0].id)
        .await
        .unwrap();
    assert_eq!(vectors.len(), 1);
    assert_eq!(vectors[0].source_text, "Use Postgres for storage");

    h.orchestrator.reprocess(item.id).await.unwrap();
    h.orchestrator.run(item.id).await.unwrap();

    let second = DecisionRepository::list_for_organization(&h.store, org)
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_ne!(second[0].id, first[0].id);
    // The replaced decision's vector went with it.
    assert!(h
        .store
        .for_owner(OwnerType::Decision, first[0].id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn malformed_analysis_fails_retryable() {
    let h = harness();
    h.generation.set_default_response("I could not analyze this.");
    let item = h
        .orchestrator
        .ingest(text_raw(Uuid::new_v4(), "Some thread."))
        .await
        .unwrap();
    h.orchestrator.trigger(item.id).await.unwrap();

    assert_eq!(
        h.orchestrator.run(item.id).await.unwrap(),
        ProcessingStatus::Failed
    );
    let stored = h.store.fetch(item.id).await.unwrap();
    assert_eq!(stored.failure_kind, Some(FailureKind::Retryable));
    assert_eq!(h.generation.call_count(), 3);
}

#[tokio::test]
async fn run_without_claim_is_a_no_op() {
    let h = harness();
    let item = h
        .orchestrator
        .ingest(text_raw(Uuid::new_v4(), "Some thread."))
        .await
        .unwrap();
    assert_eq!(
        h.orchestrator.run(item.id).await.unwrap(),
        ProcessingStatus::Pending
    );
    assert_eq!(h.generation.call_count(), 0);
}

#[tokio::test]
async fn ingest_rejects_empty_bodies() {
    let h = harness();
    let err = h
        .orchestrator
        .ingest(text_raw(Uuid::new_v4(), "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn trigger_many_reports_each_item() {
    let h = harness();
    let org = Uuid::new_v4();
    let a = h.orchestrator.ingest(text_raw(org, "First.")).await.unwrap();
    let b = h.orchestrator.ingest(audio_raw(org)).await.unwrap();
    let missing = Uuid::new_v4();

    let results = h.orchestrator.trigger_many(&[a.id, b.id, missing]).await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].0, a.id);
    assert!(matches!(
        results[0].1,
        Ok(TriggerOutcome::Started {
            status: ProcessingStatus::Analyzing
        })
    ));
    assert!(matches!(
        results[1].1,
        Ok(TriggerOutcome::Started {
            status: ProcessingStatus::Transcribing
        })
    ));
    assert!(matches!(results[2].1, Err(Error::ItemNotFound(id)) if id == missing));
}

#[tokio::test]
async fn ingest_from_registered_source() {
    let source = Arc::new(StagedSource::new(SourceType::Audio));
    let org = Uuid::new_v4();
    source.stage("upload-1", audio_raw(org)).await.unwrap();

    let h = harness();
    let orchestrator = h
        .orchestrator
        .clone()
        .with_sources(SourceRegistry::new().with_source(source));

    let item = orchestrator
        .ingest_from_source(SourceType::Audio, "upload-1")
        .await
        .unwrap();
    assert_eq!(item.organization_id, org);
    assert_eq!(item.raw_payload_ref.as_deref(), Some(URL));

    let err = orchestrator
        .ingest_from_source(SourceType::ChatThread, "upload-1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
