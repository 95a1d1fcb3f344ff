//! Job worker driving queued pipeline runs and graph rebuilds.

use std::sync::Arc;
use std::time::Duration;

use sift_core::{
    ContentItemRepository, EventBus, JobRepository, JobStatus, JobType, NewJob, ProcessingStatus,
    RawBody, RawContentItem, SourceType, TopicRepository,
};
use sift_db::{MemoryStore, Stores};
use sift_graph::KnowledgeGraphBuilder;
use sift_inference::mock::{MockEmbeddingBackend, MockGenerationBackend};
use sift_jobs::{
    AnalysisExecutor, EmbeddingExecutor, NoOpHandler, Orchestrator, PipelineStages,
    ProcessContentHandler, RebuildGraphHandler, WorkerBuilder, WorkerConfig,
};
use uuid::Uuid;

const ANALYSIS: &str = r#"{"summary": "Short sync.", "tags": ["sync"], "action_items": [], "chapters": [], "decisions": []}"#;

fn orchestrator(stores: &Stores, events: Arc<EventBus>) -> Arc<Orchestrator> {
    let stages = PipelineStages::new(
        Arc::new(EmbeddingExecutor::new(Arc::new(MockEmbeddingBackend::new(8)))),
        Arc::new(AnalysisExecutor::new(Arc::new(MockGenerationBackend::new(
            ANALYSIS,
        )))),
    );
    Arc::new(Orchestrator::new(stores, stages).with_events(events))
}

fn config() -> WorkerConfig {
    WorkerConfig::default().with_poll_interval(20)
}

async fn wait_for_status(store: &MemoryStore, id: Uuid, want: ProcessingStatus) {
    for _ in 0..200 {
        if store.fetch(id).await.unwrap().processing_status == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("item {} never reached {}", id, want);
}

#[tokio::test]
async fn worker_completes_triggered_items() {
    let store = MemoryStore::new();
    let stores = Stores::from_memory(store.clone());
    let events = Arc::new(EventBus::default());
    let orchestrator = orchestrator(&stores, events.clone());

    let handle = WorkerBuilder::from_stores(&stores)
        .with_config(config())
        .with_events(events)
        .with_handler(Arc::new(ProcessContentHandler::new(orchestrator.clone())))
        .build()
        .await
        .start();
    let mut rx = handle.events();

    let item = orchestrator
        .ingest(RawContentItem {
            organization_id: Uuid::new_v4(),
            source_type: SourceType::WikiPage,
            title: "Weekly sync".to_string(),
            body: RawBody::Text("Quick sync about the release.".to_string()),
            metadata: serde_json::Value::Null,
        })
        .await
        .unwrap();
    orchestrator.trigger(item.id).await.unwrap();

    wait_for_status(&store, item.id, ProcessingStatus::Completed).await;
    handle.shutdown().await.unwrap();

    let jobs = JobRepository::list_for_item(&store, item.id).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Completed);

    let mut types = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        types.push(envelope.event_type);
    }
    assert!(types.iter().any(|t| t == "job.started"));
    assert!(types.iter().any(|t| t == "job.completed"));
}

#[tokio::test]
async fn worker_runs_graph_rebuilds() {
    let store = MemoryStore::new();
    let stores = Stores::from_memory(store.clone());
    let events = Arc::new(EventBus::default());
    let orchestrator = orchestrator(&stores, events.clone());
    let shared = Arc::new(store.clone());
    let graph = Arc::new(KnowledgeGraphBuilder::new(
        shared.clone(),
        shared.clone(),
        shared.clone(),
        shared,
    ));

    let handle = WorkerBuilder::from_stores(&stores)
        .with_config(config())
        .with_handler(Arc::new(RebuildGraphHandler::new(graph)))
        .build()
        .await
        .start();

    let org = Uuid::new_v4();
    let job_id = orchestrator.schedule_graph_rebuild(org).await.unwrap();
    assert!(job_id.is_some());
    // A second request while one is queued or running is absorbed.
    let again = orchestrator.schedule_graph_rebuild(org).await.unwrap();

    let job_id = job_id.unwrap();
    for _ in 0..200 {
        let job = JobRepository::get(&store, job_id).await.unwrap().unwrap();
        if job.status == JobStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.shutdown().await.unwrap();

    let job = JobRepository::get(&store, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(again.is_none());
    assert!(TopicRepository::list_for_organization(&store, org)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn disabled_worker_leaves_jobs_queued() {
    let store = MemoryStore::new();
    let stores = Stores::from_memory(store.clone());

    let handle = WorkerBuilder::from_stores(&stores)
        .with_config(config().with_enabled(false))
        .with_handler(Arc::new(NoOpHandler::new(JobType::RebuildKnowledgeGraph)))
        .build()
        .await
        .start();

    store
        .queue(NewJob::rebuild_knowledge_graph(Uuid::new_v4()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(store.pending_count().await.unwrap(), 1);
}
