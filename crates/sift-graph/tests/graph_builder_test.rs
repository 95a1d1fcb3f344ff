//! Topic rebuilds and conflict detection over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sift_core::{
    ConflictType, ContentItemRepository, Decision, DecisionRepository, DecisionStatus, Embedding,
    EmbeddingIndex, EventBus, OwnerType, Result, Topic, TopicRepository, TopicTrend, Vector,
};
use sift_db::test_fixtures::text_item;
use sift_db::MemoryStore;
use sift_graph::{ClusterConfig, GenerationTopicNamer, GraphConfig, KnowledgeGraphBuilder, TopicNamer};
use sift_inference::mock::MockGenerationBackend;
use uuid::Uuid;

fn builder(store: &MemoryStore) -> KnowledgeGraphBuilder {
    let store = Arc::new(store.clone());
    KnowledgeGraphBuilder::new(store.clone(), store.clone(), store.clone(), store)
}

fn chunk(org: Uuid, owner_id: Uuid, vector: Vec<f32>, text: &str) -> Embedding {
    Embedding {
        id: Uuid::new_v4(),
        organization_id: org,
        owner_type: OwnerType::TranscriptChunk,
        owner_id,
        chunk_index: 0,
        vector: Vector::from(vector),
        source_text: text.to_string(),
        source_type: None,
        model: "mock-embed".to_string(),
        created_at: Utc::now(),
    }
}

/// Insert an item with one chunk embedding.
async fn add_item(store: &MemoryStore, org: Uuid, title: &str, text: &str, vector: Vec<f32>) -> Uuid {
    let item = text_item(org, title, text);
    ContentItemRepository::insert(store, &item).await.unwrap();
    store
        .replace_for_owner(
            OwnerType::TranscriptChunk,
            item.id,
            vec![chunk(org, item.id, vector, text)],
        )
        .await
        .unwrap();
    item.id
}

/// Five storage items and two unrelated hiring items.
async fn seed_groups(store: &MemoryStore, org: Uuid) {
    for i in 0..5 {
        add_item(
            store,
            org,
            &format!("Storage sync {}", i),
            "postgres migration storage schema",
            vec![1.0, 0.01 * i as f32, 0.0],
        )
        .await;
    }
    for i in 0..2 {
        add_item(
            store,
            org,
            &format!("Hiring {}", i),
            "interviews offers recruiting",
            vec![0.0, 1.0, 0.01 * i as f32],
        )
        .await;
    }
}

#[tokio::test]
async fn small_groups_do_not_become_topics() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    seed_groups(&store, org).await;

    let graph = builder(&store);
    let summary = graph.rebuild_topics(org).await.unwrap();
    assert_eq!(summary.topic_count, 1);
    assert_eq!(summary.created, 1);

    let topics = graph.list_topics(org).await.unwrap();
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].content_count, 5);
    assert_eq!(topics[0].keywords[0], "storage");
    // All five were created just now.
    assert_eq!(topics[0].trend, TopicTrend::Rising);
}

#[tokio::test]
async fn rebuild_keeps_matched_topic_identity() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    seed_groups(&store, org).await;
    let graph = builder(&store);

    graph.rebuild_topics(org).await.unwrap();
    let first = graph.list_topics(org).await.unwrap();

    add_item(
        &store,
        org,
        "Storage sync 6",
        "postgres migration storage",
        vec![1.0, 0.05, 0.0],
    )
    .await;
    let summary = graph.rebuild_topics(org).await.unwrap();
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.created, 0);

    let second = graph.list_topics(org).await.unwrap();
    assert_eq!(second[0].id, first[0].id);
    assert_eq!(second[0].name, first[0].name);
    assert_eq!(second[0].content_count, 6);
}

#[tokio::test]
async fn topics_without_a_cluster_are_removed() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let now = Utc::now();
    store
        .upsert(&Topic {
            id: Uuid::new_v4(),
            organization_id: org,
            name: "Office Move".to_string(),
            normalized_name: "office move".to_string(),
            keywords: vec!["office".to_string(), "lease".to_string()],
            content_count: 4,
            content_item_ids: vec![],
            trend: TopicTrend::Stable,
            trend_score: 0.0,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    seed_groups(&store, org).await;

    let summary = builder(&store).rebuild_topics(org).await.unwrap();
    assert_eq!(summary.removed, 1);
    let names: Vec<String> = TopicRepository::list_for_organization(&store, org)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert!(!names.contains(&"Office Move".to_string()));
}

#[tokio::test]
async fn model_names_new_topics() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    seed_groups(&store, org).await;

    let backend = MockGenerationBackend::new(r#"{"name": "Storage Migration"}"#);
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    let graph = builder(&store)
        .with_namer(Arc::new(GenerationTopicNamer::new(Arc::new(backend.clone()))))
        .with_events(events);

    graph.rebuild_topics(org).await.unwrap();
    let topics = graph.list_topics(org).await.unwrap();
    assert_eq!(topics[0].name, "Storage Migration");
    assert_eq!(topics[0].normalized_name, "storage migration");
    assert_eq!(backend.call_count(), 1);

    let event = rx.recv().await.unwrap();
    assert_eq!(event.event_type, "graph.rebuilt");
}

struct SlowNamer;

#[async_trait]
impl TopicNamer for SlowNamer {
    async fn name(&self, _keywords: &[String], _titles: &[String]) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("Too Late".to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn naming_timeout_falls_back_to_keywords() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    seed_groups(&store, org).await;

    let graph = builder(&store)
        .with_namer(Arc::new(SlowNamer))
        .with_config(GraphConfig::default().with_naming_timeout(Duration::from_secs(1)));

    let summary = graph.rebuild_topics(org).await.unwrap();
    assert_eq!(summary.topic_count, 1);
    let topics = graph.list_topics(org).await.unwrap();
    assert_ne!(topics[0].name, "Too Late");
    assert_eq!(topics[0].name, "Storage Migration Postgres");
}

#[tokio::test]
async fn lower_min_cluster_size_keeps_both_groups() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    seed_groups(&store, org).await;

    let graph = builder(&store).with_config(
        GraphConfig::default().with_clustering(ClusterConfig::default().with_min_cluster_size(2)),
    );
    let summary = graph.rebuild_topics(org).await.unwrap();
    assert_eq!(summary.topic_count, 2);
    let topics = graph.list_topics(org).await.unwrap();
    assert_eq!(topics[0].content_count, 5);
    assert_eq!(topics[1].content_count, 2);
}

fn decision(org: Uuid, summary: &str, days_ago: i64) -> Decision {
    let at = Utc::now() - chrono::Duration::days(days_ago);
    Decision {
        id: Uuid::new_v4(),
        organization_id: org,
        content_item_id: None,
        summary: summary.to_string(),
        context: None,
        status: DecisionStatus::Decided,
        decided_at: Some(at),
        tags: vec![],
        created_at: at,
    }
}

async fn add_decision(store: &MemoryStore, d: &Decision, vector: Vec<f32>) {
    DecisionRepository::insert(store, d).await.unwrap();
    let mut e = chunk(d.organization_id, d.id, vector, &d.summary);
    e.owner_type = OwnerType::Decision;
    store
        .replace_for_owner(OwnerType::Decision, d.id, vec![e])
        .await
        .unwrap();
}

#[tokio::test]
async fn contradicting_storage_decisions_are_reported_once() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let d1 = decision(org, "We decided to use Postgres for storage", 14);
    let d2 = decision(org, "We will use MongoDB for storage", 1);
    let unrelated = decision(org, "Offsite is in Lisbon this year", 5);
    add_decision(&store, &d1, vec![0.9, 0.1, 0.0]).await;
    add_decision(&store, &d2, vec![0.85, 0.15, 0.0]).await;
    add_decision(&store, &unrelated, vec![0.0, 0.0, 1.0]).await;

    let conflicts = builder(&store).detect_conflicts(org).await.unwrap();
    assert_eq!(conflicts.len(), 1);
    let c = &conflicts[0];
    assert_eq!(c.conflict_type, ConflictType::DirectContradiction);
    assert_eq!((c.decision_a, c.decision_b), (d1.id, d2.id));
    assert!(c.confidence > 0.5);
    assert!(c.similarity >= 0.75);
}

#[tokio::test]
async fn decisions_without_vectors_are_skipped() {
    let store = MemoryStore::new();
    let org = Uuid::new_v4();
    let d1 = decision(org, "Use Postgres for storage", 3);
    let d2 = decision(org, "Use MongoDB for storage", 1);
    add_decision(&store, &d1, vec![1.0, 0.0]).await;
    DecisionRepository::insert(&store, &d2).await.unwrap();

    assert!(builder(&store).detect_conflicts(org).await.unwrap().is_empty());
}
