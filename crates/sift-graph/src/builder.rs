//! Knowledge graph rebuilds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use sift_core::{
    defaults, new_v7, normalize_name, ContentItem, ContentItemRepository, DecisionConflict,
    DecisionRepository, EmbeddingIndex, EventBus, OwnerType, Result, ServerEvent, Topic,
    TopicRepository,
};

use crate::clustering::{cluster_items, item_centroids, Cluster, ClusterConfig};
use crate::conflicts::ConflictDetector;
use crate::keywords::{keyword_name, top_keywords};
use crate::topics::{compute_trend, match_topic, TopicNamer};

/// Titles passed to the namer per cluster.
const NAMING_SAMPLE_TITLES: usize = 5;

/// Knowledge graph parameters.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub clustering: ClusterConfig,
    pub keyword_overlap: f32,
    pub keyword_count: usize,
    pub naming_timeout: Duration,
    pub conflict_floor: f32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            clustering: ClusterConfig::default(),
            keyword_overlap: defaults::TOPIC_KEYWORD_OVERLAP,
            keyword_count: defaults::TOPIC_KEYWORD_COUNT,
            naming_timeout: Duration::from_secs(defaults::TOPIC_NAMING_TIMEOUT_SECS),
            conflict_floor: defaults::CONFLICT_SIMILARITY_FLOOR,
        }
    }
}

impl GraphConfig {
    /// Load from environment, falling back to defaults for unset or
    /// unparseable values.
    pub fn from_env() -> Self {
        fn parse<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok().and_then(|v| v.parse().ok())
        }

        let base = Self::default();
        let mut clustering = base.clustering.clone();
        if let Some(t) = parse::<f32>("TOPIC_SIMILARITY_THRESHOLD") {
            clustering = clustering.with_similarity_threshold(t);
        }
        if let Some(n) = parse::<usize>("TOPIC_MIN_CLUSTER_SIZE") {
            clustering = clustering.with_min_cluster_size(n);
        }
        if let Some(n) = parse::<usize>("TOPIC_MAX_CLUSTERS") {
            clustering = clustering.with_max_clusters(n);
        }
        Self {
            clustering,
            conflict_floor: parse("CONFLICT_SIMILARITY_FLOOR").unwrap_or(base.conflict_floor),
            ..base
        }
    }

    pub fn with_clustering(mut self, clustering: ClusterConfig) -> Self {
        self.clustering = clustering;
        self
    }

    pub fn with_naming_timeout(mut self, timeout: Duration) -> Self {
        self.naming_timeout = timeout;
        self
    }

    pub fn with_conflict_floor(mut self, floor: f32) -> Self {
        self.conflict_floor = floor;
        self
    }
}

/// Outcome of a topic rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub topic_count: usize,
    pub created: usize,
    pub matched: usize,
    pub removed: u64,
}

/// Builds topics and detects decision conflicts for an organization.
///
/// Everything derived here is recomputed from the current items, embeddings
/// and decisions; nothing feeds back into item processing state.
pub struct KnowledgeGraphBuilder {
    items: Arc<dyn ContentItemRepository>,
    embeddings: Arc<dyn EmbeddingIndex>,
    topics: Arc<dyn TopicRepository>,
    decisions: Arc<dyn DecisionRepository>,
    namer: Option<Arc<dyn TopicNamer>>,
    events: Option<Arc<EventBus>>,
    config: GraphConfig,
}

impl KnowledgeGraphBuilder {
    pub fn new(
        items: Arc<dyn ContentItemRepository>,
        embeddings: Arc<dyn EmbeddingIndex>,
        topics: Arc<dyn TopicRepository>,
        decisions: Arc<dyn DecisionRepository>,
    ) -> Self {
        Self {
            items,
            embeddings,
            topics,
            decisions,
            namer: None,
            events: None,
            config: GraphConfig::default(),
        }
    }

    pub fn with_namer(mut self, namer: Arc<dyn TopicNamer>) -> Self {
        self.namer = Some(namer);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Topics of an organization, largest first.
    pub async fn list_topics(&self, organization_id: Uuid) -> Result<Vec<Topic>> {
        self.topics.list_for_organization(organization_id).await
    }

    /// Recluster an organization's items into topics.
    ///
    /// Clusters that continue an existing topic keep its id and name; new
    /// clusters create topics; topics without a cluster are removed.
    #[instrument(skip(self), fields(subsystem = "graph", component = "builder", op = "rebuild_topics", organization_id = %organization_id))]
    pub async fn rebuild_topics(&self, organization_id: Uuid) -> Result<RebuildSummary> {
        let start = Instant::now();

        let chunks = self
            .embeddings
            .list_for_organization(organization_id, OwnerType::TranscriptChunk)
            .await?;
        let centroids = item_centroids(&chunks);
        let clusters = cluster_items(&centroids, &self.config.clustering);
        debug!(
            item_count = centroids.len(),
            cluster_count = clusters.len(),
            "Clustered items"
        );

        let member_ids: Vec<Uuid> = clusters.iter().flat_map(|c| c.item_ids.clone()).collect();
        let items: HashMap<Uuid, ContentItem> = self
            .items
            .get_many(&member_ids)
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();
        let mut chunk_text: HashMap<Uuid, Vec<&str>> = HashMap::new();
        for chunk in &chunks {
            chunk_text
                .entry(chunk.owner_id)
                .or_default()
                .push(chunk.source_text.as_str());
        }

        let existing = self.topics.list_for_organization(organization_id).await?;
        let now = Utc::now();
        let mut kept: Vec<Uuid> = Vec::new();
        let mut taken_names: Vec<String> = Vec::new();
        let mut summary = RebuildSummary::default();

        for cluster in &clusters {
            let members: Vec<&ContentItem> = cluster
                .item_ids
                .iter()
                .filter_map(|id| items.get(id))
                .collect();
            let keywords = cluster_keywords(cluster, &members, &chunk_text, self.config.keyword_count);
            let fallback = keyword_name(&keywords);

            let (trend, trend_score) = compute_trend(
                &members.iter().map(|m| m.created_at).collect::<Vec<_>>(),
                now,
            );

            let mut found = match_topic(
                &fallback,
                &keywords,
                &existing,
                &kept,
                self.config.keyword_overlap,
            );
            let mut name = None;
            if found.is_none() {
                let titles: Vec<String> = members
                    .iter()
                    .take(NAMING_SAMPLE_TITLES)
                    .map(|m| m.title.clone())
                    .collect();
                let named = self.name_cluster(&keywords, &titles, &fallback).await;
                // The model may pick the name of a topic we have not matched yet.
                let normalized = normalize_name(&named);
                found = existing
                    .iter()
                    .find(|t| !kept.contains(&t.id) && t.normalized_name == normalized);
                name = Some(named);
            }

            let topic = match (found, name) {
                (Some(found), _) => {
                    summary.matched += 1;
                    Topic {
                        keywords: keywords.clone(),
                        content_count: cluster.len() as i32,
                        content_item_ids: cluster.item_ids.clone(),
                        trend,
                        trend_score,
                        updated_at: now,
                        ..found.clone()
                    }
                }
                (None, named) => {
                    let reserved: Vec<String> = taken_names
                        .iter()
                        .cloned()
                        .chain(existing.iter().map(|t| t.normalized_name.clone()))
                        .collect();
                    let name = unique_name(named.unwrap_or(fallback), &keywords, &reserved);
                    summary.created += 1;
                    Topic {
                        id: new_v7(),
                        organization_id,
                        normalized_name: normalize_name(&name),
                        name,
                        keywords: keywords.clone(),
                        content_count: cluster.len() as i32,
                        content_item_ids: cluster.item_ids.clone(),
                        trend,
                        trend_score,
                        created_at: now,
                        updated_at: now,
                    }
                }
            };

            taken_names.push(topic.normalized_name.clone());
            kept.push(topic.id);
            self.topics.upsert(&topic).await?;
        }

        summary.removed = self.topics.retain(organization_id, &kept).await?;
        summary.topic_count = kept.len();

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            topic_count = summary.topic_count,
            created = summary.created,
            matched = summary.matched,
            removed = summary.removed,
            duration_ms,
            "Topics rebuilt"
        );
        if let Some(events) = &self.events {
            events.emit(ServerEvent::GraphRebuilt {
                organization_id,
                topic_count: summary.topic_count,
                created: summary.created,
                matched: summary.matched,
            });
        }
        Ok(summary)
    }

    /// AI name with a deadline; any failure yields `fallback`.
    async fn name_cluster(&self, keywords: &[String], titles: &[String], fallback: &str) -> String {
        let Some(namer) = &self.namer else {
            return fallback.to_string();
        };
        match tokio::time::timeout(self.config.naming_timeout, namer.name(keywords, titles)).await {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                warn!(error = %e, fallback, "Topic naming failed, using keywords");
                fallback.to_string()
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.naming_timeout.as_millis() as u64,
                    fallback, "Topic naming timed out, using keywords"
                );
                fallback.to_string()
            }
        }
    }

    /// Conflicts among an organization's decisions.
    ///
    /// Decisions without a stored summary embedding are not compared.
    #[instrument(skip(self), fields(subsystem = "graph", component = "conflicts", op = "detect_conflicts", organization_id = %organization_id))]
    pub async fn detect_conflicts(&self, organization_id: Uuid) -> Result<Vec<DecisionConflict>> {
        let decisions = self.decisions.list_for_organization(organization_id).await?;
        let vectors: HashMap<Uuid, Vec<f32>> = self
            .embeddings
            .list_for_organization(organization_id, OwnerType::Decision)
            .await?
            .into_iter()
            .filter(|e| e.chunk_index == 0)
            .map(|e| (e.owner_id, e.vector.to_vec()))
            .collect();

        let conflicts = ConflictDetector::new(self.config.conflict_floor).detect(&decisions, &vectors);
        debug!(
            decision_count = decisions.len(),
            conflict_count = conflicts.len(),
            "Conflict detection complete"
        );
        Ok(conflicts)
    }
}

fn cluster_keywords(
    cluster: &Cluster,
    members: &[&ContentItem],
    chunk_text: &HashMap<Uuid, Vec<&str>>,
    limit: usize,
) -> Vec<String> {
    let mut texts: Vec<&str> = Vec::new();
    for member in members {
        texts.push(member.title.as_str());
        if let Some(summary) = &member.summary {
            texts.push(summary.as_str());
        }
        texts.extend(member.tags.iter().map(String::as_str));
    }
    for id in &cluster.item_ids {
        if let Some(chunks) = chunk_text.get(id) {
            texts.extend(chunks.iter().copied());
        }
    }
    top_keywords(texts, limit)
}

/// Make `name` unique among `taken` normalized names, appending further
/// keywords, then a counter.
fn unique_name(name: String, keywords: &[String], taken: &[String]) -> String {
    let is_taken = |candidate: &str| taken.contains(&normalize_name(candidate));
    if !is_taken(&name) {
        return name;
    }
    for keyword in keywords.iter().skip(3) {
        let candidate = format!("{} {}", name, keyword);
        if !is_taken(&candidate) {
            return candidate;
        }
    }
    let mut n = 2;
    loop {
        let candidate = format!("{} {}", name, n);
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_name_appends_keywords_then_counter() {
        let kw: Vec<String> = ["a", "b", "c", "extra"].iter().map(|s| s.to_string()).collect();
        let taken = vec!["billing".to_string(), "billing extra".to_string()];
        assert_eq!(unique_name("Billing".into(), &kw, &taken), "Billing 2");
        assert_eq!(unique_name("Hiring".into(), &kw, &taken), "Hiring");

        let taken = vec!["billing".to_string()];
        assert_eq!(unique_name("Billing".into(), &kw, &taken), "Billing extra");
    }

    #[test]
    fn test_config_defaults() {
        let config = GraphConfig::default();
        assert_eq!(config.clustering.min_cluster_size, defaults::TOPIC_MIN_CLUSTER_SIZE);
        assert_eq!(config.conflict_floor, defaults::CONFLICT_SIMILARITY_FLOOR);
    }
}
