//! In-memory implementation of every repository trait.
//!
//! Mirrors the PostgreSQL semantics (compare-and-set status writes, atomic
//! embedding replacement, job deduplication) so the pipeline can run without a
//! database, in tests and in `--in-memory` mode. Each operation takes the state
//! lock once, so multi-row writes are atomic with respect to readers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use sift_core::{
    cosine_similarity, defaults, new_v7, ActionItem, ActionItemMerge, ActionItemRepository,
    ActionItemUpdate, Chapter, ContentItem, ContentItemRepository, Decision, DecisionRepository,
    Embedding, EmbeddingIndex, EmbeddingMatch, EmbeddingQuery, Error, Job, JobRepository,
    JobStatus, JobType, NewJob, OrgSettings, OrgSettingsRepository, OwnerType,
    ProcessingStatus, Result, StageFailure, Topic, TopicRepository, TranscriptSegment,
    TranscriptionOutput, Vector,
};

#[derive(Default)]
struct State {
    items: HashMap<Uuid, ContentItem>,
    action_items: HashMap<Uuid, ActionItem>,
    embeddings: HashMap<(OwnerType, Uuid), Vec<Embedding>>,
    decisions: HashMap<Uuid, Decision>,
    topics: HashMap<Uuid, Topic>,
    settings: HashMap<Uuid, OrgSettings>,
    jobs: HashMap<Uuid, Job>,
}

/// Shared in-memory store. Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    notify: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the job notification handle for event-driven waking.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn item_mut<'a>(state: &'a mut State, id: Uuid) -> Result<&'a mut ContentItem> {
        state.items.get_mut(&id).ok_or(Error::ItemNotFound(id))
    }
}

// =============================================================================
// CONTENT ITEMS
// =============================================================================

#[async_trait]
impl ContentItemRepository for MemoryStore {
    async fn insert(&self, item: &ContentItem) -> Result<()> {
        let mut state = self.state.write().await;
        if state.items.contains_key(&item.id) {
            return Err(Error::InvalidInput(format!("duplicate item id {}", item.id)));
        }
        state.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ContentItem>> {
        Ok(self.state.read().await.items.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<ContentItem>> {
        let state = self.state.read().await;
        let mut items: Vec<ContentItem> = ids
            .iter()
            .filter_map(|id| state.items.get(id).cloned())
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        items.dedup_by_key(|i| i.id);
        Ok(items)
    }

    async fn list_for_organization(&self, organization_id: Uuid) -> Result<Vec<ContentItem>> {
        let state = self.state.read().await;
        let mut items: Vec<ContentItem> = state
            .items
            .values()
            .filter(|i| i.organization_id == organization_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn list_organization_ids(&self) -> Result<Vec<Uuid>> {
        let state = self.state.read().await;
        let mut ids: Vec<Uuid> = state.items.values().map(|i| i.organization_id).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[ProcessingStatus],
        to: ProcessingStatus,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let item = Self::item_mut(&mut state, id)?;
        if !from.contains(&item.processing_status) {
            return Ok(false);
        }
        item.processing_status = to;
        item.updated_at = Utc::now();
        if to != ProcessingStatus::Failed {
            item.processing_error = None;
            item.failed_stage = None;
            item.failure_kind = None;
        }
        Ok(true)
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        expected: ProcessingStatus,
        failure: &StageFailure,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let item = Self::item_mut(&mut state, id)?;
        if item.processing_status != expected {
            return Ok(false);
        }
        item.processing_status = ProcessingStatus::Failed;
        item.processing_error = Some(failure.message.clone());
        item.failed_stage = Some(failure.step);
        item.failure_kind = Some(failure.kind);
        item.attempt += 1;
        item.updated_at = Utc::now();
        Ok(true)
    }

    async fn save_transcription(&self, id: Uuid, output: &TranscriptionOutput) -> Result<()> {
        let mut state = self.state.write().await;
        let item = Self::item_mut(&mut state, id)?;
        item.transcript = Some(output.transcript.clone());
        item.transcript_segments = Some(output.segments.clone());
        item.speaker_count = output.speaker_count;
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn save_segments(&self, id: Uuid, segments: &[TranscriptSegment]) -> Result<()> {
        let mut state = self.state.write().await;
        let item = Self::item_mut(&mut state, id)?;
        item.transcript_segments = Some(segments.to_vec());
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn save_analysis(
        &self,
        id: Uuid,
        summary: &str,
        tags: &[String],
        chapters: &[Chapter],
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let item = Self::item_mut(&mut state, id)?;
        item.summary = Some(summary.to_string());
        item.tags = tags.to_vec();
        item.chapters = chapters.to_vec();
        item.updated_at = Utc::now();
        Ok(())
    }
}

// =============================================================================
// ACTION ITEMS
// =============================================================================

#[async_trait]
impl ActionItemRepository for MemoryStore {
    async fn list_for_item(&self, content_item_id: Uuid) -> Result<Vec<ActionItem>> {
        let state = self.state.read().await;
        let mut items: Vec<ActionItem> = state
            .action_items
            .values()
            .filter(|a| a.content_item_id == content_item_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.timestamp_start
                .unwrap_or(f64::MAX)
                .total_cmp(&b.timestamp_start.unwrap_or(f64::MAX))
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(items)
    }

    async fn apply_merge(&self, merge: &ActionItemMerge) -> Result<()> {
        let mut state = self.state.write().await;
        for id in &merge.deletes {
            if state
                .action_items
                .get(id)
                .is_some_and(|a| a.content_item_id == merge.content_item_id)
            {
                state.action_items.remove(id);
            }
        }
        for item in &merge.upserts {
            match state.action_items.get_mut(&item.id) {
                Some(stored) => {
                    // User-owned columns stay as stored.
                    let status = stored.status;
                    let assignee = stored.assignee.clone();
                    let touched = stored.user_modified_fields.clone();
                    *stored = item.clone();
                    stored.status = status;
                    stored.user_modified_fields = touched;
                    if stored.is_user_modified(ActionItem::FIELD_ASSIGNEE) {
                        stored.assignee = assignee;
                    }
                }
                None => {
                    state.action_items.insert(item.id, item.clone());
                }
            }
        }
        Ok(())
    }

    async fn update_by_user(&self, id: Uuid, update: &ActionItemUpdate) -> Result<ActionItem> {
        let mut state = self.state.write().await;
        let item = state
            .action_items
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("action item {}", id)))?;
        if let Some(status) = update.status {
            item.status = status;
            if !item.is_user_modified(ActionItem::FIELD_STATUS) {
                item.user_modified_fields
                    .push(ActionItem::FIELD_STATUS.to_string());
            }
        }
        if let Some(assignee) = &update.assignee {
            item.assignee = assignee.clone();
            if !item.is_user_modified(ActionItem::FIELD_ASSIGNEE) {
                item.user_modified_fields
                    .push(ActionItem::FIELD_ASSIGNEE.to_string());
            }
        }
        item.user_modified_fields.sort();
        item.updated_at = Utc::now();
        Ok(item.clone())
    }
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

#[async_trait]
impl EmbeddingIndex for MemoryStore {
    async fn replace_for_owner(
        &self,
        owner_type: OwnerType,
        owner_id: Uuid,
        embeddings: Vec<Embedding>,
    ) -> Result<()> {
        if let Some(stray) = embeddings
            .iter()
            .find(|e| e.owner_type != owner_type || e.owner_id != owner_id)
        {
            return Err(Error::InvalidInput(format!(
                "embedding {} does not belong to {} {}",
                stray.id, owner_type, owner_id
            )));
        }
        let mut state = self.state.write().await;
        if embeddings.is_empty() {
            state.embeddings.remove(&(owner_type, owner_id));
        } else {
            let mut embeddings = embeddings;
            embeddings.sort_by_key(|e| e.chunk_index);
            state.embeddings.insert((owner_type, owner_id), embeddings);
        }
        Ok(())
    }

    async fn delete_for_owner(&self, owner_type: OwnerType, owner_id: Uuid) -> Result<()> {
        self.state
            .write()
            .await
            .embeddings
            .remove(&(owner_type, owner_id));
        Ok(())
    }

    async fn for_owner(&self, owner_type: OwnerType, owner_id: Uuid) -> Result<Vec<Embedding>> {
        Ok(self
            .state
            .read()
            .await
            .embeddings
            .get(&(owner_type, owner_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_for_organization(
        &self,
        organization_id: Uuid,
        owner_type: OwnerType,
    ) -> Result<Vec<Embedding>> {
        let state = self.state.read().await;
        let mut out: Vec<Embedding> = state
            .embeddings
            .iter()
            .filter(|((t, _), _)| *t == owner_type)
            .flat_map(|(_, set)| set.iter())
            .filter(|e| e.organization_id == organization_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.owner_id.cmp(&b.owner_id).then(a.chunk_index.cmp(&b.chunk_index)));
        Ok(out)
    }

    async fn query(&self, vector: &Vector, query: &EmbeddingQuery) -> Result<Vec<EmbeddingMatch>> {
        let state = self.state.read().await;
        let needle = vector.as_slice();
        let mut hits: Vec<EmbeddingMatch> = state
            .embeddings
            .values()
            .flat_map(|set| set.iter())
            .filter(|e| query.matches(e))
            .filter_map(|e| {
                let score = cosine_similarity(needle, e.vector.as_slice());
                (score >= query.threshold).then(|| EmbeddingMatch {
                    embedding: e.clone(),
                    score,
                })
            })
            .collect();
        drop(state);

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.embedding.created_at.cmp(&a.embedding.created_at))
                .then(a.embedding.owner_id.cmp(&b.embedding.owner_id))
                .then(a.embedding.chunk_index.cmp(&b.embedding.chunk_index))
        });
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn count(&self, organization_id: Uuid) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .embeddings
            .values()
            .flat_map(|set| set.iter())
            .filter(|e| e.organization_id == organization_id)
            .count() as i64)
    }
}

// =============================================================================
// DECISIONS, TOPICS, SETTINGS
// =============================================================================

#[async_trait]
impl DecisionRepository for MemoryStore {
    async fn insert(&self, decision: &Decision) -> Result<()> {
        self.state
            .write()
            .await
            .decisions
            .insert(decision.id, decision.clone());
        Ok(())
    }

    async fn replace_for_item(
        &self,
        content_item_id: Uuid,
        decisions: &[Decision],
    ) -> Result<Vec<Uuid>> {
        let mut state = self.state.write().await;
        let mut removed: Vec<Uuid> = state
            .decisions
            .values()
            .filter(|d| d.content_item_id == Some(content_item_id))
            .map(|d| d.id)
            .collect();
        removed.sort();
        for id in &removed {
            state.decisions.remove(id);
        }
        for decision in decisions {
            state.decisions.insert(decision.id, decision.clone());
        }
        Ok(removed)
    }

    async fn list_for_organization(&self, organization_id: Uuid) -> Result<Vec<Decision>> {
        let state = self.state.read().await;
        let mut out: Vec<Decision> = state
            .decisions
            .values()
            .filter(|d| d.organization_id == organization_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.effective_at().cmp(&b.effective_at()).then(a.id.cmp(&b.id)));
        Ok(out)
    }
}

#[async_trait]
impl TopicRepository for MemoryStore {
    async fn list_for_organization(&self, organization_id: Uuid) -> Result<Vec<Topic>> {
        let state = self.state.read().await;
        let mut out: Vec<Topic> = state
            .topics
            .values()
            .filter(|t| t.organization_id == organization_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.content_count
                .cmp(&a.content_count)
                .then(a.normalized_name.cmp(&b.normalized_name))
        });
        Ok(out)
    }

    async fn upsert(&self, topic: &Topic) -> Result<()> {
        let mut state = self.state.write().await;
        let clash = state.topics.values().any(|t| {
            t.id != topic.id
                && t.organization_id == topic.organization_id
                && t.normalized_name == topic.normalized_name
        });
        if clash {
            return Err(Error::InvalidInput(format!(
                "topic name already exists: {}",
                topic.normalized_name
            )));
        }
        let mut stored = topic.clone();
        if let Some(existing) = state.topics.get(&topic.id) {
            stored.created_at = existing.created_at;
        }
        state.topics.insert(topic.id, stored);
        Ok(())
    }

    async fn retain(&self, organization_id: Uuid, keep: &[Uuid]) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.topics.len();
        state
            .topics
            .retain(|id, t| t.organization_id != organization_id || keep.contains(id));
        Ok((before - state.topics.len()) as u64)
    }
}

#[async_trait]
impl OrgSettingsRepository for MemoryStore {
    async fn get(&self, organization_id: Uuid) -> Result<Option<OrgSettings>> {
        Ok(self
            .state
            .read()
            .await
            .settings
            .get(&organization_id)
            .cloned())
    }

    async fn upsert(&self, settings: &OrgSettings) -> Result<()> {
        self.state
            .write()
            .await
            .settings
            .insert(settings.organization_id, settings.clone());
        Ok(())
    }
}

// =============================================================================
// JOBS
// =============================================================================

impl MemoryStore {
    fn build_job(job: NewJob) -> Job {
        let now = Utc::now();
        Job {
            id: new_v7(),
            content_item_id: job.content_item_id,
            organization_id: job.organization_id,
            job_type: job.job_type,
            status: JobStatus::Pending,
            priority: job.priority,
            payload: job.payload,
            error_message: None,
            retry_count: 0,
            max_retries: defaults::JOB_MAX_RETRIES,
            run_after: now,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn queue(&self, job: NewJob) -> Result<Uuid> {
        let job = Self::build_job(job);
        let id = job.id;
        self.state.write().await.jobs.insert(id, job);
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn queue_deduplicated(&self, job: NewJob) -> Result<Option<Uuid>> {
        let mut state = self.state.write().await;
        let duplicate = state.jobs.values().any(|j| {
            j.job_type == job.job_type
                && j.status == JobStatus::Pending
                && j.content_item_id == job.content_item_id
                && j.organization_id == job.organization_id
        });
        if duplicate {
            return Ok(None);
        }
        let job = Self::build_job(job);
        let id = job.id;
        state.jobs.insert(id, job);
        drop(state);
        self.notify.notify_waiters();
        Ok(Some(id))
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let next = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.run_after <= now)
            .filter(|j| job_types.is_empty() || job_types.contains(&j.job_type))
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            state.jobs.get_mut(&id).map(|job| {
                job.status = JobStatus::Running;
                job.started_at = Some(now);
                job.clone()
            })
        }))
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.error_message = None;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str, retry_delay: Duration) -> Result<JobStatus> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
        job.error_message = Some(error.to_string());
        if job.retry_count < job.max_retries {
            job.retry_count += 1;
            job.status = JobStatus::Pending;
            job.started_at = None;
            job.run_after = now
                + chrono::Duration::from_std(retry_delay)
                    .map_err(|e| Error::Internal(e.to_string()))?;
        } else {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
        }
        Ok(job.status)
    }

    async fn requeue_stale(&self, older_than: Duration) -> Result<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than).map_err(|e| Error::Internal(e.to_string()))?;
        let mut state = self.state.write().await;
        let mut requeued = 0;
        for job in state.jobs.values_mut() {
            if job.status == JobStatus::Running && job.started_at.is_some_and(|s| s < cutoff) {
                job.status = JobStatus::Pending;
                job.started_at = None;
                requeued += 1;
            }
        }
        drop(state);
        if requeued > 0 {
            self.notify.notify_waiters();
        }
        Ok(requeued)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.state.read().await.jobs.get(&job_id).cloned())
    }

    async fn list_for_item(&self, content_item_id: Uuid) -> Result<Vec<Job>> {
        let state = self.state.read().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| j.content_item_id == Some(content_item_id))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }

    async fn pending_count(&self) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::{FailureKind, PipelineStep, RawBody, RawContentItem, SourceType};

    fn item(org: Uuid) -> ContentItem {
        ContentItem::from_raw(
            RawContentItem {
                organization_id: org,
                source_type: SourceType::ChatThread,
                title: "thread".to_string(),
                body: RawBody::Text("hello there".to_string()),
                metadata: serde_json::Value::Null,
            },
            Utc::now(),
        )
    }

    fn embedding(org: Uuid, owner: Uuid, index: i32, v: Vec<f32>) -> Embedding {
        Embedding {
            id: Uuid::new_v4(),
            organization_id: org,
            owner_type: OwnerType::TranscriptChunk,
            owner_id: owner,
            chunk_index: index,
            vector: Vector::from(v),
            source_text: format!("chunk {}", index),
            source_type: Some(SourceType::Video),
            model: "test".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let store = MemoryStore::new();
        let it = item(Uuid::new_v4());
        ContentItemRepository::insert(&store, &it).await.unwrap();

        let first = store
            .transition(it.id, &[ProcessingStatus::Pending], ProcessingStatus::Analyzing)
            .await
            .unwrap();
        let second = store
            .transition(it.id, &[ProcessingStatus::Pending], ProcessingStatus::Analyzing)
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn test_mark_failed_increments_attempt_and_clears_on_restart() {
        let store = MemoryStore::new();
        let it = item(Uuid::new_v4());
        ContentItemRepository::insert(&store, &it).await.unwrap();
        store
            .transition(it.id, &[ProcessingStatus::Pending], ProcessingStatus::Analyzing)
            .await
            .unwrap();

        let failure = StageFailure {
            step: PipelineStep::Analysis,
            kind: FailureKind::Retryable,
            message: "model timeout".to_string(),
        };
        assert!(store
            .mark_failed(it.id, ProcessingStatus::Analyzing, &failure)
            .await
            .unwrap());
        let failed = store.fetch(it.id).await.unwrap();
        assert_eq!(failed.attempt, 1);
        assert_eq!(failed.failed_stage, Some(PipelineStep::Analysis));

        store
            .transition(it.id, &[ProcessingStatus::Failed], ProcessingStatus::Analyzing)
            .await
            .unwrap();
        let restarted = store.fetch(it.id).await.unwrap();
        assert!(restarted.processing_error.is_none());
        assert_eq!(restarted.attempt, 1);
    }

    #[tokio::test]
    async fn test_query_threshold_and_tie_break() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        let older = Uuid::new_v4();
        let newer = Uuid::new_v4();
        let far = Uuid::new_v4();

        let mut old_e = embedding(org, older, 0, vec![1.0, 0.0]);
        old_e.created_at = Utc::now() - chrono::Duration::days(3);
        store
            .replace_for_owner(OwnerType::TranscriptChunk, older, vec![old_e])
            .await
            .unwrap();
        store
            .replace_for_owner(
                OwnerType::TranscriptChunk,
                newer,
                vec![embedding(org, newer, 0, vec![2.0, 0.0])],
            )
            .await
            .unwrap();
        store
            .replace_for_owner(
                OwnerType::TranscriptChunk,
                far,
                vec![embedding(org, far, 0, vec![0.0, 1.0])],
            )
            .await
            .unwrap();

        let hits = store
            .query(
                &Vector::from(vec![1.0, 0.0]),
                &EmbeddingQuery::new(org).with_threshold(0.9),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].embedding.owner_id, newer);
        assert_eq!(hits[1].embedding.owner_id, older);
    }

    #[tokio::test]
    async fn test_replace_rejects_foreign_embeddings_without_partial_write() {
        let store = MemoryStore::new();
        let org = Uuid::new_v4();
        let owner = Uuid::new_v4();
        store
            .replace_for_owner(
                OwnerType::TranscriptChunk,
                owner,
                vec![embedding(org, owner, 0, vec![1.0])],
            )
            .await
            .unwrap();

        let result = store
            .replace_for_owner(
                OwnerType::TranscriptChunk,
                owner,
                vec![
                    embedding(org, owner, 0, vec![0.5]),
                    embedding(org, Uuid::new_v4(), 1, vec![0.5]),
                ],
            )
            .await;
        assert!(result.is_err());
        let kept = store
            .for_owner(OwnerType::TranscriptChunk, owner)
            .await
            .unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].vector.as_slice(), &[1.0]);
    }

    #[tokio::test]
    async fn test_job_dedup_and_retry() {
        let store = MemoryStore::new();
        let item_id = Uuid::new_v4();
        let org = Uuid::new_v4();

        let first = store
            .queue_deduplicated(NewJob::process_content(item_id, org))
            .await
            .unwrap();
        let dup = store
            .queue_deduplicated(NewJob::process_content(item_id, org))
            .await
            .unwrap();
        assert!(first.is_some());
        assert!(dup.is_none());

        let job = store.claim_next_for_types(&[]).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        let status = store
            .fail(job.id, "boom", Duration::from_millis(0))
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Pending);
        assert_eq!(
            JobRepository::get(&store, job.id)
                .await
                .unwrap()
                .unwrap()
                .retry_count,
            1
        );
    }

    #[tokio::test]
    async fn test_running_job_does_not_absorb_new_queue() {
        let store = MemoryStore::new();
        let item_id = Uuid::new_v4();
        let org = Uuid::new_v4();

        store
            .queue_deduplicated(NewJob::process_content(item_id, org))
            .await
            .unwrap();
        let running = store.claim_next_for_types(&[]).await.unwrap().unwrap();

        let queued = store
            .queue_deduplicated(NewJob::process_content(item_id, org))
            .await
            .unwrap();
        assert!(queued.is_some_and(|id| id != running.id));
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_requeue_stale() {
        let store = MemoryStore::new();
        store
            .queue(NewJob::rebuild_knowledge_graph(Uuid::new_v4()))
            .await
            .unwrap();
        let job = store.claim_next_for_types(&[]).await.unwrap().unwrap();

        assert_eq!(store.requeue_stale(Duration::from_secs(60)).await.unwrap(), 0);
        assert_eq!(store.requeue_stale(Duration::ZERO).await.unwrap(), 1);
        assert_eq!(
            JobRepository::get(&store, job.id)
                .await
                .unwrap()
                .unwrap()
                .status,
            JobStatus::Pending
        );
    }
}
