//! Core traits for sift abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::action_items::ActionItemMerge;
use crate::error::{Error, Result};
use crate::models::*;

// =============================================================================
// CONTENT ITEM REPOSITORY
// =============================================================================

/// Everything recorded about a failed pipeline step.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub step: PipelineStep,
    pub kind: FailureKind,
    pub message: String,
}

/// Repository for content items and their processing state.
///
/// Status writes are compare-and-set so that concurrent runs on the same
/// item serialize without an external lock.
#[async_trait]
pub trait ContentItemRepository: Send + Sync {
    /// Insert a new item.
    async fn insert(&self, item: &ContentItem) -> Result<()>;

    /// Get an item by ID.
    async fn get(&self, id: Uuid) -> Result<Option<ContentItem>>;

    /// Get an item by ID, failing when it does not exist.
    async fn fetch(&self, id: Uuid) -> Result<ContentItem> {
        self.get(id).await?.ok_or(Error::ItemNotFound(id))
    }

    /// Fetch several items; missing IDs are skipped.
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<ContentItem>>;

    /// All items of an organization, oldest first.
    async fn list_for_organization(&self, organization_id: Uuid) -> Result<Vec<ContentItem>>;

    /// Organizations that own at least one item.
    async fn list_organization_ids(&self) -> Result<Vec<Uuid>>;

    /// Atomically move the item to `to` if its current status is one of `from`.
    ///
    /// Returns `false` when another writer got there first. Moving to any
    /// status other than `failed` clears the previous failure fields.
    async fn transition(
        &self,
        id: Uuid,
        from: &[ProcessingStatus],
        to: ProcessingStatus,
    ) -> Result<bool>;

    /// Atomically record a failure if the item is still in `expected`.
    ///
    /// Writes `failed`, the error message, the failed step and kind, and
    /// increments `attempt` in one statement.
    async fn mark_failed(
        &self,
        id: Uuid,
        expected: ProcessingStatus,
        failure: &StageFailure,
    ) -> Result<bool>;

    /// Store transcription output.
    async fn save_transcription(&self, id: Uuid, output: &TranscriptionOutput) -> Result<()>;

    /// Replace transcript segments (diarization output).
    async fn save_segments(&self, id: Uuid, segments: &[TranscriptSegment]) -> Result<()>;

    /// Replace the AI-derived summary fields.
    async fn save_analysis(
        &self,
        id: Uuid,
        summary: &str,
        tags: &[String],
        chapters: &[Chapter],
    ) -> Result<()>;
}

// =============================================================================
// ACTION ITEM REPOSITORY
// =============================================================================

/// Repository for action items.
#[async_trait]
pub trait ActionItemRepository: Send + Sync {
    /// All action items extracted from a content item.
    async fn list_for_item(&self, content_item_id: Uuid) -> Result<Vec<ActionItem>>;

    /// Apply a merge plan in one transaction.
    async fn apply_merge(&self, merge: &ActionItemMerge) -> Result<()>;

    /// Apply a user edit, recording which fields the user touched.
    async fn update_by_user(&self, id: Uuid, update: &ActionItemUpdate) -> Result<ActionItem>;
}

// =============================================================================
// EMBEDDING INDEX
// =============================================================================

/// Vector store keyed by owner.
#[async_trait]
pub trait EmbeddingIndex: Send + Sync {
    /// Replace every embedding of an owner with `embeddings`, all-or-nothing.
    ///
    /// Concurrent readers see either the full old set or the full new set.
    async fn replace_for_owner(
        &self,
        owner_type: OwnerType,
        owner_id: Uuid,
        embeddings: Vec<Embedding>,
    ) -> Result<()>;

    /// Remove every embedding of an owner.
    async fn delete_for_owner(&self, owner_type: OwnerType, owner_id: Uuid) -> Result<()>;

    /// Embeddings of one owner, ordered by chunk index.
    async fn for_owner(&self, owner_type: OwnerType, owner_id: Uuid) -> Result<Vec<Embedding>>;

    /// Every embedding of a type in an organization.
    async fn list_for_organization(
        &self,
        organization_id: Uuid,
        owner_type: OwnerType,
    ) -> Result<Vec<Embedding>>;

    /// Nearest neighbours by cosine similarity.
    ///
    /// Only hits with similarity `>= query.threshold` are returned, highest
    /// first; ties go to the more recent source, then the lower owner id.
    async fn query(&self, vector: &Vector, query: &EmbeddingQuery) -> Result<Vec<EmbeddingMatch>>;

    /// Number of stored embeddings in an organization.
    async fn count(&self, organization_id: Uuid) -> Result<i64>;
}

// =============================================================================
// KNOWLEDGE GRAPH REPOSITORIES
// =============================================================================

/// Repository for decisions.
#[async_trait]
pub trait DecisionRepository: Send + Sync {
    /// Insert a single decision.
    async fn insert(&self, decision: &Decision) -> Result<()>;

    /// Replace every decision extracted from a content item.
    ///
    /// Returns the IDs of the removed decisions.
    async fn replace_for_item(
        &self,
        content_item_id: Uuid,
        decisions: &[Decision],
    ) -> Result<Vec<Uuid>>;

    /// Decisions of an organization ordered by effective time, then id.
    async fn list_for_organization(&self, organization_id: Uuid) -> Result<Vec<Decision>>;
}

/// Repository for topics.
#[async_trait]
pub trait TopicRepository: Send + Sync {
    /// Topics of an organization, largest first.
    async fn list_for_organization(&self, organization_id: Uuid) -> Result<Vec<Topic>>;

    /// Insert or update by id.
    async fn upsert(&self, topic: &Topic) -> Result<()>;

    /// Delete an organization's topics whose id is not in `keep`.
    async fn retain(&self, organization_id: Uuid, keep: &[Uuid]) -> Result<u64>;
}

/// Per-organization pipeline settings.
#[async_trait]
pub trait OrgSettingsRepository: Send + Sync {
    async fn get(&self, organization_id: Uuid) -> Result<Option<OrgSettings>>;

    async fn upsert(&self, settings: &OrgSettings) -> Result<()>;
}

// =============================================================================
// JOB REPOSITORY
// =============================================================================

/// Repository for job queue operations.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a new job.
    async fn queue(&self, job: NewJob) -> Result<Uuid>;

    /// Queue a job unless one of the same type is already pending for the
    /// same item (or organization, for item-less jobs).
    ///
    /// Running jobs do not count: the item may have been re-claimed after
    /// the running job finished its work but before it was completed.
    async fn queue_deduplicated(&self, job: NewJob) -> Result<Option<Uuid>>;

    /// Claim the next runnable job whose type is in `job_types`.
    /// An empty slice means any type.
    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>>;

    /// Mark job as completed.
    async fn complete(&self, job_id: Uuid) -> Result<()>;

    /// Record a failed attempt.
    ///
    /// Jobs with retries left go back to `pending` with `run_after = now + retry_delay`;
    /// otherwise they end `failed`. Returns the resulting status.
    async fn fail(&self, job_id: Uuid, error: &str, retry_delay: Duration) -> Result<JobStatus>;

    /// Put `running` jobs started more than `older_than` ago back to `pending`.
    async fn requeue_stale(&self, older_than: Duration) -> Result<u64>;

    /// Get job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Jobs for a content item, newest first.
    async fn list_for_item(&self, content_item_id: Uuid) -> Result<Vec<Job>>;

    /// Get pending jobs count.
    async fn pending_count(&self) -> Result<i64>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one vector per input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate a response constrained to JSON output.
    ///
    /// Backends without a JSON mode fall back to plain generation.
    async fn generate_json(&self, system: &str, prompt: &str) -> Result<String> {
        self.generate_with_system(system, prompt).await
    }

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// SOURCE ADAPTERS
// =============================================================================

/// Producer of raw content items for one source type.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Source type this adapter produces.
    fn source_type(&self) -> SourceType;

    /// Pull one item by its identifier in the external system.
    async fn fetch_raw_item(&self, external_id: &str) -> Result<RawContentItem>;
}
