//! Core data models for sift.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Error, Result};

pub use pgvector::Vector;

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum with stable wire names.
macro_rules! wire_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Stable wire name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        concat!("unknown ", stringify!($ty), ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

// =============================================================================
// CONTENT ITEMS
// =============================================================================

/// Where a content item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Video,
    Audio,
    ChatThread,
    WikiPage,
    CodeReview,
    Document,
}

wire_enum!(SourceType {
    Video => "video",
    Audio => "audio",
    ChatThread => "chat_thread",
    WikiPage => "wiki_page",
    CodeReview => "code_review",
    Document => "document",
});

impl SourceType {
    /// Sources whose payload is a recording that must be transcribed.
    pub fn is_media(&self) -> bool {
        matches!(self, SourceType::Video | SourceType::Audio)
    }
}

/// Processing state of a content item.
///
/// Forward order is `pending → transcribing → (diarizing) → analyzing → completed`,
/// with `failed` reachable from any in-flight state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Transcribing,
    Diarizing,
    Analyzing,
    Completed,
    Failed,
}

wire_enum!(ProcessingStatus {
    Pending => "pending",
    Transcribing => "transcribing",
    Diarizing => "diarizing",
    Analyzing => "analyzing",
    Completed => "completed",
    Failed => "failed",
});

impl ProcessingStatus {
    /// All statuses in pipeline order.
    pub const ALL: [ProcessingStatus; 6] = [
        ProcessingStatus::Pending,
        ProcessingStatus::Transcribing,
        ProcessingStatus::Diarizing,
        ProcessingStatus::Analyzing,
        ProcessingStatus::Completed,
        ProcessingStatus::Failed,
    ];

    /// Statuses that mean a run currently owns the item.
    pub const IN_FLIGHT: [ProcessingStatus; 3] = [
        ProcessingStatus::Transcribing,
        ProcessingStatus::Diarizing,
        ProcessingStatus::Analyzing,
    ];

    pub fn is_in_flight(&self) -> bool {
        Self::IN_FLIGHT.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }

    /// Position along the forward chain. `Failed` has no position.
    fn rank(&self) -> Option<u8> {
        match self {
            ProcessingStatus::Pending => Some(0),
            ProcessingStatus::Transcribing => Some(1),
            ProcessingStatus::Diarizing => Some(2),
            ProcessingStatus::Analyzing => Some(3),
            ProcessingStatus::Completed => Some(4),
            ProcessingStatus::Failed => None,
        }
    }

    /// Whether a run may move an item from `self` to `next` without an explicit restart.
    ///
    /// Stages may be skipped (text items jump straight to `analyzing`, single-speaker
    /// recordings skip `diarizing`) but never revisited.
    pub fn can_advance_to(&self, next: ProcessingStatus) -> bool {
        if next == ProcessingStatus::Failed {
            return self.is_in_flight() || *self == ProcessingStatus::Pending;
        }
        if *self == ProcessingStatus::Pending && next == ProcessingStatus::Completed {
            return false;
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from && !self.is_terminal(),
            _ => false,
        }
    }
}

/// One step of the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStep {
    Transcription,
    Diarization,
    Embedding,
    Analysis,
}

wire_enum!(PipelineStep {
    Transcription => "transcription",
    Diarization => "diarization",
    Embedding => "embedding",
    Analysis => "analysis",
});

impl PipelineStep {
    /// Status an item carries while this step runs.
    pub fn status(&self) -> ProcessingStatus {
        match self {
            PipelineStep::Transcription => ProcessingStatus::Transcribing,
            PipelineStep::Diarization => ProcessingStatus::Diarizing,
            PipelineStep::Embedding | PipelineStep::Analysis => ProcessingStatus::Analyzing,
        }
    }
}

/// Why the last run of an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transient or internal failure; the item can be retried.
    Retryable,
    /// The input can never be processed.
    UnsupportedInput,
}

wire_enum!(FailureKind {
    Retryable => "retryable",
    UnsupportedInput => "unsupported_input",
});

/// A timed piece of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// A navigable section of a recording or document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    #[serde(default)]
    pub start_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// The unit of ingested content, owned by an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub source_type: SourceType,
    pub title: String,
    /// Locator of the raw media (URL or storage key). Empty for text-only items.
    pub raw_payload_ref: Option<String>,
    pub mime_type: Option<String>,
    pub transcript: Option<String>,
    pub transcript_segments: Option<Vec<TranscriptSegment>>,
    pub speaker_count: Option<i32>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub chapters: Vec<Chapter>,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub failed_stage: Option<PipelineStep>,
    pub failure_kind: Option<FailureKind>,
    pub attempt: i32,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    /// Build a fresh `pending` item from raw source content.
    pub fn from_raw(raw: RawContentItem, now: DateTime<Utc>) -> Self {
        let (raw_payload_ref, mime_type, transcript) = match raw.body {
            RawBody::Media(media) => (Some(media.url), media.mime_type, None),
            RawBody::Text(text) => (None, None, Some(text)),
        };
        Self {
            id: crate::uuid_utils::new_v7(),
            organization_id: raw.organization_id,
            source_type: raw.source_type,
            title: raw.title,
            raw_payload_ref,
            mime_type,
            transcript,
            transcript_segments: None,
            speaker_count: None,
            summary: None,
            tags: Vec::new(),
            chapters: Vec::new(),
            processing_status: ProcessingStatus::Pending,
            processing_error: None,
            failed_stage: None,
            failure_kind: None,
            attempt: 0,
            metadata: raw.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when a usable transcript is already present.
    pub fn has_transcript(&self) -> bool {
        self.transcript
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Locator for a media payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Payload of a raw item: media to transcribe or text to analyze directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RawBody {
    Media(MediaRef),
    Text(String),
}

/// Content as produced by an upload or a source adapter, before ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContentItem {
    pub organization_id: Uuid,
    pub source_type: SourceType,
    pub title: String,
    pub body: RawBody,
    #[serde(default)]
    pub metadata: JsonValue,
}

/// Per-organization pipeline switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgSettings {
    pub organization_id: Uuid,
    pub diarization_enabled: bool,
}

// =============================================================================
// STAGE OUTPUTS
// =============================================================================

/// Result of the transcription step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionOutput {
    pub transcript: String,
    pub segments: Vec<TranscriptSegment>,
    pub speaker_count: Option<i32>,
    pub language: Option<String>,
    pub duration_secs: Option<f64>,
}

/// Action item as extracted by analysis, before merging with stored rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedActionItem {
    pub title: String,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub priority: Option<ActionPriority>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub timestamp_start: Option<f64>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    0.5
}

/// Decision as extracted by analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDecision {
    pub summary: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub status: Option<DecisionStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Result of the analysis step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<ExtractedActionItem>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub decisions: Vec<ExtractedDecision>,
}

// =============================================================================
// ACTION ITEMS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionItemStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

wire_enum!(ActionItemStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

wire_enum!(ActionPriority {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

/// Seconds per timestamp bucket in an action item's natural key.
const NATURAL_KEY_BUCKET_SECS: f64 = 30.0;

/// A follow-up extracted from content and tracked by users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: Uuid,
    pub content_item_id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub assignee: Option<String>,
    pub status: ActionItemStatus,
    pub priority: ActionPriority,
    pub due_date: Option<String>,
    pub timestamp_start: Option<f64>,
    pub confidence: f32,
    pub natural_key: String,
    /// Fields a user has edited; re-analysis leaves these untouched.
    pub user_modified_fields: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActionItem {
    pub const FIELD_STATUS: &'static str = "status";
    pub const FIELD_ASSIGNEE: &'static str = "assignee";

    /// Stable identity of an extracted action item across re-analysis runs:
    /// a 30-second timestamp bucket plus the normalized title.
    pub fn natural_key(title: &str, timestamp_start: Option<f64>) -> String {
        let bucket = timestamp_start
            .map(|t| ((t / NATURAL_KEY_BUCKET_SECS).floor() as i64).to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut hasher = Sha256::new();
        hasher.update(bucket.as_bytes());
        hasher.update(b"|");
        hasher.update(normalize_name(title).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// New row from an extracted item.
    pub fn from_extracted(
        extracted: &ExtractedActionItem,
        content_item_id: Uuid,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: crate::uuid_utils::new_v7(),
            content_item_id,
            organization_id,
            title: extracted.title.trim().to_string(),
            assignee: extracted.assignee.clone(),
            status: ActionItemStatus::Pending,
            priority: extracted.priority.unwrap_or_default(),
            due_date: extracted.due_date.clone(),
            timestamp_start: extracted.timestamp_start,
            confidence: extracted.confidence.clamp(0.0, 1.0),
            natural_key: Self::natural_key(&extracted.title, extracted.timestamp_start),
            user_modified_fields: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_user_modified(&self, field: &str) -> bool {
        self.user_modified_fields.iter().any(|f| f == field)
    }

    /// Refresh AI-derived fields from a re-extraction, keeping user edits.
    pub fn merge_extracted(&mut self, extracted: &ExtractedActionItem, now: DateTime<Utc>) {
        self.title = extracted.title.trim().to_string();
        self.priority = extracted.priority.unwrap_or(self.priority);
        if extracted.due_date.is_some() {
            self.due_date = extracted.due_date.clone();
        }
        self.timestamp_start = extracted.timestamp_start;
        self.confidence = extracted.confidence.clamp(0.0, 1.0);
        if !self.is_user_modified(Self::FIELD_ASSIGNEE) {
            self.assignee = extracted.assignee.clone();
        }
        self.updated_at = now;
    }
}

/// User edit of an action item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionItemUpdate {
    pub status: Option<ActionItemStatus>,
    /// `Some(None)` clears the assignee.
    pub assignee: Option<Option<String>>,
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// What an embedding was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    TranscriptChunk,
    Decision,
}

wire_enum!(OwnerType {
    TranscriptChunk => "transcript_chunk",
    Decision => "decision",
});

/// A stored vector. Immutable; replaced as a set per owner.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub owner_type: OwnerType,
    /// Content item id for transcript chunks, decision id for decisions.
    pub owner_id: Uuid,
    pub chunk_index: i32,
    pub vector: Vector,
    pub source_text: String,
    pub source_type: Option<SourceType>,
    pub model: String,
    /// Update time of the owning source; breaks similarity ties.
    pub created_at: DateTime<Utc>,
}

/// Filtered nearest-neighbour query.
#[derive(Debug, Clone)]
pub struct EmbeddingQuery {
    pub organization_id: Uuid,
    /// Hard lower bound on cosine similarity.
    pub threshold: f32,
    pub limit: usize,
    pub owner_types: Vec<OwnerType>,
    pub source_types: Vec<SourceType>,
    pub owner_ids: Vec<Uuid>,
}

impl EmbeddingQuery {
    pub fn new(organization_id: Uuid) -> Self {
        Self {
            organization_id,
            threshold: crate::defaults::SEARCH_THRESHOLD,
            limit: crate::defaults::SEARCH_LIMIT,
            owner_types: Vec::new(),
            source_types: Vec::new(),
            owner_ids: Vec::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_owner_types(mut self, owner_types: Vec<OwnerType>) -> Self {
        self.owner_types = owner_types;
        self
    }

    pub fn with_source_types(mut self, source_types: Vec<SourceType>) -> Self {
        self.source_types = source_types;
        self
    }

    pub fn with_owner_ids(mut self, owner_ids: Vec<Uuid>) -> Self {
        self.owner_ids = owner_ids;
        self
    }

    /// Whether a stored embedding passes the non-vector filters.
    pub fn matches(&self, embedding: &Embedding) -> bool {
        embedding.organization_id == self.organization_id
            && (self.owner_types.is_empty() || self.owner_types.contains(&embedding.owner_type))
            && (self.owner_ids.is_empty() || self.owner_ids.contains(&embedding.owner_id))
            && (self.source_types.is_empty()
                || embedding
                    .source_type
                    .map(|s| self.source_types.contains(&s))
                    .unwrap_or(false))
    }
}

/// One query hit.
#[derive(Debug, Clone)]
pub struct EmbeddingMatch {
    pub embedding: Embedding,
    pub score: f32,
}

// =============================================================================
// KNOWLEDGE GRAPH
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicTrend {
    Rising,
    #[default]
    Stable,
    Declining,
}

wire_enum!(TopicTrend {
    Rising => "rising",
    Stable => "stable",
    Declining => "declining",
});

/// A recurring theme across an organization's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    /// Unique per organization.
    pub normalized_name: String,
    pub keywords: Vec<String>,
    pub content_count: i32,
    pub content_item_ids: Vec<Uuid>,
    pub trend: TopicTrend,
    pub trend_score: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    Proposed,
    #[default]
    Decided,
    Superseded,
    Reverted,
}

wire_enum!(DecisionStatus {
    Proposed => "proposed",
    Decided => "decided",
    Superseded => "superseded",
    Reverted => "reverted",
});

/// A decision recorded in some piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub content_item_id: Option<Uuid>,
    pub summary: String,
    pub context: Option<String>,
    pub status: DecisionStatus,
    pub decided_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    /// When the decision was made, falling back to when it was recorded.
    pub fn effective_at(&self) -> DateTime<Utc> {
        self.decided_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    DirectContradiction,
    SupersessionUnclear,
    ScopeOverlap,
}

wire_enum!(ConflictType {
    DirectContradiction => "direct_contradiction",
    SupersessionUnclear => "supersession_unclear",
    ScopeOverlap => "scope_overlap",
});

/// A pair of decisions that may disagree. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionConflict {
    /// The earlier decision.
    pub decision_a: Uuid,
    /// The later decision.
    pub decision_b: Uuid,
    pub conflict_type: ConflictType,
    pub confidence: f32,
    pub similarity: f32,
    pub explanation: String,
}

// =============================================================================
// JOBS
// =============================================================================

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

wire_enum!(JobStatus {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

/// Type of job to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Run the remaining pipeline steps of a claimed content item
    ProcessContent,
    /// Recluster topics for an organization
    RebuildKnowledgeGraph,
}

wire_enum!(JobType {
    ProcessContent => "process_content",
    RebuildKnowledgeGraph => "rebuild_knowledge_graph",
});

impl JobType {
    pub fn default_priority(&self) -> i32 {
        match self {
            JobType::ProcessContent => 10,
            JobType::RebuildKnowledgeGraph => 1,
        }
    }
}

/// A job in the processing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub content_item_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<JsonValue>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub run_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Request to enqueue a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: JobType,
    pub content_item_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub priority: i32,
    pub payload: Option<JsonValue>,
}

impl NewJob {
    pub fn process_content(item_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            job_type: JobType::ProcessContent,
            content_item_id: Some(item_id),
            organization_id: Some(organization_id),
            priority: JobType::ProcessContent.default_priority(),
            payload: None,
        }
    }

    pub fn rebuild_knowledge_graph(organization_id: Uuid) -> Self {
        Self {
            job_type: JobType::RebuildKnowledgeGraph,
            content_item_id: None,
            organization_id: Some(organization_id),
            priority: JobType::RebuildKnowledgeGraph.default_priority(),
            payload: None,
        }
    }
}

// =============================================================================
// PROCESSING STATUS VIEW
// =============================================================================

/// What a caller should tell the user about an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPhase {
    Processing,
    Completed,
    FailedRetryable,
    FailedUnsupported,
}

/// Read model returned by `get_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusView {
    pub item_id: Uuid,
    pub status: ProcessingStatus,
    pub phase: StatusPhase,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub failed_stage: Option<PipelineStep>,
    pub attempt: i32,
    pub updated_at: DateTime<Utc>,
}

impl StatusView {
    pub fn of(item: &ContentItem) -> Self {
        let phase = match item.processing_status {
            ProcessingStatus::Completed => StatusPhase::Completed,
            ProcessingStatus::Failed => match item.failure_kind {
                Some(FailureKind::UnsupportedInput) => StatusPhase::FailedUnsupported,
                _ => StatusPhase::FailedRetryable,
            },
            _ => StatusPhase::Processing,
        };
        Self {
            item_id: item.id,
            status: item.processing_status,
            phase,
            error: item.processing_error.clone(),
            failure_kind: item.failure_kind,
            failed_stage: item.failed_stage,
            attempt: item.attempt,
            updated_at: item.updated_at,
        }
    }
}

/// Result of asking the orchestrator to (re)start processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// A run was claimed and queued; the item now carries `status`.
    Started { status: ProcessingStatus },
    /// Another run owns the item.
    AlreadyRunning { status: ProcessingStatus },
    /// Nothing to do without an explicit reprocess.
    AlreadyCompleted,
    /// Last failure was an unsupported input.
    NotRetryable,
}

// =============================================================================
// HELPERS
// =============================================================================

/// Lowercase, strip punctuation and collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
