//! Pipeline event types, envelope, and event bus.
//!
//! The orchestrator, job worker and graph builder publish onto a single
//! broadcast channel. Consumers (webhooks, notifications, telemetry) subscribe
//! independently and never block publishers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{FailureKind, JobType, PipelineStep, ProcessingStatus};

// ============================================================================
// Event Envelope
// ============================================================================

/// Versioned wrapper around a [`ServerEvent`].
///
/// `event_type` uses dot-namespaced names (e.g. `"item.status_changed"`).
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    /// Organization the event belongs to. None for system-wide events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Payload schema version.
    pub payload_version: u32,
    pub payload: ServerEvent,
}

impl EventEnvelope {
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event_id: crate::uuid_utils::new_v7(),
            event_type: event.namespaced_event_type().to_string(),
            occurred_at: Utc::now(),
            organization_id: event.organization_id(),
            entity_type: event.entity_type().map(String::from),
            entity_id: event.entity_id().map(|id| id.to_string()),
            payload_version: 1,
            payload: event,
        }
    }
}

// ============================================================================
// Server Event (domain payloads)
// ============================================================================

/// Domain events, serialized with a `type` tag.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A raw item was accepted and stored as `pending`.
    ItemIngested {
        item_id: Uuid,
        organization_id: Uuid,
        source_type: String,
    },
    /// An item's processing status changed.
    ItemStatusChanged {
        item_id: Uuid,
        organization_id: Uuid,
        from: ProcessingStatus,
        to: ProcessingStatus,
    },
    /// A pipeline step finished successfully.
    StageCompleted {
        item_id: Uuid,
        organization_id: Uuid,
        stage: PipelineStep,
        duration_ms: i64,
    },
    /// A pipeline step failed and the item moved to `failed`.
    ItemFailed {
        item_id: Uuid,
        organization_id: Uuid,
        stage: PipelineStep,
        kind: FailureKind,
        error: String,
    },
    /// A job was added to the queue.
    JobQueued {
        job_id: Uuid,
        job_type: JobType,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<Uuid>,
    },
    /// A job started processing.
    JobStarted {
        job_id: Uuid,
        job_type: JobType,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<Uuid>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: Uuid,
        job_type: JobType,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<Uuid>,
        duration_ms: i64,
    },
    /// A job attempt failed.
    JobFailed {
        job_id: Uuid,
        job_type: JobType,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<Uuid>,
        error: String,
    },
    /// Topics were reclustered for an organization.
    GraphRebuilt {
        organization_id: Uuid,
        topic_count: usize,
        created: usize,
        matched: usize,
    },
}

impl ServerEvent {
    /// Namespaced event type for the envelope (e.g. `"item.failed"`).
    pub fn namespaced_event_type(&self) -> &'static str {
        match self {
            ServerEvent::ItemIngested { .. } => "item.ingested",
            ServerEvent::ItemStatusChanged { .. } => "item.status_changed",
            ServerEvent::StageCompleted { .. } => "item.stage_completed",
            ServerEvent::ItemFailed { .. } => "item.failed",
            ServerEvent::JobQueued { .. } => "job.queued",
            ServerEvent::JobStarted { .. } => "job.started",
            ServerEvent::JobCompleted { .. } => "job.completed",
            ServerEvent::JobFailed { .. } => "job.failed",
            ServerEvent::GraphRebuilt { .. } => "graph.rebuilt",
        }
    }

    pub fn entity_type(&self) -> Option<&'static str> {
        match self {
            ServerEvent::ItemIngested { .. }
            | ServerEvent::ItemStatusChanged { .. }
            | ServerEvent::StageCompleted { .. }
            | ServerEvent::ItemFailed { .. } => Some("content_item"),
            ServerEvent::JobQueued { .. }
            | ServerEvent::JobStarted { .. }
            | ServerEvent::JobCompleted { .. }
            | ServerEvent::JobFailed { .. } => Some("job"),
            ServerEvent::GraphRebuilt { .. } => Some("organization"),
        }
    }

    pub fn entity_id(&self) -> Option<Uuid> {
        match self {
            ServerEvent::ItemIngested { item_id, .. }
            | ServerEvent::ItemStatusChanged { item_id, .. }
            | ServerEvent::StageCompleted { item_id, .. }
            | ServerEvent::ItemFailed { item_id, .. } => Some(*item_id),
            ServerEvent::JobQueued { job_id, .. }
            | ServerEvent::JobStarted { job_id, .. }
            | ServerEvent::JobCompleted { job_id, .. }
            | ServerEvent::JobFailed { job_id, .. } => Some(*job_id),
            ServerEvent::GraphRebuilt {
                organization_id, ..
            } => Some(*organization_id),
        }
    }

    pub fn organization_id(&self) -> Option<Uuid> {
        match self {
            ServerEvent::ItemIngested {
                organization_id, ..
            }
            | ServerEvent::ItemStatusChanged {
                organization_id, ..
            }
            | ServerEvent::StageCompleted {
                organization_id, ..
            }
            | ServerEvent::ItemFailed {
                organization_id, ..
            }
            | ServerEvent::GraphRebuilt {
                organization_id, ..
            } => Some(*organization_id),
            _ => None,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast-based event bus.
///
/// Slow receivers that fall behind get a `Lagged` error and miss events.
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers. Dropped silently when nobody listens.
    pub fn emit(&self, event: ServerEvent) {
        let envelope = EventEnvelope::new(event);
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to enveloped events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_changed_serialization() {
        let event = ServerEvent::ItemStatusChanged {
            item_id: Uuid::nil(),
            organization_id: Uuid::nil(),
            from: ProcessingStatus::Pending,
            to: ProcessingStatus::Transcribing,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ItemStatusChanged");
        assert_eq!(json["from"], "pending");
        assert_eq!(json["to"], "transcribing");
    }

    #[test]
    fn test_envelope_metadata() {
        let org = Uuid::new_v4();
        let item = Uuid::new_v4();
        let envelope = EventEnvelope::new(ServerEvent::ItemFailed {
            item_id: item,
            organization_id: org,
            stage: PipelineStep::Transcription,
            kind: FailureKind::UnsupportedInput,
            error: "image/png".to_string(),
        });
        assert_eq!(envelope.event_type, "item.failed");
        assert_eq!(envelope.organization_id, Some(org));
        assert_eq!(envelope.entity_type.as_deref(), Some("content_item"));
        assert_eq!(envelope.entity_id, Some(item.to_string()));
    }

    #[test]
    fn test_job_event_has_no_organization() {
        let event = ServerEvent::JobQueued {
            job_id: Uuid::nil(),
            job_type: JobType::ProcessContent,
            item_id: None,
        };
        assert_eq!(event.organization_id(), None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["job_type"], "process_content");
        assert!(json.get("item_id").is_none());
    }

    #[tokio::test]
    async fn test_bus_delivers_to_subscribers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        bus.emit(ServerEvent::GraphRebuilt {
            organization_id: Uuid::nil(),
            topic_count: 2,
            created: 1,
            matched: 1,
        });
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event_type, "graph.rebuilt");
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::new(4);
        bus.emit(ServerEvent::JobStarted {
            job_id: Uuid::nil(),
            job_type: JobType::RebuildKnowledgeGraph,
            item_id: None,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
