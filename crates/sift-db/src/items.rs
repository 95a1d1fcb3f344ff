//! Content item repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use sift_core::{
    Chapter, ContentItem, ContentItemRepository, Error, ProcessingStatus, Result, StageFailure,
    TranscriptSegment, TranscriptionOutput,
};

const ITEM_COLUMNS: &str = "id, organization_id, source_type, title, raw_payload_ref, mime_type,
    transcript, transcript_segments, speaker_count, summary, tags, chapters, processing_status,
    processing_error, failed_stage, failure_kind, attempt, metadata, created_at, updated_at";

/// PostgreSQL implementation of ContentItemRepository.
pub struct PgContentItemRepository {
    pool: Pool<Postgres>,
}

impl PgContentItemRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_item_row(row: PgRow) -> Result<ContentItem> {
        let source_type: String = row.get("source_type");
        let status: String = row.get("processing_status");
        let failed_stage: Option<String> = row.get("failed_stage");
        let failure_kind: Option<String> = row.get("failure_kind");
        let segments: Option<JsonValue> = row.get("transcript_segments");
        let chapters: JsonValue = row.get("chapters");

        Ok(ContentItem {
            id: row.get("id"),
            organization_id: row.get("organization_id"),
            source_type: source_type.parse()?,
            title: row.get("title"),
            raw_payload_ref: row.get("raw_payload_ref"),
            mime_type: row.get("mime_type"),
            transcript: row.get("transcript"),
            transcript_segments: segments.map(serde_json::from_value).transpose()?,
            speaker_count: row.get("speaker_count"),
            summary: row.get("summary"),
            tags: row.get("tags"),
            chapters: serde_json::from_value(chapters)?,
            processing_status: status.parse()?,
            processing_error: row.get("processing_error"),
            failed_stage: failed_stage.map(|s| s.parse()).transpose()?,
            failure_kind: failure_kind.map(|s| s.parse()).transpose()?,
            attempt: row.get("attempt"),
            metadata: row.get("metadata"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn status_strings(statuses: &[ProcessingStatus]) -> Vec<String> {
        statuses.iter().map(|s| s.as_str().to_string()).collect()
    }
}

#[async_trait]
impl ContentItemRepository for PgContentItemRepository {
    async fn insert(&self, item: &ContentItem) -> Result<()> {
        let segments = item
            .transcript_segments
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        sqlx::query(
            "INSERT INTO content_item (id, organization_id, source_type, title, raw_payload_ref,
                 mime_type, transcript, transcript_segments, speaker_count, summary, tags, chapters,
                 processing_status, attempt, metadata, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(item.id)
        .bind(item.organization_id)
        .bind(item.source_type.as_str())
        .bind(&item.title)
        .bind(&item.raw_payload_ref)
        .bind(&item.mime_type)
        .bind(&item.transcript)
        .bind(segments)
        .bind(item.speaker_count)
        .bind(&item.summary)
        .bind(&item.tags)
        .bind(serde_json::to_value(&item.chapters)?)
        .bind(item.processing_status.as_str())
        .bind(item.attempt)
        .bind(&item.metadata)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ContentItem>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM content_item WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_item_row).transpose()
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<ContentItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM content_item WHERE id = ANY($1) ORDER BY created_at, id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_item_row).collect()
    }

    async fn list_for_organization(&self, organization_id: Uuid) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM content_item
             WHERE organization_id = $1
             ORDER BY created_at, id"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_item_row).collect()
    }

    async fn list_organization_ids(&self) -> Result<Vec<Uuid>> {
        sqlx::query_scalar("SELECT DISTINCT organization_id FROM content_item ORDER BY 1")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[ProcessingStatus],
        to: ProcessingStatus,
    ) -> Result<bool> {
        // Single conditional UPDATE: the row lock serializes concurrent claims.
        let result = sqlx::query(
            "UPDATE content_item
             SET processing_status = $1,
                 updated_at = $2,
                 processing_error = CASE WHEN $1 = 'failed' THEN processing_error END,
                 failed_stage = CASE WHEN $1 = 'failed' THEN failed_stage END,
                 failure_kind = CASE WHEN $1 = 'failed' THEN failure_kind END
             WHERE id = $3 AND processing_status = ANY($4)",
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(Self::status_strings(from))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        expected: ProcessingStatus,
        failure: &StageFailure,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE content_item
             SET processing_status = 'failed',
                 processing_error = $1,
                 failed_stage = $2,
                 failure_kind = $3,
                 attempt = attempt + 1,
                 updated_at = $4
             WHERE id = $5 AND processing_status = $6",
        )
        .bind(&failure.message)
        .bind(failure.step.as_str())
        .bind(failure.kind.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_transcription(&self, id: Uuid, output: &TranscriptionOutput) -> Result<()> {
        sqlx::query(
            "UPDATE content_item
             SET transcript = $1, transcript_segments = $2, speaker_count = $3, updated_at = $4
             WHERE id = $5",
        )
        .bind(&output.transcript)
        .bind(serde_json::to_value(&output.segments)?)
        .bind(output.speaker_count)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn save_segments(&self, id: Uuid, segments: &[TranscriptSegment]) -> Result<()> {
        sqlx::query(
            "UPDATE content_item SET transcript_segments = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(serde_json::to_value(segments)?)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn save_analysis(
        &self,
        id: Uuid,
        summary: &str,
        tags: &[String],
        chapters: &[Chapter],
    ) -> Result<()> {
        sqlx::query(
            "UPDATE content_item
             SET summary = $1, tags = $2, chapters = $3, updated_at = $4
             WHERE id = $5",
        )
        .bind(summary)
        .bind(tags)
        .bind(serde_json::to_value(chapters)?)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
