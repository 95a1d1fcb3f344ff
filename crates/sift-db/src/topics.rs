//! Topic and organization settings repositories.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use sift_core::{Error, OrgSettings, OrgSettingsRepository, Result, Topic, TopicRepository};

const TOPIC_COLUMNS: &str = "id, organization_id, name, normalized_name, keywords, content_count,
    content_item_ids, trend, trend_score, created_at, updated_at";

/// PostgreSQL implementation of TopicRepository.
pub struct PgTopicRepository {
    pool: Pool<Postgres>,
}

impl PgTopicRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_topic_row(row: PgRow) -> Result<Topic> {
        let trend: String = row.get("trend");
        Ok(Topic {
            id: row.get("id"),
            organization_id: row.get("organization_id"),
            name: row.get("name"),
            normalized_name: row.get("normalized_name"),
            keywords: row.get("keywords"),
            content_count: row.get("content_count"),
            content_item_ids: row.get("content_item_ids"),
            trend: trend.parse()?,
            trend_score: row.get("trend_score"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl TopicRepository for PgTopicRepository {
    async fn list_for_organization(&self, organization_id: Uuid) -> Result<Vec<Topic>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOPIC_COLUMNS} FROM topic
             WHERE organization_id = $1
             ORDER BY content_count DESC, normalized_name"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_topic_row).collect()
    }

    async fn upsert(&self, topic: &Topic) -> Result<()> {
        sqlx::query(
            "INSERT INTO topic (id, organization_id, name, normalized_name, keywords, content_count,
                 content_item_ids, trend, trend_score, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (id) DO UPDATE SET
                 name = EXCLUDED.name,
                 normalized_name = EXCLUDED.normalized_name,
                 keywords = EXCLUDED.keywords,
                 content_count = EXCLUDED.content_count,
                 content_item_ids = EXCLUDED.content_item_ids,
                 trend = EXCLUDED.trend,
                 trend_score = EXCLUDED.trend_score,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(topic.id)
        .bind(topic.organization_id)
        .bind(&topic.name)
        .bind(&topic.normalized_name)
        .bind(&topic.keywords)
        .bind(topic.content_count)
        .bind(&topic.content_item_ids)
        .bind(topic.trend.as_str())
        .bind(topic.trend_score)
        .bind(topic.created_at)
        .bind(topic.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn retain(&self, organization_id: Uuid, keep: &[Uuid]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM topic WHERE organization_id = $1 AND id <> ALL($2)")
            .bind(organization_id)
            .bind(keep)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}

/// PostgreSQL implementation of OrgSettingsRepository.
pub struct PgOrgSettingsRepository {
    pool: Pool<Postgres>,
}

impl PgOrgSettingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrgSettingsRepository for PgOrgSettingsRepository {
    async fn get(&self, organization_id: Uuid) -> Result<Option<OrgSettings>> {
        let row = sqlx::query(
            "SELECT organization_id, diarization_enabled FROM org_settings WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| OrgSettings {
            organization_id: row.get("organization_id"),
            diarization_enabled: row.get("diarization_enabled"),
        }))
    }

    async fn upsert(&self, settings: &OrgSettings) -> Result<()> {
        sqlx::query(
            "INSERT INTO org_settings (organization_id, diarization_enabled) VALUES ($1, $2)
             ON CONFLICT (organization_id) DO UPDATE SET diarization_enabled = EXCLUDED.diarization_enabled",
        )
        .bind(settings.organization_id)
        .bind(settings.diarization_enabled)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
