//! Action item repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use sift_core::{
    ActionItem, ActionItemMerge, ActionItemRepository, ActionItemUpdate, Error, Result,
};

const ACTION_COLUMNS: &str = "id, content_item_id, organization_id, title, assignee, status,
    priority, due_date, timestamp_start, confidence, natural_key, user_modified_fields,
    created_at, updated_at";

/// PostgreSQL implementation of ActionItemRepository.
pub struct PgActionItemRepository {
    pool: Pool<Postgres>,
}

impl PgActionItemRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_action_row(row: PgRow) -> Result<ActionItem> {
        let status: String = row.get("status");
        let priority: String = row.get("priority");
        Ok(ActionItem {
            id: row.get("id"),
            content_item_id: row.get("content_item_id"),
            organization_id: row.get("organization_id"),
            title: row.get("title"),
            assignee: row.get("assignee"),
            status: status.parse()?,
            priority: priority.parse()?,
            due_date: row.get("due_date"),
            timestamp_start: row.get("timestamp_start"),
            confidence: row.get("confidence"),
            natural_key: row.get("natural_key"),
            user_modified_fields: row.get("user_modified_fields"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl ActionItemRepository for PgActionItemRepository {
    async fn list_for_item(&self, content_item_id: Uuid) -> Result<Vec<ActionItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS} FROM action_item
             WHERE content_item_id = $1
             ORDER BY timestamp_start NULLS LAST, created_at, id"
        ))
        .bind(content_item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_action_row).collect()
    }

    async fn apply_merge(&self, merge: &ActionItemMerge) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        if !merge.deletes.is_empty() {
            sqlx::query("DELETE FROM action_item WHERE id = ANY($1) AND content_item_id = $2")
                .bind(&merge.deletes)
                .bind(merge.content_item_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        }

        // User-owned columns are only written on insert; updates leave them alone.
        for item in &merge.upserts {
            sqlx::query(
                "INSERT INTO action_item (id, content_item_id, organization_id, title, assignee,
                     status, priority, due_date, timestamp_start, confidence, natural_key,
                     user_modified_fields, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                 ON CONFLICT (id) DO UPDATE SET
                     title = EXCLUDED.title,
                     assignee = CASE WHEN 'assignee' = ANY(action_item.user_modified_fields)
                                     THEN action_item.assignee ELSE EXCLUDED.assignee END,
                     priority = EXCLUDED.priority,
                     due_date = EXCLUDED.due_date,
                     timestamp_start = EXCLUDED.timestamp_start,
                     confidence = EXCLUDED.confidence,
                     natural_key = EXCLUDED.natural_key,
                     updated_at = EXCLUDED.updated_at",
            )
            .bind(item.id)
            .bind(item.content_item_id)
            .bind(item.organization_id)
            .bind(&item.title)
            .bind(&item.assignee)
            .bind(item.status.as_str())
            .bind(item.priority.as_str())
            .bind(&item.due_date)
            .bind(item.timestamp_start)
            .bind(item.confidence)
            .bind(&item.natural_key)
            .bind(&item.user_modified_fields)
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn update_by_user(&self, id: Uuid, update: &ActionItemUpdate) -> Result<ActionItem> {
        let mut touched: Vec<String> = Vec::new();
        if update.status.is_some() {
            touched.push(ActionItem::FIELD_STATUS.to_string());
        }
        if update.assignee.is_some() {
            touched.push(ActionItem::FIELD_ASSIGNEE.to_string());
        }

        let row = sqlx::query(&format!(
            "UPDATE action_item
             SET status = COALESCE($1, status),
                 assignee = CASE WHEN $2 THEN $3 ELSE assignee END,
                 user_modified_fields = ARRAY(
                     SELECT DISTINCT f FROM unnest(user_modified_fields || $4::text[]) AS f
                     ORDER BY f
                 ),
                 updated_at = $5
             WHERE id = $6
             RETURNING {ACTION_COLUMNS}"
        ))
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.assignee.is_some())
        .bind(update.assignee.clone().flatten())
        .bind(&touched)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("action item {}", id)))?;

        Self::parse_action_row(row)
    }
}
