//! Decision repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use sift_core::{Decision, DecisionRepository, Error, Result};

const DECISION_COLUMNS: &str =
    "id, organization_id, content_item_id, summary, context, status, decided_at, tags, created_at";

/// PostgreSQL implementation of DecisionRepository.
pub struct PgDecisionRepository {
    pool: Pool<Postgres>,
}

impl PgDecisionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_decision_row(row: PgRow) -> Result<Decision> {
        let status: String = row.get("status");
        Ok(Decision {
            id: row.get("id"),
            organization_id: row.get("organization_id"),
            content_item_id: row.get("content_item_id"),
            summary: row.get("summary"),
            context: row.get("context"),
            status: status.parse()?,
            decided_at: row.get("decided_at"),
            tags: row.get("tags"),
            created_at: row.get("created_at"),
        })
    }

    async fn insert_with<'e, E>(executor: E, decision: &Decision) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "INSERT INTO decision (id, organization_id, content_item_id, summary, context, status,
                 decided_at, tags, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(decision.id)
        .bind(decision.organization_id)
        .bind(decision.content_item_id)
        .bind(&decision.summary)
        .bind(&decision.context)
        .bind(decision.status.as_str())
        .bind(decision.decided_at)
        .bind(&decision.tags)
        .bind(decision.created_at)
        .execute(executor)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl DecisionRepository for PgDecisionRepository {
    async fn insert(&self, decision: &Decision) -> Result<()> {
        Self::insert_with(&self.pool, decision).await
    }

    async fn replace_for_item(
        &self,
        content_item_id: Uuid,
        decisions: &[Decision],
    ) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let removed: Vec<Uuid> =
            sqlx::query_scalar("DELETE FROM decision WHERE content_item_id = $1 RETURNING id")
                .bind(content_item_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(Error::Database)?;

        for decision in decisions {
            Self::insert_with(&mut *tx, decision).await?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(removed)
    }

    async fn list_for_organization(&self, organization_id: Uuid) -> Result<Vec<Decision>> {
        let rows = sqlx::query(&format!(
            "SELECT {DECISION_COLUMNS} FROM decision
             WHERE organization_id = $1
             ORDER BY COALESCE(decided_at, created_at), id"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_decision_row).collect()
    }
}
