//! Embedding index implementation backed by pgvector.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use sift_core::{
    Embedding, EmbeddingIndex, EmbeddingMatch, EmbeddingQuery, Error, OwnerType, Result,
};

const EMBEDDING_COLUMNS: &str = "id, organization_id, owner_type, owner_id, chunk_index, vector,
    source_text, source_type, model, created_at";

/// PostgreSQL implementation of EmbeddingIndex.
pub struct PgEmbeddingIndex {
    pool: Pool<Postgres>,
}

impl PgEmbeddingIndex {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_embedding_row(row: &PgRow) -> Result<Embedding> {
        let owner_type: String = row.get("owner_type");
        let source_type: Option<String> = row.get("source_type");
        Ok(Embedding {
            id: row.get("id"),
            organization_id: row.get("organization_id"),
            owner_type: owner_type.parse()?,
            owner_id: row.get("owner_id"),
            chunk_index: row.get("chunk_index"),
            vector: row.get("vector"),
            source_text: row.get("source_text"),
            source_type: source_type.map(|s| s.parse()).transpose()?,
            model: row.get("model"),
            created_at: row.get("created_at"),
        })
    }

    /// Delete and insert inside the caller's transaction.
    pub async fn replace_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner_type: OwnerType,
        owner_id: Uuid,
        embeddings: &[Embedding],
    ) -> Result<()> {
        sqlx::query("DELETE FROM embedding WHERE owner_type = $1 AND owner_id = $2")
            .bind(owner_type.as_str())
            .bind(owner_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;

        for embedding in embeddings {
            if embedding.owner_type != owner_type || embedding.owner_id != owner_id {
                return Err(Error::InvalidInput(format!(
                    "embedding {} does not belong to {} {}",
                    embedding.id, owner_type, owner_id
                )));
            }
            sqlx::query(
                "INSERT INTO embedding (id, organization_id, owner_type, owner_id, chunk_index,
                     vector, source_text, source_type, model, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(embedding.id)
            .bind(embedding.organization_id)
            .bind(owner_type.as_str())
            .bind(owner_id)
            .bind(embedding.chunk_index)
            .bind(&embedding.vector)
            .bind(&embedding.source_text)
            .bind(embedding.source_type.map(|s| s.as_str()))
            .bind(&embedding.model)
            .bind(embedding.created_at)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingIndex for PgEmbeddingIndex {
    async fn replace_for_owner(
        &self,
        owner_type: OwnerType,
        owner_id: Uuid,
        embeddings: Vec<Embedding>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        self.replace_tx(&mut tx, owner_type, owner_id, &embeddings)
            .await?;
        tx.commit().await.map_err(Error::Database)?;
        debug!(
            subsystem = "db",
            component = "embeddings",
            op = "replace_for_owner",
            owner_type = %owner_type,
            %owner_id,
            chunk_count = embeddings.len(),
            "Replaced embeddings"
        );
        Ok(())
    }

    async fn delete_for_owner(&self, owner_type: OwnerType, owner_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM embedding WHERE owner_type = $1 AND owner_id = $2")
            .bind(owner_type.as_str())
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn for_owner(&self, owner_type: OwnerType, owner_id: Uuid) -> Result<Vec<Embedding>> {
        let rows = sqlx::query(&format!(
            "SELECT {EMBEDDING_COLUMNS} FROM embedding
             WHERE owner_type = $1 AND owner_id = $2
             ORDER BY chunk_index"
        ))
        .bind(owner_type.as_str())
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_embedding_row).collect()
    }

    async fn list_for_organization(
        &self,
        organization_id: Uuid,
        owner_type: OwnerType,
    ) -> Result<Vec<Embedding>> {
        let rows = sqlx::query(&format!(
            "SELECT {EMBEDDING_COLUMNS} FROM embedding
             WHERE organization_id = $1 AND owner_type = $2
             ORDER BY owner_id, chunk_index"
        ))
        .bind(organization_id)
        .bind(owner_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_embedding_row).collect()
    }

    async fn query(&self, vector: &Vector, query: &EmbeddingQuery) -> Result<Vec<EmbeddingMatch>> {
        let owner_types: Vec<String> = query.owner_types.iter().map(|t| t.to_string()).collect();
        let source_types: Vec<String> = query.source_types.iter().map(|t| t.to_string()).collect();

        // `<=>` is cosine distance; similarity = 1 - distance.
        let rows = sqlx::query(&format!(
            "SELECT {EMBEDDING_COLUMNS}, score FROM (
                 SELECT *, 1.0 - (vector <=> $1::vector) AS score
                 FROM embedding
                 WHERE organization_id = $2
                   AND (cardinality($3::text[]) = 0 OR owner_type = ANY($3))
                   AND (cardinality($4::text[]) = 0 OR source_type = ANY($4))
                   AND (cardinality($5::uuid[]) = 0 OR owner_id = ANY($5))
             ) scored
             WHERE score >= $6
             ORDER BY score DESC, created_at DESC, owner_id ASC, chunk_index ASC
             LIMIT $7"
        ))
        .bind(vector)
        .bind(query.organization_id)
        .bind(&owner_types)
        .bind(&source_types)
        .bind(&query.owner_ids)
        .bind(f64::from(query.threshold))
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                let score: f64 = row.get("score");
                Ok(EmbeddingMatch {
                    embedding: Self::parse_embedding_row(row)?,
                    score: score as f32,
                })
            })
            .collect()
    }

    async fn count(&self, organization_id: Uuid) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM embedding WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}
