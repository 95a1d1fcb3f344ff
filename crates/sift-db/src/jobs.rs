//! Job repository implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::info;
use uuid::Uuid;

use sift_core::{
    defaults, new_v7, Error, Job, JobRepository, JobStatus, JobType, NewJob, Result,
};

const JOB_COLUMNS: &str = "id, content_item_id, organization_id, job_type, status, priority,
    payload, error_message, retry_count, max_retries, run_after, created_at, started_at,
    completed_at";

/// PostgreSQL implementation of JobRepository.
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    /// Wakes the worker as soon as a job is queued.
    notify: Arc<Notify>,
}

impl PgJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a repository sharing an existing notify handle.
    pub fn with_notify(pool: Pool<Postgres>, notify: Arc<Notify>) -> Self {
        Self { pool, notify }
    }

    /// Get the job notification handle for event-driven waking.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn parse_job_row(row: PgRow) -> Result<Job> {
        let job_type: String = row.get("job_type");
        let status: String = row.get("status");
        Ok(Job {
            id: row.get("id"),
            content_item_id: row.get("content_item_id"),
            organization_id: row.get("organization_id"),
            job_type: job_type.parse()?,
            status: status.parse()?,
            priority: row.get("priority"),
            payload: row.get("payload"),
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            run_after: row.get("run_after"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn queue(&self, job: NewJob) -> Result<Uuid> {
        let job_id = new_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO job_queue (id, content_item_id, organization_id, job_type, status,
                 priority, payload, max_retries, run_after, created_at)
             VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8, $8)",
        )
        .bind(job_id)
        .bind(job.content_item_id)
        .bind(job.organization_id)
        .bind(job.job_type.as_str())
        .bind(job.priority)
        .bind(&job.payload)
        .bind(defaults::JOB_MAX_RETRIES)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.notify.notify_waiters();
        Ok(job_id)
    }

    async fn queue_deduplicated(&self, job: NewJob) -> Result<Option<Uuid>> {
        let job_id = new_v7();
        let now = Utc::now();

        // INSERT ... WHERE NOT EXISTS keeps check-and-insert atomic under concurrent triggers.
        // Only pending jobs count: a running job may already be past the work a new claim needs.
        let inserted = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO job_queue (id, content_item_id, organization_id, job_type, status,
                 priority, payload, max_retries, run_after, created_at)
             SELECT $1, $2, $3, $4, 'pending', $5, $6, $7, $8, $8
             WHERE NOT EXISTS (
                 SELECT 1 FROM job_queue
                 WHERE job_type = $4
                   AND status = 'pending'
                   AND content_item_id IS NOT DISTINCT FROM $2
                   AND organization_id IS NOT DISTINCT FROM $3
             )
             RETURNING id",
        )
        .bind(job_id)
        .bind(job.content_item_id)
        .bind(job.organization_id)
        .bind(job.job_type.as_str())
        .bind(job.priority)
        .bind(&job.payload)
        .bind(defaults::JOB_MAX_RETRIES)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if inserted.is_some() {
            self.notify.notify_waiters();
        }
        Ok(inserted)
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let now = Utc::now();
        let type_strings: Vec<String> = job_types.iter().map(|jt| jt.to_string()).collect();

        // FOR UPDATE SKIP LOCKED lets several workers claim concurrently.
        let row = sqlx::query(&format!(
            "UPDATE job_queue
             SET status = 'running', started_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending'
                   AND run_after <= $1
                   AND (cardinality($2::text[]) = 0 OR job_type = ANY($2))
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .bind(&type_strings)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue SET status = 'completed', completed_at = $1, error_message = NULL
             WHERE id = $2",
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str, retry_delay: Duration) -> Result<JobStatus> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (retry_count, max_retries): (i32, i32) = sqlx::query_as(
            "SELECT retry_count, max_retries FROM job_queue WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let status = if retry_count < max_retries {
            let run_after = now
                + chrono::Duration::from_std(retry_delay)
                    .map_err(|e| Error::Internal(e.to_string()))?;
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'pending', retry_count = $1, error_message = $2,
                     started_at = NULL, run_after = $3
                 WHERE id = $4",
            )
            .bind(retry_count + 1)
            .bind(error)
            .bind(run_after)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
            JobStatus::Pending
        } else {
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'failed', completed_at = $1, error_message = $2
                 WHERE id = $3",
            )
            .bind(now)
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
            JobStatus::Failed
        };

        tx.commit().await.map_err(Error::Database)?;
        Ok(status)
    }

    async fn requeue_stale(&self, older_than: Duration) -> Result<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than).map_err(|e| Error::Internal(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE job_queue SET status = 'pending', started_at = NULL
             WHERE status = 'running' AND started_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let requeued = result.rows_affected();
        if requeued > 0 {
            info!(
                subsystem = "db",
                component = "jobs",
                op = "requeue_stale",
                requeued,
                "Re-queued stale running jobs"
            );
            self.notify.notify_waiters();
        }
        Ok(requeued)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn list_for_item(&self, content_item_id: Uuid) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM job_queue
             WHERE content_item_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(content_item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_job_row).collect()
    }

    async fn pending_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM job_queue WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}
