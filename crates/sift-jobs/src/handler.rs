//! Job handlers for each job type.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use sift_core::{Error, Job, JobType, ProcessingStatus};
use sift_graph::KnowledgeGraphBuilder;

use crate::orchestrator::Orchestrator;

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
}

impl JobContext {
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    /// Content item this job runs for, if any.
    pub fn item_id(&self) -> Option<Uuid> {
        self.job.content_item_id
    }

    pub fn organization_id(&self) -> Option<Uuid> {
        self.job.organization_id
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully.
    Success,
    /// Job failed; it will not succeed on redelivery.
    Failed(String),
    /// Job should be retried after a delay.
    Retry(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: JobType) -> bool {
        self.job_type() == job_type
    }
}

/// No-op handler for testing.
pub struct NoOpHandler {
    job_type: JobType,
}

impl NoOpHandler {
    pub fn new(job_type: JobType) -> Self {
        Self { job_type }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        JobResult::Success
    }
}

/// Runs the claimed pipeline of a content item.
///
/// Step failures are recorded on the item by the orchestrator, so the job
/// itself succeeds. Only storage errors ask for redelivery.
pub struct ProcessContentHandler {
    orchestrator: Arc<Orchestrator>,
}

impl ProcessContentHandler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobHandler for ProcessContentHandler {
    fn job_type(&self) -> JobType {
        JobType::ProcessContent
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let Some(item_id) = ctx.item_id() else {
            return JobResult::Failed("process_content job has no content item".to_string());
        };
        match self.orchestrator.run(item_id).await {
            Ok(ProcessingStatus::Failed) => {
                info!(%item_id, "Pipeline run ended with a recorded failure");
                JobResult::Success
            }
            Ok(_) => JobResult::Success,
            Err(e @ Error::ItemNotFound(_)) => JobResult::Failed(e.to_string()),
            Err(e) => JobResult::Retry(e.to_string()),
        }
    }
}

/// Reclusters the topics of one organization.
///
/// Graph failures never touch item state; they are logged and retried.
pub struct RebuildGraphHandler {
    graph: Arc<KnowledgeGraphBuilder>,
}

impl RebuildGraphHandler {
    pub fn new(graph: Arc<KnowledgeGraphBuilder>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl JobHandler for RebuildGraphHandler {
    fn job_type(&self) -> JobType {
        JobType::RebuildKnowledgeGraph
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let Some(organization_id) = ctx.organization_id() else {
            return JobResult::Failed("graph rebuild job has no organization".to_string());
        };
        match self.graph.rebuild_topics(organization_id).await {
            Ok(summary) => {
                info!(
                    %organization_id,
                    topic_count = summary.topic_count,
                    created = summary.created,
                    matched = summary.matched,
                    removed = summary.removed,
                    "Knowledge graph rebuilt"
                );
                JobResult::Success
            }
            Err(e) => {
                warn!(%organization_id, error = %e, "Knowledge graph rebuild failed");
                JobResult::Retry(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sift_core::JobStatus;

    fn job(job_type: JobType, item: Option<Uuid>, org: Option<Uuid>) -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            content_item_id: item,
            organization_id: org,
            job_type,
            status: JobStatus::Running,
            priority: job_type.default_priority(),
            payload: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            run_after: now,
            created_at: now,
            started_at: Some(now),
            completed_at: None,
        }
    }

    #[test]
    fn test_job_context_ids() {
        let item = Uuid::new_v4();
        let org = Uuid::new_v4();
        let ctx = JobContext::new(job(JobType::ProcessContent, Some(item), Some(org)));
        assert_eq!(ctx.item_id(), Some(item));
        assert_eq!(ctx.organization_id(), Some(org));

        let ctx = JobContext::new(job(JobType::RebuildKnowledgeGraph, None, Some(org)));
        assert_eq!(ctx.item_id(), None);
    }

    #[tokio::test]
    async fn test_noop_handler() {
        let handler = NoOpHandler::new(JobType::ProcessContent);
        assert!(handler.can_handle(JobType::ProcessContent));
        assert!(!handler.can_handle(JobType::RebuildKnowledgeGraph));

        let ctx = JobContext::new(job(JobType::ProcessContent, None, None));
        assert!(matches!(handler.execute(ctx).await, JobResult::Success));
    }
}
