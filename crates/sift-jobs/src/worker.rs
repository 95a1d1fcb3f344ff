//! Job worker and runner for processing background jobs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use sift_core::{defaults, EventBus, EventEnvelope, Job, JobRepository, JobType, Result, ServerEvent};
use sift_db::Stores;

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::retry::RetryPolicy;
use crate::DEFAULT_POLL_INTERVAL_MS;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent jobs.
    pub max_concurrent_jobs: usize,
    /// Per-job timeout. Running jobs older than this are requeued on start.
    pub job_timeout: Duration,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            job_timeout: Duration::from_secs(defaults::JOB_TIMEOUT_SECS),
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `JOB_POLL_INTERVAL_MS` | `5000` | Polling interval when queue is empty |
    /// | `JOB_TIMEOUT_SECS` | `1800` | Per-job timeout |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        let job_timeout = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(defaults::JOB_TIMEOUT_SECS));

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            job_timeout,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    events: Arc<EventBus>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to shut down and wait for in-flight jobs to finish.
    pub async fn shutdown(self) -> Result<()> {
        // A closed channel means the loop already exited.
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| sift_core::Error::Internal(format!("worker task failed: {}", e)))
    }

    /// Get a receiver for job lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }
}

/// Job worker that processes jobs from the queue.
pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    notify: Arc<Notify>,
    config: WorkerConfig,
    handlers: Arc<RwLock<HashMap<JobType, Arc<dyn JobHandler>>>>,
    events: Arc<EventBus>,
}

impl JobWorker {
    pub fn new(jobs: Arc<dyn JobRepository>, notify: Arc<Notify>, config: WorkerConfig) -> Self {
        Self {
            jobs,
            notify,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            events: Arc::new(EventBus::new(defaults::EVENT_BUS_CAPACITY)),
        }
    }

    /// Publish job events on a shared bus instead of a private one.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Register a handler for a job type.
    pub async fn register_handler(&self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type();
        let mut handlers = self.handlers.write().await;
        handlers.insert(job_type, handler);
        debug!(%job_type, "Registered job handler");
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });
        WorkerHandle {
            shutdown_tx,
            events,
            task,
        }
    }

    /// Claim up to `max_concurrent_jobs` at a time and process them concurrently.
    /// Only waits when the queue is empty; queueing a job wakes the worker early.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        match self.jobs.requeue_stale(self.config.job_timeout).await {
            Ok(0) => {}
            Ok(requeued) => warn!(requeued, "Requeued jobs abandoned by a previous worker"),
            Err(e) => error!(error = %e, "Failed to requeue stale jobs"),
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            "Job worker started"
        );

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            // Register interest before claiming so a job queued in between still wakes us.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let mut tasks = tokio::task::JoinSet::new();
            for _ in 0..self.config.max_concurrent_jobs {
                match self.claim_job().await {
                    Some(job) => {
                        let worker = self.clone_refs();
                        tasks.spawn(async move {
                            worker.execute_job(job).await;
                        });
                    }
                    None => break,
                }
            }

            if tasks.is_empty() {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = &mut notified => {}
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed = tasks.len(), "Processing concurrent job batch");
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
            }
        }

        info!("Job worker stopped");
    }

    async fn claim_job(&self) -> Option<Job> {
        let job_types: Vec<JobType> = {
            let handlers = self.handlers.read().await;
            handlers.keys().copied().collect()
        };
        if job_types.is_empty() {
            return None;
        }

        match self.jobs.claim_next_for_types(&job_types).await {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Failed to claim job");
                None
            }
        }
    }

    fn clone_refs(&self) -> JobWorkerRef {
        JobWorkerRef {
            jobs: self.jobs.clone(),
            handlers: self.handlers.clone(),
            events: self.events.clone(),
            job_timeout: self.config.job_timeout,
        }
    }

    pub async fn pending_count(&self) -> Result<i64> {
        self.jobs.pending_count().await
    }
}

/// Reference bundle for executing a single job in a spawned task.
struct JobWorkerRef {
    jobs: Arc<dyn JobRepository>,
    handlers: Arc<RwLock<HashMap<JobType, Arc<dyn JobHandler>>>>,
    events: Arc<EventBus>,
    job_timeout: Duration,
}

impl JobWorkerRef {
    async fn execute_job(self, job: Job) {
        let start = Instant::now();
        let job_id = job.id;
        let job_type = job.job_type;
        let item_id = job.content_item_id;
        let retry_count = job.retry_count;

        info!(%job_id, %job_type, "Processing job");
        self.events.emit(ServerEvent::JobStarted {
            job_id,
            job_type,
            item_id,
        });

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&job_type).cloned()
        };

        let result = match handler {
            Some(handler) => {
                let ctx = JobContext::new(job);
                match tokio::time::timeout(self.job_timeout, handler.execute(ctx)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(%job_id, %job_type, timeout_secs = self.job_timeout.as_secs(), "Job exceeded timeout");
                        JobResult::Retry(format!(
                            "job exceeded timeout of {}s",
                            self.job_timeout.as_secs()
                        ))
                    }
                }
            }
            None => {
                warn!(%job_type, "No handler registered for job type");
                JobResult::Failed(format!("no handler for job type: {}", job_type))
            }
        };

        let duration_ms = start.elapsed().as_millis() as i64;
        match result {
            JobResult::Success => {
                if let Err(e) = self.jobs.complete(job_id).await {
                    error!(error = %e, %job_id, "Failed to mark job as completed");
                } else {
                    info!(%job_id, %job_type, duration_ms, "Job completed successfully");
                    self.events.emit(ServerEvent::JobCompleted {
                        job_id,
                        job_type,
                        item_id,
                        duration_ms,
                    });
                }
            }
            JobResult::Failed(error) | JobResult::Retry(error) => {
                let delay = RetryPolicy::default().delay((retry_count + 1).max(1) as u32);
                match self.jobs.fail(job_id, &error, delay).await {
                    Err(e) => error!(error = %e, %job_id, "Failed to mark job as failed"),
                    Ok(status) => {
                        warn!(%job_id, %job_type, %error, %status, duration_ms, "Job failed");
                        self.events.emit(ServerEvent::JobFailed {
                            job_id,
                            job_type,
                            item_id,
                            error,
                        });
                    }
                }
            }
        }
    }
}

/// Builder for creating a job worker with handlers.
pub struct WorkerBuilder {
    jobs: Arc<dyn JobRepository>,
    notify: Arc<Notify>,
    config: WorkerConfig,
    events: Option<Arc<EventBus>>,
    handlers: Vec<Arc<dyn JobHandler>>,
}

impl WorkerBuilder {
    pub fn new(jobs: Arc<dyn JobRepository>, notify: Arc<Notify>) -> Self {
        Self {
            jobs,
            notify,
            config: WorkerConfig::default(),
            events: None,
            handlers: Vec::new(),
        }
    }

    pub fn from_stores(stores: &Stores) -> Self {
        Self::new(stores.jobs.clone(), stores.job_notify.clone())
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub async fn build(self) -> JobWorker {
        let mut worker = JobWorker::new(self.jobs, self.notify, self.config);
        if let Some(events) = self.events {
            worker = worker.with_events(events);
        }
        for handler in self.handlers {
            worker.register_handler(handler).await;
        }
        worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.max_concurrent_jobs, defaults::JOB_MAX_CONCURRENT);
        assert_eq!(config.job_timeout, Duration::from_secs(1800));
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builders() {
        let config = WorkerConfig::default()
            .with_poll_interval(50)
            .with_max_concurrent(0)
            .with_job_timeout(Duration::from_secs(5))
            .with_enabled(false);
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.max_concurrent_jobs, 1);
        assert_eq!(config.job_timeout, Duration::from_secs(5));
        assert!(!config.enabled);
    }
}
