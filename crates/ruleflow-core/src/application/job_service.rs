//! Job lifecycle
//!
//! A job wraps one traversal of a flow. Status changes go through
//! [`JobRepository::compare_and_swap`] so that a worker finishing a job and
//! a caller cancelling it cannot overwrite each other. Asynchronous jobs are
//! queued and drained by a worker pool started with
//! [`JobService::start_workers`]; until then submitted jobs stay `submitted`.

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::application::flow_definition_service::FlowDefinitionService;
use crate::application::flow_execution_service::{CancelFlag, Execution, FlowExecutionService};
use crate::domain::context::{ExecutionContext, Severity};
use crate::domain::flow_definition::FlowId;
use crate::domain::job::{
    Job, JobId, JobLogEntry, JobResult, JobStatus, WorkerState, WorkerStatus,
};
use crate::domain::repository::{JobFilter, JobRepository};
use crate::error::ErrorKind;
use crate::CoreError;

const COMPONENT: &str = "job_service";

/// Job service configuration
#[derive(Debug, Clone)]
pub struct JobServiceConfig {
    /// Capacity of the submission queue
    pub queue_capacity: usize,
    /// Maximum retry count of a job chain
    pub max_retries: u32,
    /// Bound on every job repository call and on queue waits
    pub job_query_timeout: Duration,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_retries: 3,
            job_query_timeout: Duration::from_millis(5000),
        }
    }
}

/// Externally visible status of a job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    /// Job id
    pub job_id: String,
    /// Flow id
    pub flow_id: String,
    /// Status
    pub status: JobStatus,
    /// Creation timestamp
    pub created_at: chrono::DateTime<Utc>,
    /// Start timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<Utc>>,
    /// Completion timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<Utc>>,
    /// Worker that ran the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    /// Retry count
    pub retry_count: u32,
    /// Error message of a failed job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.0.clone(),
            flow_id: job.flow_id.0.clone(),
            status: job.status,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            worker_id: job.worker_id.clone(),
            retry_count: job.retry_count,
            error_message: job.error_message.clone(),
        }
    }
}

/// Service owning the job lifecycle
pub struct JobService {
    jobs: Arc<dyn JobRepository>,
    flows: Arc<FlowDefinitionService>,
    executor: Arc<FlowExecutionService>,
    config: JobServiceConfig,
    queue_tx: mpsc::Sender<JobId>,
    queue_rx: Arc<Mutex<mpsc::Receiver<JobId>>>,
    workers_started: AtomicBool,
    cancel_flags: DashMap<String, CancelFlag>,
    workers: DashMap<String, WorkerStatus>,
}

impl JobService {
    /// Create a job service; no worker runs until [`JobService::start_workers`]
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        flows: Arc<FlowDefinitionService>,
        executor: Arc<FlowExecutionService>,
        config: JobServiceConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            jobs,
            flows,
            executor,
            config,
            queue_tx,
            queue_rx: Arc::new(Mutex::new(queue_rx)),
            workers_started: AtomicBool::new(false),
            cancel_flags: DashMap::new(),
            workers: DashMap::new(),
        }
    }

    /// Flow definition service used to resolve graphs
    pub fn flows(&self) -> &Arc<FlowDefinitionService> {
        &self.flows
    }

    /// Submit a job for asynchronous execution
    pub async fn submit(&self, flow_id: FlowId, input: Map<String, Value>) -> Result<Job, CoreError> {
        // Fail fast on unknown flows
        self.flows.get_definition(&flow_id).await?;

        let job = Job::new(flow_id, input);
        self.bounded(self.jobs.insert(&job)).await?;
        self.log(&job.id, "INFO", COMPONENT, "Job submitted").await;
        self.enqueue(&job).await?;

        info!(job_id = %job.id, flow_id = %job.flow_id, "Job submitted");
        Ok(job)
    }

    /// Run a job inline and return its final record
    pub async fn execute_sync(&self, flow_id: FlowId, input: Map<String, Value>) -> Result<Job, CoreError> {
        self.flows.get_definition(&flow_id).await?;

        let job = Job::new(flow_id, input);
        self.bounded(self.jobs.insert(&job)).await?;
        self.log(&job.id, "INFO", COMPONENT, "Job submitted for synchronous execution").await;

        self.run_job(&job.id, "sync").await
    }

    /// Job record
    pub async fn get(&self, id: &JobId) -> Result<Job, CoreError> {
        self.bounded(self.jobs.get(id))
            .await?
            .ok_or_else(|| CoreError::JobNotFound(id.0.clone()))
    }

    /// Status view of a job
    pub async fn status(&self, id: &JobId) -> Result<JobStatusView, CoreError> {
        Ok(JobStatusView::from(&self.get(id).await?))
    }

    /// Result of a completed job
    pub async fn result(&self, id: &JobId) -> Result<JobResult, CoreError> {
        let job = self.get(id).await?;
        match (job.status, job.result) {
            (JobStatus::Completed, Some(result)) => Ok(result),
            (status, _) => Err(CoreError::JobNotCompleted(format!("Job {} is {}", id, status))),
        }
    }

    /// Audit log of a job
    pub async fn logs(&self, id: &JobId) -> Result<Vec<JobLogEntry>, CoreError> {
        self.get(id).await?;
        self.bounded(self.jobs.logs(id)).await
    }

    /// Jobs matching a filter
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, CoreError> {
        self.bounded(self.jobs.list(filter)).await
    }

    /// Cancel a submitted or running job
    ///
    /// A running job stops before its next node; a function call in flight
    /// runs to completion.
    pub async fn cancel(&self, id: &JobId) -> Result<Job, CoreError> {
        let job = self.get(id).await?;
        let expected = job.status;
        let mut cancelled = job;
        cancelled.transition(JobStatus::Cancelled)?;
        cancelled.error_message = Some("Cancelled by request".to_string());

        let stored = self
            .bounded(self.jobs.compare_and_swap(id, expected, cancelled))
            .await?;
        if let Some(flag) = self.cancel_flags.get(&id.0) {
            flag.store(true, Ordering::SeqCst);
        }

        self.log(id, "WARN", COMPONENT, format!("Job cancelled while {}", expected)).await;
        info!(job_id = %id, previous = %expected, "Job cancelled");
        Ok(stored)
    }

    /// Resubmit a failed job as a new job
    pub async fn retry(&self, id: &JobId) -> Result<Job, CoreError> {
        let job = self.get(id).await?;
        if job.status != JobStatus::Failed {
            return Err(CoreError::TransitionError(format!(
                "Only failed jobs can be retried; job {} is {}",
                id, job.status
            )));
        }
        if !job.failure_kind.map_or(false, |kind| kind.is_retryable()) {
            return Err(CoreError::ValidationError(format!(
                "Job {} failed with a non-retryable error",
                id
            )));
        }
        if job.retry_count >= self.config.max_retries {
            return Err(CoreError::ValidationError(format!(
                "Job {} reached the retry limit of {}",
                id, self.config.max_retries
            )));
        }

        let retry = job.retry();
        self.bounded(self.jobs.insert(&retry)).await?;
        self.log(&retry.id, "INFO", COMPONENT, format!("Retry {} of job {}", retry.retry_count, id))
            .await;
        self.log(id, "INFO", COMPONENT, format!("Retried as job {}", retry.id)).await;
        self.enqueue(&retry).await?;

        info!(job_id = %retry.id, retry_of = %id, retry_count = retry.retry_count, "Job retried");
        Ok(retry)
    }

    /// Snapshot of the worker pool
    pub fn worker_status(&self) -> Vec<WorkerStatus> {
        let mut workers: Vec<WorkerStatus> = self.workers.iter().map(|w| w.value().clone()).collect();
        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        workers
    }

    /// Spawn `count` workers draining the submission queue; only the first call has an effect
    pub fn start_workers(self: &Arc<Self>, count: usize) {
        if self.workers_started.swap(true, Ordering::SeqCst) {
            warn!("Workers already started");
            return;
        }

        for n in 0..count.max(1) {
            let worker_id = format!("worker-{}", n + 1);
            self.workers.insert(
                worker_id.clone(),
                WorkerStatus {
                    worker_id: worker_id.clone(),
                    state: WorkerState::Idle,
                    current_job_id: None,
                    jobs_processed: 0,
                    last_heartbeat: Utc::now(),
                },
            );

            let service = Arc::clone(self);
            tokio::spawn(async move {
                service.worker_loop(worker_id).await;
            });
        }
        info!(workers = count.max(1), "Job workers started");
    }

    async fn worker_loop(self: Arc<Self>, worker_id: String) {
        loop {
            let next = {
                let mut queue = self.queue_rx.lock().await;
                queue.recv().await
            };
            let Some(job_id) = next else {
                debug!(worker_id = %worker_id, "Queue closed, worker exiting");
                break;
            };

            self.set_worker(&worker_id, WorkerState::Busy, Some(job_id.clone()), false);
            if let Err(e) = self.run_job(&job_id, &worker_id).await {
                error!(worker_id = %worker_id, job_id = %job_id, error = %e, "Job execution error");
            }
            self.set_worker(&worker_id, WorkerState::Idle, None, true);
        }
    }

    fn set_worker(&self, worker_id: &str, state: WorkerState, job: Option<JobId>, finished: bool) {
        if let Some(mut worker) = self.workers.get_mut(worker_id) {
            worker.state = state;
            worker.current_job_id = job;
            worker.last_heartbeat = Utc::now();
            if finished {
                worker.jobs_processed += 1;
            }
        }
    }

    async fn enqueue(&self, job: &Job) -> Result<(), CoreError> {
        self.cancel_flags
            .insert(job.id.0.clone(), Arc::new(AtomicBool::new(false)));

        let sent = tokio::time::timeout(self.config.job_query_timeout, self.queue_tx.send(job.id.clone())).await;
        let failure = match sent {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(_)) => CoreError::StateStoreError("Job queue is closed".to_string()),
            Err(_) => CoreError::TimeoutError(format!(
                "Job queue stayed full for {}ms",
                self.config.job_query_timeout.as_millis()
            )),
        };

        // The job never reached a worker
        warn!(job_id = %job.id, error = %failure, "Failed to enqueue job");
        self.cancel_flags.remove(&job.id.0);
        self.log(&job.id, "ERROR", COMPONENT, format!("Enqueue failed: {}", failure)).await;
        let mut cancelled = job.clone();
        if cancelled.transition(JobStatus::Cancelled).is_ok() {
            cancelled.error_message = Some(failure.to_string());
            if let Err(e) = self
                .bounded(self.jobs.compare_and_swap(&job.id, JobStatus::Submitted, cancelled))
                .await
            {
                warn!(job_id = %job.id, error = %e, "Failed to cancel job that was never enqueued");
            }
        }
        Err(failure)
    }

    /// Drive one job from `submitted` to a terminal status
    async fn run_job(&self, id: &JobId, worker_id: &str) -> Result<Job, CoreError> {
        let job = self.get(id).await?;
        if job.status != JobStatus::Submitted {
            debug!(job_id = %id, status = %job.status, "Skipping job that is no longer submitted");
            self.cancel_flags.remove(&id.0);
            return Ok(job);
        }

        let mut running = job.clone();
        running.transition(JobStatus::Running)?;
        running.worker_id = Some(worker_id.to_string());
        let running = match self
            .bounded(self.jobs.compare_and_swap(id, JobStatus::Submitted, running))
            .await
        {
            Ok(job) => job,
            Err(CoreError::TransitionError(reason)) => {
                debug!(job_id = %id, reason = %reason, "Job changed status before it started");
                self.cancel_flags.remove(&id.0);
                return self.get(id).await;
            }
            Err(e) => return Err(e),
        };
        info!(job_id = %id, flow_id = %running.flow_id, worker_id = %worker_id, "Job running");
        self.log(id, "INFO", COMPONENT, format!("Job started on {}", worker_id)).await;

        let cancel = self
            .cancel_flags
            .entry(id.0.clone())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone();

        let outcome = self.traverse(&running, cancel).await;
        self.cancel_flags.remove(&id.0);

        let mut finished = running.clone();
        match outcome {
            Ok(execution) => {
                for node in &execution.report.visited {
                    self.log(
                        id,
                        "DEBUG",
                        "traversal",
                        format!(
                            "{} {} {}",
                            node.kind,
                            node.node_id,
                            if node.success { "succeeded" } else { "failed" }
                        ),
                    )
                    .await;
                }

                let success = execution.report.success;
                let (message, kind) = failure_summary(&execution.context);
                finished.result = Some(job_result(execution));
                if success {
                    finished.transition(JobStatus::Completed)?;
                } else {
                    finished.transition(JobStatus::Failed)?;
                    finished.error_message = Some(message);
                    finished.failure_kind = Some(kind);
                }
            }
            Err(CoreError::Cancelled(reason)) => {
                debug!(job_id = %id, reason = %reason, "Traversal observed cancellation");
                return self.get(id).await;
            }
            Err(e) => {
                finished.transition(JobStatus::Failed)?;
                finished.error_message = Some(e.to_string());
                finished.failure_kind = Some(e.kind());
            }
        }

        let status = finished.status;
        let stored = match self
            .bounded(self.jobs.compare_and_swap(id, JobStatus::Running, finished))
            .await
        {
            Ok(job) => job,
            Err(CoreError::TransitionError(_)) => {
                // Cancelled while the last node was running
                return self.get(id).await;
            }
            Err(e) => return Err(e),
        };

        match status {
            JobStatus::Completed => {
                info!(job_id = %id, "Job completed");
                self.log(id, "INFO", COMPONENT, "Job completed").await;
            }
            _ => {
                warn!(job_id = %id, error = ?stored.error_message, "Job failed");
                self.log(
                    id,
                    "ERROR",
                    COMPONENT,
                    format!("Job failed: {}", stored.error_message.clone().unwrap_or_default()),
                )
                .await;
            }
        }
        Ok(stored)
    }

    async fn traverse(&self, job: &Job, cancel: CancelFlag) -> Result<Execution, CoreError> {
        let (graph, catalog) = self.flows.graph(&job.flow_id).await?;
        let ctx = ExecutionContext::new(job.input.clone());
        self.executor.execute(graph, catalog, ctx, cancel).await
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T, CoreError>>) -> Result<T, CoreError> {
        match tokio::time::timeout(self.config.job_query_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::TimeoutError(format!(
                "Job store call exceeded {}ms",
                self.config.job_query_timeout.as_millis()
            ))),
        }
    }

    async fn log(&self, id: &JobId, level: &str, component: &str, message: impl Into<String>) {
        let entry = JobLogEntry::new(level, component, message);
        if let Err(e) = self.bounded(self.jobs.append_log(id, entry)).await {
            warn!(job_id = %id, error = %e, "Failed to append job log");
        }
    }
}

fn job_result(execution: Execution) -> JobResult {
    let output_size = serde_json::to_vec(&execution.context.output)
        .map(|bytes| bytes.len())
        .unwrap_or_default();
    JobResult {
        output: execution.context.output,
        variables: execution.context.variables,
        errors: execution.context.errors,
        visited: execution.report.visited,
        output_size,
        completed_at: Utc::now(),
    }
}

/// Message and class of the last error recorded in a failed traversal
fn failure_summary(ctx: &ExecutionContext) -> (String, ErrorKind) {
    ctx.errors
        .iter()
        .rev()
        .find(|e| e.severity == Severity::Error)
        .or_else(|| ctx.errors.last())
        .map(|e| (e.message.clone(), e.kind))
        .unwrap_or_else(|| {
            (
                "No branch ended successfully".to_string(),
                ErrorKind::Execution,
            )
        })
}
