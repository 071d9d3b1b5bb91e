//! Job handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use ruleflow_core::{FlowId, Job, JobFilter, JobId, JobLogEntry, JobResult, JobStatus, JobStatusView, WorkerStatus};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::api::errors::ApiResult;
use crate::server::RuleflowServer;

/// Body of an asynchronous submission
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    /// Flow to run
    pub flow_id: String,
    /// Input map
    #[serde(default)]
    pub input: Map<String, Value>,
}

/// Filters of the job listing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsQuery {
    /// Only jobs of this flow
    pub flow_id: Option<String>,
    /// Only jobs in this status
    pub status: Option<JobStatus>,
    /// Maximum number of jobs
    pub limit: Option<usize>,
}

/// Submit a job and return before it runs
pub async fn submit_job_handler(
    State(server): State<Arc<RuleflowServer>>,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let job = server.jobs().submit(FlowId(request.flow_id), request.input).await?;
    info!(job_id = %job.id, flow_id = %job.flow_id, "Job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "jobId": job.id.0, "status": job.status })),
    ))
}

/// List jobs
pub async fn list_jobs_handler(
    State(server): State<Arc<RuleflowServer>>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    let filter = JobFilter {
        flow_id: query.flow_id.map(FlowId),
        status: query.status,
        limit: query.limit,
    };
    Ok(Json(server.jobs().list_jobs(&filter).await?))
}

/// Status view of a job
pub async fn job_status_handler(
    State(server): State<Arc<RuleflowServer>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusView>> {
    Ok(Json(server.jobs().status(&JobId(job_id)).await?))
}

/// Result of a completed job
pub async fn job_result_handler(
    State(server): State<Arc<RuleflowServer>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResult>> {
    Ok(Json(server.jobs().result(&JobId(job_id)).await?))
}

/// Audit log of a job
pub async fn job_logs_handler(
    State(server): State<Arc<RuleflowServer>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Vec<JobLogEntry>>> {
    Ok(Json(server.jobs().logs(&JobId(job_id)).await?))
}

/// Cancel a submitted or running job
pub async fn cancel_job_handler(
    State(server): State<Arc<RuleflowServer>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job = server.jobs().cancel(&JobId(job_id)).await?;
    info!(job_id = %job.id, "Job cancelled");
    Ok(Json(job))
}

/// Resubmit a failed job as a new job
pub async fn retry_job_handler(
    State(server): State<Arc<RuleflowServer>>,
    Path(job_id): Path<String>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let job = server.jobs().retry(&JobId(job_id)).await?;
    info!(job_id = %job.id, retry_count = job.retry_count, "Job resubmitted");
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// State of every worker
pub async fn worker_status_handler(State(server): State<Arc<RuleflowServer>>) -> Json<Vec<WorkerStatus>> {
    Json(server.jobs().worker_status())
}
