//! API module for the Ruleflow Server
//!
//! Management routes are fixed; every other request falls through to the
//! dynamic route table.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub mod admin;
pub mod dynamic;
pub mod errors;
pub mod flows;
pub mod health;
pub mod jobs;

use crate::server::RuleflowServer;

/// Build the router for API endpoints
pub fn build_router(server: Arc<RuleflowServer>) -> Router {
    Router::new()
        // Flow management
        .route("/v1/flows", get(flows::list_flows_handler).post(flows::import_flow_handler))
        .route(
            "/v1/flows/:flow_id",
            get(flows::export_flow_handler).delete(flows::delete_flow_handler),
        )
        .route("/v1/flows/:flow_id/execute", post(flows::execute_flow_handler))
        // Jobs
        .route("/v1/jobs", get(jobs::list_jobs_handler).post(jobs::submit_job_handler))
        .route("/v1/jobs/:job_id/status", get(jobs::job_status_handler))
        .route("/v1/jobs/:job_id/result", get(jobs::job_result_handler))
        .route("/v1/jobs/:job_id/logs", get(jobs::job_logs_handler))
        .route("/v1/jobs/:job_id/cancel", post(jobs::cancel_job_handler))
        .route("/v1/jobs/:job_id/retry", post(jobs::retry_job_handler))
        .route("/v1/workers/status", get(jobs::worker_status_handler))
        // Administration
        .route("/v1/endpoints", get(admin::list_endpoints_handler))
        .route("/v1/admin/reload", post(admin::reload_handler))
        .route("/v1/admin/cache", get(admin::cache_stats_handler))
        // Health check
        .route("/health", get(health::health_check))
        // Dynamic endpoints
        .fallback(dynamic::dispatch)
        .with_state(server)
}
