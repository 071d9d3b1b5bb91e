//! Administration handlers

use axum::{extract::State, Json};
use ruleflow_core::CacheStats;
use ruleflow_dsl::EndpointRecord;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::api::errors::ApiResult;
use crate::server::RuleflowServer;

/// Records behind the live dynamic routes
pub async fn list_endpoints_handler(State(server): State<Arc<RuleflowServer>>) -> Json<Vec<EndpointRecord>> {
    let routes = server.routes().await;
    Json(routes.records().into_iter().cloned().collect())
}

/// Reload the definitions directory
///
/// Catalog, flows, reference tables and the route table are replaced
/// together; on any error the previous state stays live.
pub async fn reload_handler(State(server): State<Arc<RuleflowServer>>) -> ApiResult<Json<Value>> {
    server.reload().await?;

    let flows = server.flows().list_definitions().await?.len();
    let endpoints = server.routes().await.len();
    info!(flows, endpoints, "Reload requested through the API");

    Ok(Json(json!({
        "status": "RELOADED",
        "flows": flows,
        "endpoints": endpoints,
    })))
}

/// Lookup cache statistics
pub async fn cache_stats_handler(State(server): State<Arc<RuleflowServer>>) -> Json<CacheStats> {
    Json(server.lookups().stats())
}
