//! Health check endpoint

use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::api::errors::ApiResult;
use crate::server::RuleflowServer;

/// Health check handler
///
/// Reports the server version and how many flows and dynamic endpoints are
/// currently live.
pub async fn health_check(State(server): State<Arc<RuleflowServer>>) -> ApiResult<Json<Value>> {
    debug!("Health check requested");

    let flows = server.flows().list_definitions().await?.len();
    let endpoints = server.routes().await.len();

    Ok(Json(json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION"),
        "flows": flows,
        "endpoints": endpoints,
    })))
}
