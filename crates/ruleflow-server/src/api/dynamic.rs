//! Fallback dispatch into the dynamic route table

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{Method, Uri},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::api::errors::ApiError;
use crate::registrar::{RouteMatch, RouteRequest};
use crate::server::RuleflowServer;

/// Match the request against the current route table and run the route
pub async fn dispatch(
    State(server): State<Arc<RuleflowServer>>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let routes = server.routes().await;
    let path = uri.path();

    let (route, path_params) = match routes.find(&method, path) {
        RouteMatch::Found(route, params) => (route, params),
        RouteMatch::MethodNotAllowed => {
            return ApiError::MethodNotAllowed(format!("{} {}", method, path)).into_response();
        }
        RouteMatch::NotFound => {
            return ApiError::NotFound(format!("No route for {} {}", method, path)).into_response();
        }
    };

    let body = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => Some(value),
            Err(e) => return ApiError::BadRequest(format!("Invalid JSON body: {}", e)).into_response(),
        }
    };

    debug!(endpoint = %route.record().id, %method, path, "Dynamic dispatch");
    route
        .call(RouteRequest {
            path_params,
            query,
            body,
        })
        .await
}
