//! Flow definition handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use ruleflow_core::{CoreError, ErrorKind, FlowId, FlowSummary, Job, JobStatus};
use ruleflow_dsl::{export_flow, import_flow_value};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::api::errors::{ApiError, ApiResult};
use crate::server::RuleflowServer;

/// List deployed flows
pub async fn list_flows_handler(State(server): State<Arc<RuleflowServer>>) -> ApiResult<Json<Vec<FlowSummary>>> {
    Ok(Json(server.flows().list_definitions().await?))
}

/// Import a flow document and deploy it
pub async fn import_flow_handler(
    State(server): State<Arc<RuleflowServer>>,
    Json(document): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let definition = import_flow_value(document)?;
    let flow_id = definition.id.clone();

    server.flows().deploy_definition(definition).await.map_err(|e| match e {
        // Graph problems here come from the submitted document
        CoreError::GraphError(_) | CoreError::ValidationError(_) => ApiError::Dsl(e.into()),
        other => ApiError::Core(other),
    })?;

    info!(%flow_id, "Flow imported");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "flowId": flow_id.0, "status": "DEPLOYED" })),
    ))
}

/// Export a deployed flow as a document
pub async fn export_flow_handler(
    State(server): State<Arc<RuleflowServer>>,
    Path(flow_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let definition = server.flows().get_definition(&FlowId(flow_id)).await?;
    Ok(Json(export_flow(&definition)?))
}

/// Undeploy a flow
pub async fn delete_flow_handler(
    State(server): State<Arc<RuleflowServer>>,
    Path(flow_id): Path<String>,
) -> ApiResult<StatusCode> {
    let flow_id = FlowId(flow_id);
    server.flows().undeploy_definition(&flow_id).await?;
    info!(%flow_id, "Flow undeployed");
    Ok(StatusCode::NO_CONTENT)
}

/// Run a flow synchronously and return the final job
pub async fn execute_flow_handler(
    State(server): State<Arc<RuleflowServer>>,
    Path(flow_id): Path<String>,
    Json(input): Json<Value>,
) -> ApiResult<Json<Job>> {
    let Value::Object(input) = input else {
        return Err(ApiError::BadRequest("Input must be a JSON object".to_string()));
    };

    let job = server.jobs().execute_sync(FlowId(flow_id), unwrap_input(input)).await?;
    fail_on_graph_error(&job)?;
    Ok(Json(job))
}

/// Graph failures are internal inconsistencies, not node-level outcomes
pub(crate) fn fail_on_graph_error(job: &Job) -> ApiResult<()> {
    if job.status == JobStatus::Failed && job.failure_kind == Some(ErrorKind::Graph) {
        return Err(ApiError::Core(CoreError::GraphError(
            job.error_message.clone().unwrap_or_default(),
        )));
    }
    Ok(())
}

/// Input maps may be posted bare or wrapped in `{"input": {...}}`
pub(crate) fn unwrap_input(mut body: Map<String, Value>) -> Map<String, Value> {
    match body.remove("input") {
        Some(Value::Object(input)) if body.is_empty() => input,
        Some(other) => {
            body.insert("input".to_string(), other);
            body
        }
        None => body,
    }
}
