use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use ruleflow_server::{RuleflowServer, ServerConfig};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const CATALOG: &str = r#"
classes:
  - { id: tax_request, name: tax_request, classType: input }
  - { id: tax_work, name: tax_work, classType: variable, parentId: tax_request }
  - { id: tax_response, name: tax_response, classType: output, parentId: tax_request }
fields:
  - { id: tax_request.postal_code, classId: tax_request, name: postal_code, type: string }
  - { id: tax_request.base_amount, classId: tax_request, name: base_amount, type: decimal }
  - { id: tax_work.postal_code_exists, classId: tax_work, name: postal_code_exists, type: boolean }
  - { id: tax_work.province, classId: tax_work, name: province, type: string }
  - { id: tax_work.tax_rate, classId: tax_work, name: tax_rate, type: decimal }
  - { id: tax_response.total_tax, classId: tax_response, name: total_tax, type: decimal }
rules:
  - id: canadian_sales_tax
    name: Canadian sales tax
    classId: tax_request
    conditions:
      - id: c1
        sequence: 1
        function: exists_in_postal_code
        parameters:
          - { index: 0, kind: fieldRef, field: tax_request.postal_code }
          - { index: 1, kind: fieldRef, field: tax_work.postal_code_exists }
    actions:
      - id: a1
        sequence: 1
        function: get_province_from_postal_code
        parameters:
          - { index: 0, kind: fieldRef, field: tax_request.postal_code }
          - { index: 1, kind: fieldRef, field: tax_work.province }
      - id: a2
        sequence: 2
        function: get_tax_rate
        parameters:
          - { index: 0, kind: fieldRef, field: tax_work.province }
          - { index: 1, kind: literal, value: total, fieldType: string }
          - { index: 2, kind: fieldRef, field: tax_work.tax_rate }
      - id: a3
        sequence: 3
        function: calculate_tax_amount
        parameters:
          - { index: 0, kind: fieldRef, field: tax_request.base_amount }
          - { index: 1, kind: fieldRef, field: tax_work.tax_rate }
          - { index: 2, kind: fieldRef, field: tax_response.total_tax }
stations:
  - { id: validation, name: Validation }
  - { id: priced, name: Priced }
  - { id: rejected, name: Rejected }
"#;

const SALES_TAX_FLOW: &str = r#"{
  "flow": { "id": "sales_tax", "name": "Sales tax", "version": "1", "startNodes": ["validation"] },
  "nodes": [
    { "id": "validation", "type": "STATION", "referenceId": "validation" },
    { "id": "tax", "type": "RULE", "referenceId": "canadian_sales_tax" },
    { "id": "priced", "type": "STATION", "referenceId": "priced" },
    { "id": "rejected", "type": "STATION", "referenceId": "rejected" }
  ],
  "connections": [
    { "sourceId": "validation", "targetId": "tax", "type": "SUCCESS" },
    { "sourceId": "tax", "targetId": "priced", "type": "SUCCESS" },
    { "sourceId": "tax", "targetId": "rejected", "type": "FAILURE" }
  ]
}"#;

const ENDPOINTS: &str = r#"
endpoints:
  - id: tax_quote
    path: /tax/{postal_code}
    method: GET
    flowId: sales_tax
    requestClass: tax_request
    responseClass: tax_response
    parameters:
      - { name: postal_code, source: path, required: true }
      - { name: amount, source: query, required: true, field: base_amount }
  - id: tax_job
    path: /tax-jobs
    method: POST
    flowId: sales_tax
    requestClass: tax_request
    mode: async
"#;

fn write_definitions(dir: &Path) {
    std::fs::create_dir_all(dir.join("flows")).unwrap();
    std::fs::write(dir.join("catalog.yaml"), CATALOG).unwrap();
    std::fs::write(dir.join("endpoints.yaml"), ENDPOINTS).unwrap();
    std::fs::write(dir.join("flows/sales_tax.json"), SALES_TAX_FLOW).unwrap();
}

async fn setup() -> (TempDir, Arc<RuleflowServer>, Router) {
    let dir = tempfile::tempdir().unwrap();
    write_definitions(dir.path());

    let config = ServerConfig {
        definitions_dir: Some(dir.path().to_path_buf()),
        worker_count: 2,
        ..Default::default()
    };
    let server = RuleflowServer::new(config).await.unwrap();
    let app = server.router();
    (dir, server, app)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn wait_for_status(app: &Router, job_id: &str, wanted: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send(app, Method::GET, &format!("/v1/jobs/{}/status", job_id), None).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == wanted {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached {}", job_id, wanted);
}

#[tokio::test]
async fn test_health_reports_live_definitions() {
    let (_dir, _server, app) = setup().await;

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");
    assert_eq!(body["flows"], 1);
    assert_eq!(body["endpoints"], 2);
}

#[tokio::test]
async fn test_execute_flow_synchronously() {
    let (_dir, _server, app) = setup().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/flows/sales_tax/execute",
        Some(json!({ "postal_code": "M5V", "base_amount": 100 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["result"]["output"]["total_tax"], json!(13.0));
    assert_eq!(body["result"]["errors"], json!([]));
}

#[tokio::test]
async fn test_node_failures_are_returned_with_partial_results() {
    let (_dir, _server, app) = setup().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/flows/sales_tax/execute",
        Some(json!({ "input": { "postal_code": "ZZZ", "base_amount": 100 } })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(!body["result"]["errors"].as_array().unwrap().is_empty());
    assert!(body["result"]["output"].get("total_tax").is_none());
}

#[tokio::test]
async fn test_unknown_flow_is_not_found() {
    let (_dir, _server, app) = setup().await;

    let (status, body) = send(&app, Method::POST, "/v1/flows/nope/execute", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_NOT_FOUND_FLOW");
}

#[tokio::test]
async fn test_flow_import_export_and_delete() {
    let (_dir, _server, app) = setup().await;
    let document = json!({
        "flow": { "id": "triage", "name": "Triage", "version": "1" },
        "nodes": [
            { "id": "start", "type": "STATION", "referenceId": "validation",
              "settings": { "position": { "x": 1, "y": 2 } } },
            { "id": "done", "type": "STATION", "referenceId": "priced", "label": "Done" }
        ],
        "connections": [
            { "sourceId": "start", "targetId": "done", "type": "DEFAULT" }
        ]
    });

    let (status, body) = send(&app, Method::POST, "/v1/flows", Some(document.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["flowId"], "triage");

    let (status, exported) = send(&app, Method::GET, "/v1/flows/triage", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(exported["nodes"], document["nodes"]);
    assert_eq!(exported["connections"], document["connections"]);

    let (_, flows) = send(&app, Method::GET, "/v1/flows", None).await;
    assert_eq!(flows.as_array().unwrap().len(), 2);

    let (status, _) = send(&app, Method::DELETE, "/v1/flows/triage", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, "/v1/flows/triage", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_flow_with_unknown_reference_is_rejected() {
    let (_dir, _server, app) = setup().await;
    let document = json!({
        "flow": { "id": "broken", "name": "Broken", "version": "1" },
        "nodes": [ { "id": "r", "type": "RULE", "referenceId": "no_such_rule" } ]
    });

    let (status, body) = send(&app, Method::POST, "/v1/flows", Some(document)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_DSL_GRAPH");
}

#[tokio::test]
async fn test_async_job_lifecycle() {
    let (_dir, _server, app) = setup().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/jobs",
        Some(json!({ "flowId": "sales_tax", "input": { "postal_code": "H3A 0G4", "base_amount": "200.00" } })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let view = wait_for_status(&app, &job_id, "completed").await;
    assert_eq!(view["jobId"], job_id.as_str());
    assert!(view["workerId"].is_string());

    let (status, result) = send(&app, Method::GET, &format!("/v1/jobs/{}/result", job_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["output"]["total_tax"], json!(29.95));

    let (status, logs) = send(&app, Method::GET, &format!("/v1/jobs/{}/logs", job_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!logs.as_array().unwrap().is_empty());

    // completed is terminal
    let (status, body) = send(&app, Method::POST, &format!("/v1/jobs/{}/cancel", job_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_TRANSITION_ERROR");

    let (status, jobs) = send(&app, Method::GET, "/v1/jobs?flowId=sales_tax&status=completed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let (_dir, _server, app) = setup().await;

    let (status, body) = send(&app, Method::GET, "/v1/jobs/missing/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_NOT_FOUND_JOB");
}

#[tokio::test]
async fn test_workers_are_listed() {
    let (_dir, _server, app) = setup().await;

    let (status, body) = send(&app, Method::GET, "/v1/workers/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_dynamic_sync_endpoint() {
    let (_dir, _server, app) = setup().await;

    let (status, body) = send(&app, Method::GET, "/tax/M5V?amount=100", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["output"], json!({ "total_tax": 13.0 }));

    let (status, body) = send(&app, Method::GET, "/tax/M5V", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_BAD_REQUEST");

    let (status, _) = send(&app, Method::GET, "/tax/M5V?amount=lots", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dynamic_path_parameters_are_decoded() {
    let (_dir, _server, app) = setup().await;

    let (status, body) = send(&app, Method::GET, "/tax/M5V%203L9?amount=100", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"], json!({ "total_tax": 13.0 }));
    assert_eq!(body["errors"], json!([]));
}

#[tokio::test]
async fn test_large_amounts_keep_fixed_point_precision() {
    let (_dir, _server, app) = setup().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/flows/sales_tax/execute",
        Some(json!({ "postal_code": "M5V", "base_amount": "12345678901234567.89" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["output"]["total_tax"], json!("1604938257160493.83"));

    let (status, body) = send(&app, Method::GET, "/tax/M5V?amount=12345678901234567.89", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"]["total_tax"], json!("1604938257160493.83"));
}

#[tokio::test]
async fn test_dynamic_async_endpoint() {
    let (_dir, _server, app) = setup().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/tax-jobs",
        Some(json!({ "postal_code": "M5V", "base_amount": "50" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let job_id = body["jobId"].as_str().unwrap().to_string();
    wait_for_status(&app, &job_id, "completed").await;
}

#[tokio::test]
async fn test_unmatched_dynamic_requests() {
    let (_dir, _server, app) = setup().await;

    let (status, body) = send(&app, Method::GET, "/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_NOT_FOUND");

    let (status, _) = send(&app, Method::DELETE, "/tax/M5V", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_endpoints_are_listed() {
    let (_dir, _server, app) = setup().await;

    let (status, body) = send(&app, Method::GET, "/v1/endpoints", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["tax_quote", "tax_job"]);
}

#[tokio::test]
async fn test_reload_picks_up_new_documents() {
    let (dir, _server, app) = setup().await;

    std::fs::write(
        dir.path().join("flows/triage.yaml"),
        "flow: {id: triage, name: Triage, version: '1'}\nnodes:\n  - {id: s, type: STATION, referenceId: priced}\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("endpoints.yaml"), "endpoints: []\n").unwrap();

    let (status, body) = send(&app, Method::POST, "/v1/admin/reload", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flows"], 2);
    assert_eq!(body["endpoints"], 0);

    let (status, _) = send(&app, Method::GET, "/tax/M5V?amount=100", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_definitions() {
    let (dir, _server, app) = setup().await;

    std::fs::write(
        dir.path().join("flows/broken.json"),
        r#"{"flow": {"id": "broken", "name": "B", "version": "1"}, "nodes": [{"id": "r", "type": "RULE", "referenceId": "ghost"}]}"#,
    )
    .unwrap();

    let (status, _) = send(&app, Method::POST, "/v1/admin/reload", None).await;
    assert!(status.is_client_error());

    let (status, body) = send(&app, Method::GET, "/tax/M5V?amount=100", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"]["total_tax"], json!(13.0));
}

#[tokio::test]
async fn test_cache_statistics() {
    let (_dir, _server, app) = setup().await;

    send(&app, Method::GET, "/tax/M5V?amount=100", None).await;
    send(&app, Method::GET, "/tax/M5V?amount=100", None).await;

    let (status, body) = send(&app, Method::GET, "/v1/admin/cache", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["entries"].as_u64().unwrap() > 0);
    assert!(body["hits"].as_u64().unwrap() > 0);
}
