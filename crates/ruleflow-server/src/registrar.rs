//! Dynamic endpoint registrar
//!
//! Endpoint records are compiled into an immutable [`RouteTable`]. Each
//! route owns a handler closure capturing its record, the request and
//! response bindings resolved against the schema at build time, and the
//! job service. A reload builds a new table and swaps it in whole.

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::future::BoxFuture;
use percent_encoding::percent_decode_str;
use ruleflow_core::{FieldType, FlowId, JobService, SchemaRegistry};
use ruleflow_dsl::{check_bindings, EndpointRecord, HttpMethod, InvocationMode, ParamSource};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::errors::{ApiError, ApiResult};
use crate::api::flows::fail_on_graph_error;
use crate::error::ServerResult;

/// Values extracted from an inbound request
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    /// Named path segments
    pub path_params: HashMap<String, String>,
    /// Query string pairs
    pub query: HashMap<String, String>,
    /// Parsed JSON body
    pub body: Option<Value>,
}

/// Handler of one dynamic route
pub type RouteHandler = Arc<dyn Fn(RouteRequest) -> BoxFuture<'static, Response> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param(String),
}

fn parse_template(path: &str) -> Vec<Segment> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(s.to_string()),
        })
        .collect()
}

/// A parameter resolved against the request class
#[derive(Debug, Clone)]
struct ParamBinding {
    name: String,
    source: ParamSource,
    required: bool,
    key: String,
    field_type: Option<FieldType>,
}

/// Everything a handler needs besides the job service
#[derive(Debug)]
struct RouteBinding {
    record: Arc<EndpointRecord>,
    params: Vec<ParamBinding>,
    body_types: HashMap<String, FieldType>,
    response_fields: Option<Vec<String>>,
}

impl RouteBinding {
    fn resolve(record: Arc<EndpointRecord>, schema: &SchemaRegistry) -> Self {
        let class_of = |name: &str| schema.class_by_name(name).or_else(|| schema.class(name));

        let request = record.request_class.as_deref().and_then(class_of);
        let body_types: HashMap<String, FieldType> = request
            .map(|class| {
                schema
                    .fields_of(&class.id)
                    .into_iter()
                    .map(|f| (f.name.clone(), f.field_type))
                    .collect()
            })
            .unwrap_or_default();

        let params = record
            .parameters
            .iter()
            .map(|p| ParamBinding {
                name: p.name.clone(),
                source: p.source,
                required: p.required,
                key: p.field_name().to_string(),
                field_type: body_types.get(p.field_name()).copied(),
            })
            .collect();

        let response_fields = record.response_class.as_deref().and_then(class_of).map(|class| {
            schema
                .fields_of(&class.id)
                .into_iter()
                .map(|f| f.name.clone())
                .collect()
        });

        Self {
            record,
            params,
            body_types,
            response_fields,
        }
    }

    /// Assemble the Input map of a request
    fn input(&self, request: &RouteRequest) -> ApiResult<Map<String, Value>> {
        let mut input = Map::new();

        if let Some(body) = &request.body {
            let Value::Object(fields) = body else {
                return Err(ApiError::BadRequest("Request body must be a JSON object".to_string()));
            };
            for (key, value) in fields {
                input.insert(key.clone(), coerce(key, self.body_types.get(key).copied(), value)?);
            }
        }

        for param in &self.params {
            let raw = match param.source {
                ParamSource::Path => request.path_params.get(&param.name).cloned().map(Value::String),
                ParamSource::Query => request.query.get(&param.name).cloned().map(Value::String),
                ParamSource::Body => request
                    .body
                    .as_ref()
                    .and_then(|b| b.get(&param.name))
                    .filter(|v| !v.is_null())
                    .cloned(),
            };

            match raw {
                Some(raw) => {
                    input.insert(param.key.clone(), coerce(&param.name, param.field_type, &raw)?);
                }
                None if param.required => {
                    return Err(ApiError::BadRequest(format!(
                        "Missing required parameter '{}'",
                        param.name
                    )));
                }
                None => {}
            }
        }

        Ok(input)
    }

    fn response_output(&self, output: &Map<String, Value>) -> Map<String, Value> {
        match &self.response_fields {
            Some(fields) => output
                .iter()
                .filter(|(key, _)| fields.iter().any(|f| f == *key))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => output.clone(),
        }
    }
}

fn coerce(name: &str, field_type: Option<FieldType>, raw: &Value) -> ApiResult<Value> {
    match field_type {
        Some(field_type) => field_type
            .coerce(raw)
            .map(|v| v.to_json())
            .map_err(|e| ApiError::BadRequest(format!("Parameter '{}': {}", name, e))),
        None => Ok(raw.clone()),
    }
}

async fn invoke(binding: &RouteBinding, jobs: &JobService, request: RouteRequest) -> ApiResult<Response> {
    let record = &binding.record;
    let input = binding.input(&request)?;
    let flow_id = FlowId(record.flow_id.clone());

    match record.mode {
        InvocationMode::Async => {
            let job = jobs.submit(flow_id, input).await?;
            debug!(endpoint = %record.id, job_id = %job.id, "Dynamic endpoint submitted job");
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({ "jobId": job.id.0, "status": job.status })),
            )
                .into_response())
        }
        InvocationMode::Sync => {
            let job = jobs.execute_sync(flow_id, input).await?;
            debug!(endpoint = %record.id, job_id = %job.id, status = %job.status, "Dynamic endpoint ran job");

            fail_on_graph_error(&job)?;

            let (output, errors) = match &job.result {
                Some(result) => (binding.response_output(&result.output), json!(result.errors)),
                None => (Map::new(), json!([])),
            };
            let mut body = json!({
                "jobId": job.id.0,
                "status": job.status,
                "output": output,
                "errors": errors,
            });
            if let Some(message) = &job.error_message {
                body["errorMessage"] = json!(message);
            }
            Ok((StatusCode::OK, Json(body)).into_response())
        }
    }
}

/// A compiled dynamic route
pub struct RegisteredRoute {
    record: Arc<EndpointRecord>,
    method: Method,
    segments: Vec<Segment>,
    handler: RouteHandler,
}

impl RegisteredRoute {
    /// The endpoint record behind the route
    pub fn record(&self) -> &EndpointRecord {
        &self.record
    }

    /// Run the route handler
    pub async fn call(&self, request: RouteRequest) -> Response {
        (self.handler)(request).await
    }

    fn matches(&self, segments: &[&str]) -> Option<HashMap<String, String>> {
        if segments.len() != self.segments.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (pattern, actual) in self.segments.iter().zip(segments) {
            match pattern {
                Segment::Literal(literal) if literal == actual => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*actual).to_string());
                }
            }
        }
        Some(params)
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }
}

impl std::fmt::Debug for RegisteredRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredRoute")
            .field("id", &self.record.id)
            .field("method", &self.method)
            .field("path", &self.record.path)
            .finish()
    }
}

/// Outcome of matching a request against the table
#[derive(Debug)]
pub enum RouteMatch<'a> {
    /// A route and its path parameters
    Found(&'a RegisteredRoute, HashMap<String, String>),
    /// The path exists under another method
    MethodNotAllowed,
    /// No route has this path
    NotFound,
}

/// Immutable table of dynamic routes
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<RegisteredRoute>,
}

fn http_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

impl RouteTable {
    /// A table without routes
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile endpoint records into a table
    pub fn build(
        records: Vec<EndpointRecord>,
        schema: &SchemaRegistry,
        jobs: Arc<JobService>,
    ) -> ServerResult<Self> {
        check_bindings(&records, schema)?;

        let mut routes = Vec::with_capacity(records.len());
        for record in records {
            let record = Arc::new(record);
            let binding = Arc::new(RouteBinding::resolve(Arc::clone(&record), schema));
            let jobs = Arc::clone(&jobs);

            let handler: RouteHandler = Arc::new(move |request: RouteRequest| {
                let binding = Arc::clone(&binding);
                let jobs = Arc::clone(&jobs);
                Box::pin(async move {
                    match invoke(&binding, &jobs, request).await {
                        Ok(response) => response,
                        Err(err) => err.into_response(),
                    }
                })
            });

            debug!(endpoint = %record.id, method = %record.method, path = %record.path, "Route registered");
            routes.push(RegisteredRoute {
                method: http_method(record.method),
                segments: parse_template(&record.path),
                record,
                handler,
            });
        }

        info!(routes = routes.len(), "Route table built");
        Ok(Self { routes })
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table has no routes
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Records of every route in declaration order
    pub fn records(&self) -> Vec<&EndpointRecord> {
        self.routes.iter().map(|r| r.record()).collect()
    }

    /// Match a request; literal segments win over parameters.
    ///
    /// Segments are split on the raw path and then percent-decoded, so an
    /// escaped `/` stays inside its segment.
    pub fn find(&self, method: &Method, path: &str) -> RouteMatch<'_> {
        let decoded: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
            .collect();
        let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();

        let mut path_known = false;
        let mut best: Option<(&RegisteredRoute, HashMap<String, String>)> = None;
        for route in &self.routes {
            let Some(params) = route.matches(&segments) else {
                continue;
            };
            path_known = true;
            if &route.method != method {
                continue;
            }
            let better = best
                .as_ref()
                .map_or(true, |(current, _)| route.literal_count() > current.literal_count());
            if better {
                best = Some((route, params));
            }
        }

        match best {
            Some((route, params)) => RouteMatch::Found(route, params),
            None if path_known => RouteMatch::MethodNotAllowed,
            None => RouteMatch::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleflow_core::domain::repository::memory::{
        MemoryFlowDefinitionRepository, MemoryJobRepository, MemoryReferenceTableRepository,
    };
    use ruleflow_core::{
        ClassType, Field, FieldClass, FlowDefinitionService, FlowExecutionService, JobServiceConfig, LookupConfig,
        LookupService, RuleInterpreter,
    };
    use ruleflow_dsl::import_endpoints_value;

    fn schema() -> SchemaRegistry {
        let class = FieldClass {
            id: "order".into(),
            name: "order".into(),
            class_type: ClassType::Input,
            parent_id: None,
            description: None,
        };
        let field = |name: &str, field_type| Field {
            id: format!("order.{}", name),
            class_id: "order".into(),
            name: name.into(),
            field_type,
            size: None,
            default: None,
        };
        SchemaRegistry::new(
            vec![class],
            vec![field("id", FieldType::Integer), field("amount", FieldType::Decimal)],
        )
        .unwrap()
    }

    fn jobs() -> Arc<JobService> {
        let lookups = Arc::new(LookupService::new(
            Arc::new(MemoryReferenceTableRepository::new()),
            LookupConfig::default(),
        ));
        let interpreter = Arc::new(RuleInterpreter::new(Arc::new(Default::default()), lookups));
        Arc::new(JobService::new(
            Arc::new(MemoryJobRepository::new()),
            Arc::new(FlowDefinitionService::new(
                Arc::new(MemoryFlowDefinitionRepository::new()),
                Default::default(),
            )),
            Arc::new(FlowExecutionService::new(interpreter)),
            JobServiceConfig::default(),
        ))
    }

    fn table() -> RouteTable {
        let records = import_endpoints_value(serde_json::json!({
            "endpoints": [
                { "id": "get_order", "path": "/orders/{id}", "method": "GET", "flowId": "orders",
                  "requestClass": "order",
                  "parameters": [
                      { "name": "id", "source": "path", "required": true },
                      { "name": "amount", "source": "query", "required": true }
                  ] },
                { "id": "recent", "path": "/orders/recent", "method": "GET", "flowId": "orders" },
                { "id": "post_order", "path": "/orders/{id}", "method": "POST", "flowId": "orders",
                  "parameters": [ { "name": "id", "source": "path" } ] }
            ]
        }))
        .unwrap();
        RouteTable::build(records, &schema(), jobs()).unwrap()
    }

    fn request(path: &[(&str, &str)], query: &[(&str, &str)]) -> RouteRequest {
        let pairs = |items: &[(&str, &str)]| {
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>()
        };
        RouteRequest {
            path_params: pairs(path),
            query: pairs(query),
            body: None,
        }
    }

    #[test]
    fn test_parse_template() {
        assert_eq!(
            parse_template("/tax/{code}/rates"),
            vec![
                Segment::Literal("tax".into()),
                Segment::Param("code".into()),
                Segment::Literal("rates".into()),
            ]
        );
        assert!(parse_template("/").is_empty());
    }

    #[test]
    fn test_literal_segments_win() {
        let table = table();
        assert_eq!(table.len(), 3);

        match table.find(&Method::GET, "/orders/recent") {
            RouteMatch::Found(route, params) => {
                assert_eq!(route.record().id, "recent");
                assert!(params.is_empty());
            }
            other => panic!("unexpected match: {:?}", other),
        }

        match table.find(&Method::GET, "/orders/42/") {
            RouteMatch::Found(route, params) => {
                assert_eq!(route.record().id, "get_order");
                assert_eq!(params["id"], "42");
            }
            other => panic!("unexpected match: {:?}", other),
        }
    }

    #[test]
    fn test_path_parameters_are_percent_decoded() {
        let table = table();

        match table.find(&Method::GET, "/orders/A%20B%2FC") {
            RouteMatch::Found(route, params) => {
                assert_eq!(route.record().id, "get_order");
                assert_eq!(params["id"], "A B/C");
            }
            other => panic!("unexpected match: {:?}", other),
        }

        assert!(matches!(
            table.find(&Method::GET, "/%6Frders/recent"),
            RouteMatch::Found(route, _) if route.record().id == "recent"
        ));
    }

    #[test]
    fn test_unmatched_requests() {
        let table = table();
        assert!(matches!(table.find(&Method::DELETE, "/orders/42"), RouteMatch::MethodNotAllowed));
        assert!(matches!(table.find(&Method::GET, "/orders/42/items"), RouteMatch::NotFound));
        assert!(matches!(RouteTable::empty().find(&Method::GET, "/"), RouteMatch::NotFound));
    }

    #[test]
    fn test_input_is_coerced_with_the_request_class() {
        let binding = RouteBinding::resolve(Arc::new(table().records()[0].clone()), &schema());

        let input = binding
            .input(&request(&[("id", "42")], &[("amount", "19.5")]))
            .unwrap();
        assert_eq!(input["id"], serde_json::json!(42));
        assert_eq!(input["amount"], serde_json::json!(19.5));

        let missing = binding.input(&request(&[("id", "42")], &[])).unwrap_err();
        assert!(matches!(missing, ApiError::BadRequest(_)));

        let malformed = binding
            .input(&request(&[("id", "forty")], &[("amount", "1")]))
            .unwrap_err();
        assert!(matches!(malformed, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_unknown_request_class_is_rejected() {
        let records = import_endpoints_value(serde_json::json!({
            "endpoints": [{ "id": "e", "path": "/x", "method": "GET", "flowId": "f", "requestClass": "ghost" }]
        }))
        .unwrap();
        assert!(RouteTable::build(records, &schema(), jobs()).is_err());
    }
}
