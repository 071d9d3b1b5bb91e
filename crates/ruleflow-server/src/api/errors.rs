//! Error handling for the Ruleflow Server API
//!
//! Every error leaves the server as
//! `{"error": msg, "errorDetails": {"errorCode": "ERR_...", "errorMessage": msg}}`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use ruleflow_core::CoreError;
use ruleflow_dsl::DslError;
use serde_json::{json, Value};

use crate::error::ServerError;

/// API Error type for returning standard error responses
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),
    /// Not found (404)
    NotFound(String),
    /// Method not allowed (405)
    MethodNotAllowed(String),
    /// Conflict with the current resource state (409)
    Conflict(String),
    /// Internal server error (500)
    InternalServerError(String),
    /// Wrapped engine error
    Core(CoreError),
    /// Wrapped document error
    Dsl(DslError),
    /// Wrapped server error
    Server(ServerError),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Core(err)
    }
}

impl From<DslError> for ApiError {
    fn from(err: DslError) -> Self {
        ApiError::Dsl(err)
    }
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Core(e) => ApiError::Core(e),
            ServerError::Definition(e) => ApiError::Dsl(e),
            other => ApiError::Server(other),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::MethodNotAllowed(msg) => write!(f, "Method Not Allowed: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::Core(err) => write!(f, "{}", err),
            ApiError::Dsl(err) => write!(f, "{}", err),
            ApiError::Server(err) => write!(f, "{}", err),
        }
    }
}

fn core_status(err: &CoreError) -> (StatusCode, &'static str) {
    match err {
        CoreError::ValidationError(_) => (StatusCode::BAD_REQUEST, "ERR_VALIDATION_ERROR"),
        CoreError::LookupError(_) => (StatusCode::BAD_REQUEST, "ERR_LOOKUP_ERROR"),
        CoreError::FlowDefinitionNotFound(_) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND_FLOW"),
        CoreError::JobNotFound(_) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND_JOB"),
        CoreError::JobNotCompleted(_) => (StatusCode::CONFLICT, "ERR_JOB_NOT_COMPLETED"),
        CoreError::TransitionError(_) => (StatusCode::CONFLICT, "ERR_TRANSITION_ERROR"),
        CoreError::TimeoutError(_) => (StatusCode::GATEWAY_TIMEOUT, "ERR_TIMEOUT"),
        CoreError::GraphError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_GRAPH_ERROR"),
        CoreError::ExecutionError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_EXECUTION_ERROR"),
        CoreError::Cancelled(_) => (StatusCode::CONFLICT, "ERR_CANCELLED"),
        CoreError::SerializationError(_) => (StatusCode::BAD_REQUEST, "ERR_SERIALIZATION_ERROR"),
        CoreError::StateStoreError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_STATE_STORE_ERROR"),
        CoreError::ConfigurationError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_CONFIGURATION_ERROR"),
        CoreError::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_INTERNAL_SERVER_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let message = match &self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::MethodNotAllowed(msg)
            | ApiError::Conflict(msg)
            | ApiError::InternalServerError(msg) => msg.clone(),
            other => other.to_string(),
        };
        let mut details: Option<Value> = None;

        let (status, error_code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "ERR_BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND"),
            ApiError::MethodNotAllowed(_) => (StatusCode::METHOD_NOT_ALLOWED, "ERR_METHOD_NOT_ALLOWED"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "ERR_CONFLICT"),
            ApiError::InternalServerError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_INTERNAL_SERVER_ERROR"),
            ApiError::Core(err) => core_status(err),
            ApiError::Dsl(err) => {
                let issues: Vec<Value> = err
                    .validation_errors()
                    .iter()
                    .map(|e| json!({ "code": e.code, "message": e.message, "path": e.path }))
                    .collect();
                if !issues.is_empty() {
                    details = Some(Value::Array(issues));
                }
                match err {
                    // Rejected documents are client errors
                    DslError::Rejected(core) => {
                        let (status, _) = core_status(core);
                        let status = if status.is_server_error() { StatusCode::BAD_REQUEST } else { status };
                        (status, err.error_code())
                    }
                    _ => (StatusCode::BAD_REQUEST, err.error_code()),
                }
            }
            ApiError::Server(err) => match err {
                ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND"),
                ServerError::ValidationError(_) => (StatusCode::BAD_REQUEST, "ERR_VALIDATION_ERROR"),
                ServerError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_CONFIG_ERROR"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "ERR_INTERNAL_SERVER_ERROR"),
            },
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error_code, error = %message, "Request failed");
        } else {
            tracing::debug!(status = %status, error_code, error = %message, "Request rejected");
        }

        let mut error_details = json!({
            "errorCode": error_code,
            "errorMessage": message,
        });
        if let Some(details) = details {
            error_details["details"] = details;
        }

        let body = Json(json!({
            "error": message,
            "errorDetails": error_details,
        }));
        (status, body).into_response()
    }
}

/// Result type of API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let (status, body) = render(ApiError::BadRequest("nope".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "nope");
        assert_eq!(body["errorDetails"]["errorCode"], "ERR_BAD_REQUEST");
        assert_eq!(body["errorDetails"]["errorMessage"], "nope");
    }

    #[tokio::test]
    async fn test_core_error_statuses() {
        let (status, body) = render(CoreError::TransitionError("x".into()).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["errorDetails"]["errorCode"], "ERR_TRANSITION_ERROR");

        let (status, _) = render(CoreError::GraphError("cycle".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) = render(CoreError::JobNotFound("j".into()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rejected_graph_is_a_client_error() {
        let (status, body) = render(DslError::from(CoreError::GraphError("cycle".into())).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorDetails"]["errorCode"], "ERR_DSL_GRAPH");
    }
}
