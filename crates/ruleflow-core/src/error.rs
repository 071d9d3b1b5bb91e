use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type for the Ruleflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Required input or parameter missing, or of the wrong type
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Field, function, table or reference key not found
    #[error("Lookup error: {0}")]
    LookupError(String),

    /// A function call failed internally
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// Cycle detected, missing start node or other structural problem
    #[error("Graph error: {0}")]
    GraphError(String),

    /// Illegal job status change
    #[error("Transition error: {0}")]
    TransitionError(String),

    /// External lookup or queue wait exceeded its bound
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Flow definition not found
    #[error("Flow definition not found: {0}")]
    FlowDefinitionNotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Job result requested before the job completed
    #[error("Job not completed: {0}")]
    JobNotCompleted(String),

    /// Traversal stopped because the job was cancelled
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of errors, persisted with error descriptors and failed jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// See [`CoreError::ValidationError`]
    Validation,
    /// See [`CoreError::LookupError`]
    Lookup,
    /// See [`CoreError::ExecutionError`]
    Execution,
    /// See [`CoreError::GraphError`]
    Graph,
    /// See [`CoreError::TransitionError`]
    Transition,
    /// See [`CoreError::TimeoutError`]
    Timeout,
    /// See [`CoreError::Cancelled`]
    Cancelled,
    /// Everything else
    Internal,
}

impl ErrorKind {
    /// Whether a job that failed with this kind may be resubmitted
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Execution | ErrorKind::Timeout)
    }
}

impl CoreError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::ValidationError(_) | CoreError::JobNotCompleted(_) => ErrorKind::Validation,
            CoreError::LookupError(_)
            | CoreError::FlowDefinitionNotFound(_)
            | CoreError::JobNotFound(_) => ErrorKind::Lookup,
            CoreError::ExecutionError(_) => ErrorKind::Execution,
            CoreError::GraphError(_) => ErrorKind::Graph,
            CoreError::TransitionError(_) => ErrorKind::Transition,
            CoreError::TimeoutError(_) => ErrorKind::Timeout,
            CoreError::Cancelled(_) => ErrorKind::Cancelled,
            CoreError::SerializationError(_)
            | CoreError::StateStoreError(_)
            | CoreError::ConfigurationError(_)
            | CoreError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Errors that end the job instead of failing a single node
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::GraphError(_)
                | CoreError::TransitionError(_)
                | CoreError::Cancelled(_)
                | CoreError::StateStoreError(_)
        )
    }

    /// Whether the error class allows a retry of the job
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
