use ruleflow_core::CoreError;
use std::fmt;
use thiserror::Error;

use crate::validation::ValidationError;

/// All possible errors that can occur while reading or writing documents
#[derive(Error, Debug)]
pub enum DslError {
    /// Errors that occur during YAML parsing
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Errors that occur during JSON processing
    #[error("JSON processing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A single validation error
    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),

    /// Multiple validation errors
    #[error("{}", MultipleErrorsFormat(.0))]
    MultipleValidationErrors(Vec<ValidationError>),

    /// The document was well formed but the engine rejected it
    #[error("Definition rejected: {0}")]
    Rejected(#[from] CoreError),

    /// Unsupported document format
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

struct MultipleErrorsFormat<'a>(&'a [ValidationError]);

impl fmt::Display for MultipleErrorsFormat<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multiple validation errors ({} issues):", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            write!(f, "\n  {}. {}", i + 1, err)?;
        }
        Ok(())
    }
}

impl DslError {
    /// Create a DslError from a list of validation errors
    pub fn from_validation_errors(mut errors: Vec<ValidationError>) -> Self {
        match errors.len() {
            0 => DslError::InternalError("Called from_validation_errors with empty vector".to_string()),
            1 => match errors.pop() {
                Some(error) => DslError::ValidationError(error),
                None => DslError::InternalError("validation error disappeared".to_string()),
            },
            _ => DslError::MultipleValidationErrors(errors),
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            DslError::YamlError(_) => "ERR_DSL_YAML_PARSE",
            DslError::JsonError(_) => "ERR_DSL_JSON_PARSE",
            DslError::ValidationError(err) => err.code,
            DslError::MultipleValidationErrors(_) => "ERR_DSL_VALIDATION_MULTIPLE",
            DslError::Rejected(CoreError::GraphError(_)) => "ERR_DSL_GRAPH",
            DslError::Rejected(_) => "ERR_DSL_REJECTED",
            DslError::UnsupportedFormat(_) => "ERR_DSL_UNSUPPORTED_FORMAT",
            DslError::InternalError(_) => "ERR_DSL_INTERNAL",
        }
    }

    /// Individual validation errors, empty for other kinds
    pub fn validation_errors(&self) -> Vec<&ValidationError> {
        match self {
            DslError::ValidationError(err) => vec![err],
            DslError::MultipleValidationErrors(errs) => errs.iter().collect(),
            _ => Vec::new(),
        }
    }
}
