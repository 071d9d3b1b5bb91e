use std::error::Error;
use std::fmt;

use crate::error::DslError;

pub(crate) mod identifiers;
pub(crate) mod structure;

pub use structure::DocumentKind;

/// Represents a validation error found in a document
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error code (should be a constant identifier)
    pub code: &'static str,

    /// Human-readable error message
    pub message: String,

    /// Optional path to the location of the error (e.g., "nodes[2].referenceId")
    pub path: Option<String>,
}

impl ValidationError {
    /// Error without a location
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
        }
    }

    /// Attach a location
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: {} (at {})", self.code, self.message, path)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl Error for ValidationError {}

/// Validation error codes
pub mod error_codes {
    /// Invalid reference to a node, class, field or flow
    pub const INVALID_REFERENCE: &str = "ERR_DSL_VALIDATION_INVALID_REFERENCE";

    /// Duplicate ID found
    pub const DUPLICATE_ID: &str = "ERR_DSL_VALIDATION_DUPLICATE_ID";

    /// Document does not match its JSON Schema
    pub const INVALID_STRUCTURE: &str = "ERR_DSL_VALIDATION_INVALID_STRUCTURE";

    /// Identifier contains characters outside `[A-Za-z0-9_.-]`
    pub const INVALID_IDENTIFIER: &str = "ERR_DSL_VALIDATION_INVALID_IDENTIFIER";

    /// Malformed endpoint path template
    pub const INVALID_PATH_TEMPLATE: &str = "ERR_DSL_VALIDATION_INVALID_PATH_TEMPLATE";

    /// Missing required field
    pub const MISSING_REQUIRED_FIELD: &str = "ERR_DSL_VALIDATION_MISSING_REQUIRED_FIELD";

    /// Malformed condition expression
    pub const INVALID_EXPRESSION: &str = "ERR_DSL_VALIDATION_INVALID_EXPRESSION";
}

/// Turn collected errors into a result
pub(crate) fn into_result(errors: Vec<ValidationError>) -> Result<(), DslError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(DslError::from_validation_errors(errors))
    }
}

/// Collects errors for ids that appear more than once
pub(crate) fn check_unique<'a>(
    errors: &mut Vec<ValidationError>,
    what: &str,
    path: &str,
    ids: impl Iterator<Item = &'a str>,
) {
    let mut seen = std::collections::HashSet::new();
    for (idx, id) in ids.enumerate() {
        if !seen.insert(id) {
            errors.push(
                ValidationError::new(error_codes::DUPLICATE_ID, format!("Duplicate {} id '{}'", what, id))
                    .at(format!("{}[{}]", path, idx)),
            );
        }
    }
}
