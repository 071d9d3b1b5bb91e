//! Per-job execution context
//!
//! One [`ExecutionContext`] is owned by exactly one traversal. Fan-out
//! branches work on clones and are folded back with [`ExecutionContext::merge_branches`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schema::{ClassType, Field, SchemaRegistry};
use crate::error::ErrorKind;
use crate::CoreError;

/// Severity of a recorded error descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational problem that did not fail the node
    Warning,
    /// Problem that failed the node
    Error,
}

/// An error recorded during traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    /// Error class
    pub kind: ErrorKind,
    /// Severity
    pub severity: Severity,
    /// Node being executed, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Rule being executed, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Message
    pub message: String,
    /// When the error was recorded
    pub timestamp: DateTime<Utc>,
}

impl ErrorDescriptor {
    /// Descriptor for a raised error
    pub fn from_error(error: &CoreError, severity: Severity) -> Self {
        Self {
            kind: error.kind(),
            severity,
            node_id: None,
            rule_id: None,
            message: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Non-fatal warning
    pub fn warning(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            node_id: None,
            rule_id: None,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Attach the node id
    pub fn at_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Attach the rule id
    pub fn in_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }
}

/// Input, Variables, Output and Errors of one traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    input: Map<String, Value>,
    /// Scratch values written by actions
    pub variables: Map<String, Value>,
    /// Values returned to the caller
    pub output: Map<String, Value>,
    /// Recorded errors, in order
    pub errors: Vec<ErrorDescriptor>,
    /// Start of the traversal
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Create a context over a caller-supplied input map
    pub fn new(input: Map<String, Value>) -> Self {
        Self {
            input,
            variables: Map::new(),
            output: Map::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Read-only input
    pub fn input(&self) -> &Map<String, Value> {
        &self.input
    }

    /// Set a variable by key
    pub fn set_variable(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    /// Set an output value by key
    pub fn set_output(&mut self, key: impl Into<String>, value: Value) {
        self.output.insert(key.into(), value);
    }

    /// Record an error descriptor
    pub fn record(&mut self, descriptor: ErrorDescriptor) {
        self.errors.push(descriptor);
    }

    /// Whether any descriptor with `Error` severity was recorded
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Error)
    }

    /// Read the current value of a field: Variables, then Output, then Input
    pub fn read_field(&self, schema: &SchemaRegistry, field: &Field) -> Option<&Value> {
        schema
            .read(&self.variables, field)
            .or_else(|| schema.read(&self.output, field))
            .or_else(|| schema.read(&self.input, field))
    }

    /// Write a field value into the scope selected by its class type
    pub fn write_field(&mut self, schema: &SchemaRegistry, field: &Field, value: Value) {
        match schema.class_type_of(field) {
            ClassType::Output => self.set_output(field.name.clone(), value),
            ClassType::Input | ClassType::Variable => self.set_variable(field.name.clone(), value),
        }
    }

    /// Resolve a dotted identifier used in a connection condition
    ///
    /// `Variables.`, `Output.` and `Input.` prefixes select a scope; without
    /// one, Variables is searched before Output.
    pub fn resolve_identifier(&self, name: &str) -> Option<&Value> {
        let scoped = [
            ("Variables.", &self.variables),
            ("Output.", &self.output),
            ("Input.", &self.input),
        ];
        for (prefix, scope) in scoped {
            if let Some(rest) = name.strip_prefix(prefix) {
                return lookup_path(scope, rest);
            }
        }

        lookup_path(&self.variables, name).or_else(|| lookup_path(&self.output, name))
    }

    /// Fold finished branches back into this context
    ///
    /// Every branch started as a clone of `self`. Changed Variables and
    /// Output keys are written back in branch order, so the last branch wins
    /// a conflicting key. Errors recorded after the fork are appended in
    /// branch order.
    pub fn merge_branches(&mut self, branches: Vec<ExecutionContext>) {
        let base_errors = self.errors.len();
        let base_variables = self.variables.clone();
        let base_output = self.output.clone();

        for branch in branches {
            for (key, value) in branch.variables {
                if base_variables.get(&key) != Some(&value) {
                    self.variables.insert(key, value);
                }
            }
            for (key, value) in branch.output {
                if base_output.get(&key) != Some(&value) {
                    self.output.insert(key, value);
                }
            }
            self.errors
                .extend(branch.errors.into_iter().skip(base_errors));
        }
    }
}

fn lookup_path<'a>(scope: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = scope.get(path) {
        return non_null(value);
    }

    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = scope.get(first);
    for segment in segments {
        current = current.and_then(|v| v.get(segment));
    }
    if let Some(value) = current.and_then(non_null) {
        return Some(value);
    }

    path.rsplit('.')
        .next()
        .filter(|last| *last != path)
        .and_then(|last| scope.get(last))
        .and_then(non_null)
}

fn non_null(value: &Value) -> Option<&Value> {
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}
