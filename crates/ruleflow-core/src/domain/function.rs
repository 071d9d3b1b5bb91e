//! Function registry
//!
//! Functions are the only executable units a rule line can reference. Each
//! one declares a fixed arity through its [`FunctionSignature`] and receives
//! already-resolved, already-coerced arguments. A function never sees the
//! execution context; it returns a value and, for `InputOutput` positions,
//! assignments that the interpreter writes back into the referenced field.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::application::lookup::LookupService;
use crate::types::{FieldType, FieldValue};
use crate::CoreError;

/// Role of a positional parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamRole {
    /// Read-only input
    Input,
    /// Input whose field receives the function's result
    InputOutput,
}

/// Declared shape of a function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSignature {
    /// Registered name
    pub name: String,
    /// Parameter roles by position
    pub params: Vec<ParamRole>,
    /// Declared return type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns: Option<FieldType>,
    /// Human readable description
    pub description: String,
}

impl FunctionSignature {
    /// Signature with the given positional roles
    pub fn new(name: impl Into<String>, params: Vec<ParamRole>) -> Self {
        Self {
            name: name.into(),
            params,
            returns: None,
            description: String::new(),
        }
    }

    /// Set the declared return type
    pub fn returning(mut self, field_type: FieldType) -> Self {
        self.returns = Some(field_type);
        self
    }

    /// Set the description
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Check an argument count against the signature
    pub fn check_arity(&self, given: usize) -> Result<(), CoreError> {
        if given != self.arity() {
            return Err(CoreError::ValidationError(format!(
                "Function '{}' expects {} parameters, got {}",
                self.name,
                self.arity(),
                given
            )));
        }
        Ok(())
    }
}

/// Result of one function call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionOutcome {
    /// Returned value; used as the truth value of a condition
    pub value: FieldValue,
    /// Values for `InputOutput` positions
    pub assignments: Vec<(usize, FieldValue)>,
}

impl FunctionOutcome {
    /// Outcome carrying only a value
    pub fn value(value: impl Into<FieldValue>) -> Self {
        Self {
            value: value.into(),
            assignments: Vec::new(),
        }
    }

    /// Outcome that also writes `value` into position `slot`
    pub fn assign(slot: usize, value: impl Into<FieldValue>) -> Self {
        let value = value.into();
        Self {
            value: value.clone(),
            assignments: vec![(slot, value)],
        }
    }

    /// Add another assignment
    pub fn with_assignment(mut self, slot: usize, value: impl Into<FieldValue>) -> Self {
        self.assignments.push((slot, value.into()));
        self
    }
}

/// Services available to functions while they run
#[derive(Clone)]
pub struct FunctionEnv {
    /// Reference table lookups
    pub lookups: Arc<LookupService>,
}

impl FunctionEnv {
    /// Create an environment
    pub fn new(lookups: Arc<LookupService>) -> Self {
        Self { lookups }
    }
}

impl fmt::Debug for FunctionEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEnv").finish_non_exhaustive()
    }
}

/// A named callable unit referenced by rule lines
#[async_trait]
pub trait Function: Send + Sync {
    /// Declared signature
    fn signature(&self) -> &FunctionSignature;

    /// Invoke with resolved arguments, one per declared parameter
    async fn call(&self, args: &[FieldValue], env: &FunctionEnv) -> Result<FunctionOutcome, CoreError>;
}

/// Body of a function that needs no environment
pub type PureFn = fn(&[FieldValue]) -> Result<FunctionOutcome, CoreError>;

/// Adapter turning a plain function pointer into a [`Function`]
pub struct PureFunction {
    signature: FunctionSignature,
    body: PureFn,
}

impl PureFunction {
    /// Wrap `body` under `signature`
    pub fn new(signature: FunctionSignature, body: PureFn) -> Self {
        Self { signature, body }
    }
}

#[async_trait]
impl Function for PureFunction {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    async fn call(&self, args: &[FieldValue], _env: &FunctionEnv) -> Result<FunctionOutcome, CoreError> {
        (self.body)(args)
    }
}

/// Registry of functions keyed by name
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
}

impl FunctionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under its signature name, replacing any previous one
    pub fn register(&mut self, function: Arc<dyn Function>) {
        let name = function.signature().name.clone();
        if self.functions.insert(name.clone(), function).is_some() {
            tracing::warn!(function = %name, "Replacing previously registered function");
        }
    }

    /// Register a pure function
    pub fn register_pure(&mut self, signature: FunctionSignature, body: PureFn) {
        self.register(Arc::new(PureFunction::new(signature, body)));
    }

    /// Look up a function; unknown names are a `LookupError`
    pub fn get(&self, name: &str) -> Result<Arc<dyn Function>, CoreError> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::LookupError(format!("Function not registered: {}", name)))
    }

    /// Whether a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Signatures of all registered functions, sorted by name
    pub fn signatures(&self) -> Vec<FunctionSignature> {
        let mut signatures: Vec<FunctionSignature> = self
            .functions
            .values()
            .map(|f| f.signature().clone())
            .collect();
        signatures.sort_by(|a, b| a.name.cmp(&b.name));
        signatures
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}
