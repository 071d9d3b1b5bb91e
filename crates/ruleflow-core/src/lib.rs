//!
//! Ruleflow Core - execution core of the Ruleflow engine
//!
//! This crate defines the domain model (schema, rules, flows, jobs), the
//! rule interpreter, the flow traversal and the job lifecycle. Function
//! implementations, declarative documents and the HTTP surface live in the
//! sibling crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - core business models, entities, and rules
pub mod domain;

/// Application services - core application logic
pub mod application;

/// Typed field values and coercion
pub mod types;

/// Error types
pub mod error;

// Re-export key types
pub use error::{CoreError, ErrorKind};
pub use types::{FieldType, FieldValue};

// Re-export main API types for easy use
pub use domain::context::{ErrorDescriptor, ExecutionContext, Severity};
pub use domain::expression::Expr;
pub use domain::flow_definition::{Connection, ConnectionType, FlowDefinition, FlowId, Node, NodeKind};
pub use domain::flow_graph::FlowGraph;
pub use domain::function::{
    Function, FunctionEnv, FunctionOutcome, FunctionRegistry, FunctionSignature, ParamRole, PureFunction,
};
pub use domain::job::{Job, JobId, JobLogEntry, JobResult, JobStatus, WorkerState, WorkerStatus};
pub use domain::repository::{
    FlowDefinitionRepository, JobFilter, JobRepository, ReferenceTableRepository, Row,
};
pub use domain::rule::{
    Catalog, Combination, Parameter, ParameterKind, Rule, RuleGroup, RuleGroupMember, RuleLine, Station,
};
pub use domain::schema::{ClassType, Field, FieldClass, SchemaRegistry};

// Application interfaces
pub use application::flow_definition_service::{FlowDefinitionService, FlowSummary};
pub use application::flow_execution_service::{CancelFlag, Execution, FlowExecutionService, TraversalReport};
pub use application::interpreter::{GroupOutcome, RuleInterpreter, RuleOutcome};
pub use application::job_service::{JobService, JobServiceConfig, JobStatusView};
pub use application::lookup::{CacheStats, LookupConfig, LookupResult, LookupService};
