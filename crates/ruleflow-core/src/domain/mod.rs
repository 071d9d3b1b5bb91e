/// Field classes, fields and context addressing
pub mod schema;

/// Rules, rule groups, stations and the catalog snapshot
pub mod rule;

/// Function trait and registry
pub mod function;

/// Per-job execution context
pub mod context;

/// Connection condition expressions
pub mod expression;

/// Flow definition domain models
pub mod flow_definition;

/// Compiled runtime graph and edge selection
pub mod flow_graph;

/// Job aggregate and lifecycle state machine
pub mod job;

/// Repository interfaces
pub mod repository;
