//! # Ruleflow DSL
//!
//! Declarative documents of the Ruleflow engine, in JSON or YAML:
//!
//! * flow documents (`{flow, nodes, connections}`), imported and exported
//! * catalog documents: field classes, fields, rules, rule groups and stations
//! * endpoint documents for the dynamic HTTP routes
//! * reference table documents
//!
//! Each document is checked against an embedded JSON Schema first, then for
//! identifiers, duplicates and dangling references. All problems found are
//! reported together.
//!
//! ## Example
//!
//! ```
//! use ruleflow_dsl::{export_flow, import_flow, Format};
//!
//! let json = r#"{
//!   "flow": { "id": "hello", "name": "Hello", "version": "1" },
//!   "nodes": [
//!     { "id": "start", "type": "STATION", "referenceId": "intake", "settings": { "x": 10 } }
//!   ],
//!   "connections": []
//! }"#;
//!
//! let flow = import_flow(json, Format::Json).unwrap();
//! assert_eq!(flow.nodes.len(), 1);
//!
//! let exported = export_flow(&flow).unwrap();
//! assert_eq!(exported["nodes"][0]["settings"]["x"], 10);
//! ```

mod error;
mod format;

pub mod catalog;
pub mod endpoints;
pub mod flow;
pub mod tables;
pub mod validation;

pub use catalog::{import_catalog, import_catalog_value, CatalogDocument};
pub use endpoints::{
    check_bindings, import_endpoints, import_endpoints_value, EndpointParameter, EndpointRecord, HttpMethod,
    InvocationMode, ParamSource,
};
pub use error::DslError;
pub use flow::{export_flow, export_flow_string, import_flow, import_flow_value, FlowDocument, FlowHeader};
pub use format::{parse_value, Format};
pub use tables::{import_tables, import_tables_value, ReferenceTable};
pub use validation::{DocumentKind, ValidationError};

/// Version of the DSL crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
