//! Flow import and export
//!
//! The exchange document is `{flow: {id, name, version}, nodes, connections}`.
//! Node settings and labels are carried verbatim. Import checks everything
//! that can be checked without a catalog; references into the catalog are
//! checked when the flow is deployed.

use ruleflow_core::{Connection, ConnectionType, Expr, FlowDefinition, FlowId, Node};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::DslError;
use crate::format::{parse_value, Format};
use crate::validation::identifiers::is_valid_identifier;
use crate::validation::structure::{check_structure, DocumentKind};
use crate::validation::{check_unique, error_codes, into_result, ValidationError};

/// Header of a flow document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowHeader {
    /// Flow id
    pub id: String,
    /// Flow name
    pub name: String,
    /// Flow version
    pub version: String,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared start nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub start_nodes: Vec<String>,
}

/// Flow exchange document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDocument {
    /// Header
    pub flow: FlowHeader,
    /// Nodes
    pub nodes: Vec<Node>,
    /// Connections
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl From<&FlowDefinition> for FlowDocument {
    fn from(definition: &FlowDefinition) -> Self {
        Self {
            flow: FlowHeader {
                id: definition.id.0.clone(),
                name: definition.name.clone(),
                version: definition.version.clone(),
                description: definition.description.clone(),
                start_nodes: definition.start_nodes.clone(),
            },
            nodes: definition.nodes.clone(),
            connections: definition.connections.clone(),
        }
    }
}

impl From<FlowDocument> for FlowDefinition {
    fn from(document: FlowDocument) -> Self {
        FlowDefinition {
            id: FlowId(document.flow.id),
            name: document.flow.name,
            version: document.flow.version,
            description: document.flow.description,
            start_nodes: document.flow.start_nodes,
            nodes: document.nodes,
            connections: document.connections,
        }
    }
}

/// Import a flow document from text
pub fn import_flow(text: &str, format: Format) -> Result<FlowDefinition, DslError> {
    import_flow_value(parse_value(text, format)?)
}

/// Import an already parsed flow document
pub fn import_flow_value(document: Value) -> Result<FlowDefinition, DslError> {
    into_result(check_structure(DocumentKind::Flow, &document)?)?;
    let document: FlowDocument = serde_json::from_value(document)?;
    into_result(check_flow_document(&document))?;

    tracing::debug!(
        flow_id = %document.flow.id,
        nodes = document.nodes.len(),
        connections = document.connections.len(),
        "Flow document imported"
    );
    Ok(document.into())
}

/// Export a flow definition as a JSON document
pub fn export_flow(definition: &FlowDefinition) -> Result<Value, DslError> {
    Ok(serde_json::to_value(FlowDocument::from(definition))?)
}

/// Export a flow definition as pretty-printed JSON text
pub fn export_flow_string(definition: &FlowDefinition) -> Result<String, DslError> {
    Ok(serde_json::to_string_pretty(&FlowDocument::from(definition))?)
}

fn check_flow_document(document: &FlowDocument) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !is_valid_identifier(&document.flow.id) {
        errors.push(
            ValidationError::new(
                error_codes::INVALID_IDENTIFIER,
                format!("Invalid flow id '{}'", document.flow.id),
            )
            .at("flow.id"),
        );
    }

    check_unique(&mut errors, "node", "nodes", document.nodes.iter().map(|n| n.id.as_str()));
    let ids: HashSet<&str> = document.nodes.iter().map(|n| n.id.as_str()).collect();

    for (idx, node) in document.nodes.iter().enumerate() {
        if let Some(parent) = &node.parent_id {
            if !ids.contains(parent.as_str()) {
                errors.push(
                    ValidationError::new(
                        error_codes::INVALID_REFERENCE,
                        format!("Node '{}' has unknown parent '{}'", node.id, parent),
                    )
                    .at(format!("nodes[{}].parentId", idx)),
                );
            }
        }
    }

    for (idx, start) in document.flow.start_nodes.iter().enumerate() {
        if !ids.contains(start.as_str()) {
            errors.push(
                ValidationError::new(error_codes::INVALID_REFERENCE, format!("Unknown start node '{}'", start))
                    .at(format!("flow.startNodes[{}]", idx)),
            );
        }
    }

    for (idx, connection) in document.connections.iter().enumerate() {
        let path = format!("connections[{}]", idx);
        for (side, id) in [("sourceId", &connection.source_id), ("targetId", &connection.target_id)] {
            if !ids.contains(id.as_str()) {
                errors.push(
                    ValidationError::new(error_codes::INVALID_REFERENCE, format!("Unknown node '{}'", id))
                        .at(format!("{}.{}", path, side)),
                );
            }
        }

        match (connection.connection_type, &connection.condition) {
            (ConnectionType::Conditional, None) => errors.push(
                ValidationError::new(
                    error_codes::MISSING_REQUIRED_FIELD,
                    "Conditional connection has no condition",
                )
                .at(format!("{}.condition", path)),
            ),
            (ConnectionType::Conditional, Some(condition)) => {
                if let Err(e) = Expr::parse(condition) {
                    errors.push(
                        ValidationError::new(error_codes::INVALID_EXPRESSION, e.to_string())
                            .at(format!("{}.condition", path)),
                    );
                }
            }
            _ => {}
        }
    }

    errors
}
