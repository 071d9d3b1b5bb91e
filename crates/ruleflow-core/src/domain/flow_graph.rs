//! Immutable runtime graph
//!
//! A [`FlowGraph`] is compiled once per deployed flow version. Node
//! references are resolved against the catalog and conditions are parsed, so
//! traversal never touches raw definitions.

use std::collections::HashMap;
use std::sync::Arc;

use super::context::ExecutionContext;
use super::expression::Expr;
use super::flow_definition::{ConnectionType, FlowDefinition, FlowId, Node, NodeKind};
use super::rule::{Catalog, Combination, Rule, RuleGroup, Station};
use crate::CoreError;

/// What a node runs, resolved from the catalog
#[derive(Debug, Clone)]
pub enum NodeBody {
    /// Station; succeeds when reached
    Station(Arc<Station>),
    /// Rule group with its member rules in evaluation order
    RuleGroup {
        /// Group definition
        group: Arc<RuleGroup>,
        /// Member rules, ordered by sequence
        rules: Vec<Arc<Rule>>,
    },
    /// Single rule
    Rule(Arc<Rule>),
}

/// A node with its resolved body
#[derive(Debug, Clone)]
pub struct CompiledNode {
    /// Node id
    pub id: String,
    /// Node type
    pub kind: NodeKind,
    /// Resolved body
    pub body: NodeBody,
    /// Label, if any
    pub label: Option<String>,
}

/// An outgoing edge with a parsed condition
#[derive(Debug, Clone)]
pub struct CompiledEdge {
    /// Target node id
    pub target: String,
    /// Connection type
    pub connection_type: ConnectionType,
    /// Parsed condition of a CONDITIONAL edge
    pub condition: Option<Expr>,
    /// Label, if any
    pub label: Option<String>,
}

impl CompiledEdge {
    /// Whether this edge is taken for a node outcome, ignoring DEFAULT fallback
    fn matches(&self, succeeded: bool, ctx: &ExecutionContext) -> bool {
        match self.connection_type {
            ConnectionType::Success => succeeded,
            ConnectionType::Failure => !succeeded,
            ConnectionType::Conditional => self
                .condition
                .as_ref()
                .map_or(false, |expr| expr.evaluate(ctx)),
            ConnectionType::Default => false,
        }
    }
}

/// Compiled flow ready for traversal
#[derive(Debug, Clone)]
pub struct FlowGraph {
    /// Flow id
    pub id: FlowId,
    /// Flow version
    pub version: String,
    start_nodes: Vec<String>,
    nodes: HashMap<String, CompiledNode>,
    outgoing: HashMap<String, Vec<CompiledEdge>>,
}

impl FlowGraph {
    /// Compile a definition against a catalog
    ///
    /// Cycles are not rejected here; traversal aborts a path that revisits
    /// a node.
    pub fn compile(definition: &FlowDefinition, catalog: &Catalog) -> Result<Self, CoreError> {
        let mut nodes = HashMap::with_capacity(definition.nodes.len());
        for node in &definition.nodes {
            let compiled = compile_node(node, catalog)?;
            if nodes.insert(node.id.clone(), compiled).is_some() {
                return Err(CoreError::GraphError(format!("Duplicate node id: {}", node.id)));
            }
        }

        let mut outgoing: HashMap<String, Vec<CompiledEdge>> = HashMap::new();
        for connection in &definition.connections {
            for endpoint in [&connection.source_id, &connection.target_id] {
                if !nodes.contains_key(endpoint) {
                    return Err(CoreError::GraphError(format!(
                        "Connection references unknown node '{}'",
                        endpoint
                    )));
                }
            }
            let condition = match (connection.connection_type, &connection.condition) {
                (ConnectionType::Conditional, Some(source)) => Some(Expr::parse(source)?),
                (ConnectionType::Conditional, None) => {
                    return Err(CoreError::GraphError(format!(
                        "Conditional connection {} -> {} has no condition",
                        connection.source_id, connection.target_id
                    )))
                }
                _ => None,
            };
            outgoing
                .entry(connection.source_id.clone())
                .or_default()
                .push(CompiledEdge {
                    target: connection.target_id.clone(),
                    connection_type: connection.connection_type,
                    condition,
                    label: connection.label.clone(),
                });
        }

        let start_nodes = definition.effective_start_nodes();
        if start_nodes.is_empty() {
            return Err(CoreError::GraphError(format!(
                "Flow '{}' has no start node",
                definition.id
            )));
        }
        if let Some(missing) = start_nodes.iter().find(|id| !nodes.contains_key(*id)) {
            return Err(CoreError::GraphError(format!("Unknown start node: {}", missing)));
        }

        Ok(Self {
            id: definition.id.clone(),
            version: definition.version.clone(),
            start_nodes,
            nodes,
            outgoing,
        })
    }

    /// Start node ids
    pub fn start_nodes(&self) -> &[String] {
        &self.start_nodes
    }

    /// Node by id
    pub fn node(&self, id: &str) -> Option<&CompiledNode> {
        self.nodes.get(id)
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Edges to follow after `node_id` resolved
    ///
    /// Matching SUCCESS/FAILURE edges and true CONDITIONAL edges are returned
    /// in declaration order. DEFAULT edges are returned only when none of
    /// those matched.
    pub fn select_edges(&self, node_id: &str, succeeded: bool, ctx: &ExecutionContext) -> Vec<&CompiledEdge> {
        let Some(edges) = self.outgoing.get(node_id) else {
            return Vec::new();
        };

        let matched: Vec<&CompiledEdge> = edges.iter().filter(|e| e.matches(succeeded, ctx)).collect();
        if !matched.is_empty() {
            return matched;
        }

        edges
            .iter()
            .filter(|e| e.connection_type == ConnectionType::Default)
            .collect()
    }
}

fn compile_node(node: &Node, catalog: &Catalog) -> Result<CompiledNode, CoreError> {
    let unknown = || {
        CoreError::GraphError(format!(
            "Node '{}' references unknown {} '{}'",
            node.id, node.kind, node.reference_id
        ))
    };

    let body = match node.kind {
        NodeKind::Station => NodeBody::Station(catalog.station(&node.reference_id).ok_or_else(unknown)?),
        NodeKind::Rule => NodeBody::Rule(catalog.rule(&node.reference_id).ok_or_else(unknown)?),
        NodeKind::RuleGroup => {
            let group = catalog.rule_group(&node.reference_id).ok_or_else(unknown)?;
            let rules = group
                .ordered_rule_ids()
                .into_iter()
                .map(|id| {
                    catalog.rule(id).ok_or_else(|| {
                        CoreError::GraphError(format!(
                            "Rule group '{}' references unknown rule '{}'",
                            group.id, id
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            NodeBody::RuleGroup { group, rules }
        }
    };

    Ok(CompiledNode {
        id: node.id.clone(),
        kind: node.kind,
        body,
        label: node.label.clone(),
    })
}

impl NodeBody {
    /// Combination type for groups; single rules behave as AND
    pub fn combination(&self) -> Combination {
        match self {
            NodeBody::RuleGroup { group, .. } => group.combination,
            _ => Combination::And,
        }
    }
}
