use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::expression::Expr;
use super::rule::Catalog;
use crate::CoreError;

/// Value object: Flow ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(pub String);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlowId {
    fn from(id: &str) -> Self {
        FlowId(id.to_string())
    }
}

/// Node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    /// Labelled phase; succeeds when reached
    #[serde(alias = "station")]
    Station,
    /// AND/OR combination of rules
    #[serde(alias = "rule_group", alias = "rule-group")]
    RuleGroup,
    /// Single rule
    #[serde(alias = "rule")]
    Rule,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Station => "STATION",
            NodeKind::RuleGroup => "RULE_GROUP",
            NodeKind::Rule => "RULE",
        })
    }
}

/// A node of a flow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Node id, unique within the flow
    pub id: String,
    /// Node type
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Id of the station, rule group or rule this node runs
    pub reference_id: String,
    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Opaque layout and custom settings, never interpreted
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub settings: serde_json::Value,
    /// Enclosing node for nested rule groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionType {
    /// Followed when the source succeeded
    #[serde(alias = "success")]
    Success,
    /// Followed when the source failed
    #[serde(alias = "failure")]
    Failure,
    /// Followed when its condition holds
    #[serde(alias = "conditional")]
    Conditional,
    /// Followed when nothing else matched
    #[serde(alias = "default")]
    Default,
}

/// A directed, typed edge between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Source node id
    pub source_id: String,
    /// Target node id
    pub target_id: String,
    /// Connection type
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    /// Condition expression for CONDITIONAL connections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Represents a parsed flow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDefinition {
    /// ID of the flow
    pub id: FlowId,

    /// Human-readable name of the flow
    pub name: String,

    /// The flow version
    pub version: String,

    /// Description of the flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared start nodes; empty means every node without incoming edges
    #[serde(default)]
    pub start_nodes: Vec<String>,

    /// Nodes in declaration order
    pub nodes: Vec<Node>,

    /// Connections in declaration order
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl FlowDefinition {
    /// Node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing connections of a node in declaration order
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.source_id == node_id)
    }

    /// Start nodes, falling back to nodes without incoming connections
    pub fn effective_start_nodes(&self) -> Vec<String> {
        if !self.start_nodes.is_empty() {
            return self.start_nodes.clone();
        }
        let targets: HashSet<&str> = self
            .connections
            .iter()
            .map(|c| c.target_id.as_str())
            .collect();
        self.nodes
            .iter()
            .filter(|n| !targets.contains(n.id.as_str()))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Validate the flow definition against a catalog
    pub fn validate(&self, catalog: &Catalog) -> Result<(), CoreError> {
        // Check for empty nodes
        if self.nodes.is_empty() {
            return Err(CoreError::GraphError(format!(
                "Flow '{}' has no nodes",
                self.id
            )));
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(CoreError::GraphError(format!(
                    "Duplicate node id: {}",
                    node.id
                )));
            }
        }

        for node in &self.nodes {
            let known = match node.kind {
                NodeKind::Station => catalog.station(&node.reference_id).is_some(),
                NodeKind::RuleGroup => catalog.rule_group(&node.reference_id).is_some(),
                NodeKind::Rule => catalog.rule(&node.reference_id).is_some(),
            };
            if !known {
                return Err(CoreError::GraphError(format!(
                    "Node '{}' references unknown {} '{}'",
                    node.id, node.kind, node.reference_id
                )));
            }
            if let Some(parent) = &node.parent_id {
                if !ids.contains(parent.as_str()) {
                    return Err(CoreError::GraphError(format!(
                        "Node '{}' has unknown parent '{}'",
                        node.id, parent
                    )));
                }
            }
        }

        for connection in &self.connections {
            for endpoint in [&connection.source_id, &connection.target_id] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(CoreError::GraphError(format!(
                        "Connection {} -> {} references unknown node '{}'",
                        connection.source_id, connection.target_id, endpoint
                    )));
                }
            }
            match (&connection.connection_type, &connection.condition) {
                (ConnectionType::Conditional, None) => {
                    return Err(CoreError::GraphError(format!(
                        "Conditional connection {} -> {} has no condition",
                        connection.source_id, connection.target_id
                    )));
                }
                (ConnectionType::Conditional, Some(condition)) => {
                    Expr::parse(condition)?;
                }
                _ => {}
            }
        }

        let starts = self.effective_start_nodes();
        if starts.is_empty() {
            return Err(CoreError::GraphError(format!(
                "Flow '{}' has no start node",
                self.id
            )));
        }
        for start in &starts {
            if !ids.contains(start.as_str()) {
                return Err(CoreError::GraphError(format!(
                    "Unknown start node: {}",
                    start
                )));
            }
        }

        if let Some(cycle) = self.find_cycle() {
            return Err(CoreError::GraphError(format!(
                "Cycle detected: {}",
                cycle.join(" -> ")
            )));
        }

        Ok(())
    }

    /// A cycle in the connection graph, if there is one
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for connection in &self.connections {
            adjacency
                .entry(connection.source_id.as_str())
                .or_default()
                .push(connection.target_id.as_str());
        }

        let mut done: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            let mut path = Vec::new();
            if let Some(cycle) = visit(node.id.as_str(), &adjacency, &mut path, &mut done) {
                return Some(cycle);
            }
        }
        None
    }
}

fn visit<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    path: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
) -> Option<Vec<String>> {
    if let Some(pos) = path.iter().position(|n| *n == node) {
        let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
        cycle.push(node.to_string());
        return Some(cycle);
    }
    if done.contains(node) {
        return None;
    }

    path.push(node);
    if let Some(targets) = adjacency.get(node) {
        for target in targets {
            if let Some(cycle) = visit(*target, adjacency, path, done) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    done.insert(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::Station;
    use crate::domain::schema::SchemaRegistry;
    use serde_json::json;

    fn catalog() -> Catalog {
        let stations = ["s1", "s2", "s3"]
            .iter()
            .map(|id| Station {
                id: id.to_string(),
                name: id.to_string(),
                description: None,
            })
            .collect();
        Catalog::new(SchemaRegistry::default(), vec![], vec![], stations).unwrap()
    }

    fn node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            kind: NodeKind::Station,
            reference_id: id.to_string(),
            label: None,
            settings: json!({"x": 10, "y": 20}),
            parent_id: None,
        }
    }

    fn edge(from: &str, to: &str, connection_type: ConnectionType) -> Connection {
        Connection {
            source_id: from.to_string(),
            target_id: to.to_string(),
            connection_type,
            condition: None,
            label: None,
        }
    }

    fn flow(connections: Vec<Connection>) -> FlowDefinition {
        FlowDefinition {
            id: FlowId("f".into()),
            name: "flow".into(),
            version: "1".into(),
            description: None,
            start_nodes: vec![],
            nodes: vec![node("s1"), node("s2"), node("s3")],
            connections,
        }
    }

    #[test]
    fn test_valid_flow() {
        let def = flow(vec![
            edge("s1", "s2", ConnectionType::Success),
            edge("s1", "s3", ConnectionType::Failure),
        ]);
        assert!(def.validate(&catalog()).is_ok());
        assert_eq!(def.effective_start_nodes(), vec!["s1".to_string()]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut def = flow(vec![
            edge("s1", "s2", ConnectionType::Success),
            edge("s2", "s3", ConnectionType::Success),
            edge("s3", "s2", ConnectionType::Default),
        ]);
        def.start_nodes = vec!["s1".into()];

        let cycle = def.find_cycle().unwrap();
        assert_eq!(cycle, vec!["s2", "s3", "s2"]);
        assert!(matches!(def.validate(&catalog()), Err(CoreError::GraphError(_))));
    }

    #[test]
    fn test_dangling_connection_is_rejected() {
        let def = flow(vec![edge("s1", "nope", ConnectionType::Success)]);
        assert!(matches!(def.validate(&catalog()), Err(CoreError::GraphError(_))));
    }

    #[test]
    fn test_conditional_needs_parsable_condition() {
        let mut conditional = edge("s1", "s2", ConnectionType::Conditional);
        assert!(matches!(
            flow(vec![conditional.clone()]).validate(&catalog()),
            Err(CoreError::GraphError(_))
        ));

        conditional.condition = Some("total_tax >".into());
        assert!(matches!(
            flow(vec![conditional]).validate(&catalog()),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn test_unknown_reference_is_rejected() {
        let mut def = flow(vec![]);
        def.nodes[0].kind = NodeKind::Rule;
        assert!(matches!(def.validate(&catalog()), Err(CoreError::GraphError(_))));
    }

    #[test]
    fn test_node_type_aliases() {
        let node: Node = serde_json::from_value(json!({
            "id": "n1",
            "type": "rule-group",
            "referenceId": "g1"
        }))
        .unwrap();
        assert_eq!(node.kind, NodeKind::RuleGroup);
        assert_eq!(node.settings, serde_json::Value::Null);
    }
}
