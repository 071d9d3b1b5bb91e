//! Rule, rule group and station definitions
//!
//! These are read-only records consumed from the definition store. A
//! [`Catalog`] bundles them with the schema so a flow graph can be compiled
//! against one consistent snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::schema::SchemaRegistry;
use crate::types::FieldType;
use crate::CoreError;

/// How a parameter obtains its value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ParameterKind {
    /// Reference to a field, `class.field` or a field id
    #[serde(rename_all = "camelCase")]
    FieldRef {
        /// Field reference
        field: String,
    },
    /// Literal value coerced with its declared type
    #[serde(rename_all = "camelCase")]
    Literal {
        /// Stored representation
        value: serde_json::Value,
        /// Type used for coercion
        field_type: FieldType,
    },
}

/// A positional function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Position in the function call
    pub index: usize,
    /// Parameter source
    #[serde(flatten)]
    pub kind: ParameterKind,
}

impl Parameter {
    /// Field reference parameter
    pub fn field(index: usize, field: impl Into<String>) -> Self {
        Self {
            index,
            kind: ParameterKind::FieldRef {
                field: field.into(),
            },
        }
    }

    /// Literal parameter
    pub fn literal(index: usize, value: serde_json::Value, field_type: FieldType) -> Self {
        Self {
            index,
            kind: ParameterKind::Literal { value, field_type },
        }
    }
}

/// One condition or action line of a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleLine {
    /// Line identifier
    pub id: String,
    /// Execution order within the rule
    pub sequence: u32,
    /// Registered function name
    pub function: String,
    /// Parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl RuleLine {
    /// Parameters ordered by position
    pub fn ordered_parameters(&self) -> Vec<&Parameter> {
        let mut params: Vec<&Parameter> = self.parameters.iter().collect();
        params.sort_by_key(|p| p.index);
        params
    }
}

/// A rule: ordered conditions guarding ordered actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Rule identifier
    pub id: String,
    /// Rule name
    pub name: String,
    /// Free-form type tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<String>,
    /// Owning field class id
    pub class_id: String,
    /// Condition lines
    #[serde(default)]
    pub conditions: Vec<RuleLine>,
    /// Action lines
    #[serde(default)]
    pub actions: Vec<RuleLine>,
}

impl Rule {
    /// Conditions in ascending sequence order
    pub fn ordered_conditions(&self) -> Vec<&RuleLine> {
        ordered(&self.conditions)
    }

    /// Actions in ascending sequence order
    pub fn ordered_actions(&self) -> Vec<&RuleLine> {
        ordered(&self.actions)
    }
}

fn ordered(lines: &[RuleLine]) -> Vec<&RuleLine> {
    let mut sorted: Vec<&RuleLine> = lines.iter().collect();
    sorted.sort_by_key(|line| line.sequence);
    sorted
}

/// How member results of a rule group combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combination {
    /// All members must pass
    #[default]
    And,
    /// At least one member must pass
    Or,
}

/// Membership of a rule in a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleGroupMember {
    /// Rule id
    pub rule_id: String,
    /// Evaluation order
    #[serde(default)]
    pub sequence: u32,
}

/// A group of rules combined with AND/OR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleGroup {
    /// Group identifier
    pub id: String,
    /// Group name
    pub name: String,
    /// Combination type
    #[serde(default)]
    pub combination: Combination,
    /// Member rules
    #[serde(default)]
    pub members: Vec<RuleGroupMember>,
}

impl RuleGroup {
    /// Member rule ids in evaluation order
    pub fn ordered_rule_ids(&self) -> Vec<&str> {
        let mut members: Vec<&RuleGroupMember> = self.members.iter().collect();
        members.sort_by_key(|m| m.sequence);
        members.into_iter().map(|m| m.rule_id.as_str()).collect()
    }
}

/// A labelled execution phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// Station identifier
    pub id: String,
    /// Station name
    pub name: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A consistent snapshot of schema and rule definitions
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    schema: SchemaRegistry,
    rules: HashMap<String, Arc<Rule>>,
    rule_groups: HashMap<String, Arc<RuleGroup>>,
    stations: HashMap<String, Arc<Station>>,
}

impl Catalog {
    /// Build a catalog; fails if a rule or group references something unknown
    pub fn new(
        schema: SchemaRegistry,
        rules: Vec<Rule>,
        rule_groups: Vec<RuleGroup>,
        stations: Vec<Station>,
    ) -> Result<Self, CoreError> {
        let mut catalog = Catalog {
            schema,
            ..Default::default()
        };

        for rule in rules {
            if catalog.rules.contains_key(&rule.id) {
                return Err(CoreError::ValidationError(format!("Duplicate rule id: {}", rule.id)));
            }
            catalog.rules.insert(rule.id.clone(), Arc::new(rule));
        }
        for group in rule_groups {
            if catalog.rule_groups.contains_key(&group.id) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate rule group id: {}",
                    group.id
                )));
            }
            catalog.rule_groups.insert(group.id.clone(), Arc::new(group));
        }
        for station in stations {
            if catalog.stations.contains_key(&station.id) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate station id: {}",
                    station.id
                )));
            }
            catalog.stations.insert(station.id.clone(), Arc::new(station));
        }

        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CoreError> {
        for rule in self.rules.values() {
            if self.schema.class(&rule.class_id).is_none() {
                return Err(CoreError::ValidationError(format!(
                    "Rule '{}' is owned by unknown class '{}'",
                    rule.id, rule.class_id
                )));
            }
            for line in rule.conditions.iter().chain(rule.actions.iter()) {
                for param in &line.parameters {
                    if let ParameterKind::FieldRef { field } = &param.kind {
                        let resolved = self.schema.resolve(field)?;
                        if !self.schema.is_visible_from(&rule.class_id, resolved) {
                            return Err(CoreError::ValidationError(format!(
                                "Rule '{}' line '{}' references field '{}' outside its class",
                                rule.id, line.id, field
                            )));
                        }
                    }
                }
            }
        }

        for group in self.rule_groups.values() {
            for member in &group.members {
                if !self.rules.contains_key(&member.rule_id) {
                    return Err(CoreError::ValidationError(format!(
                        "Rule group '{}' references unknown rule '{}'",
                        group.id, member.rule_id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Schema registry
    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Rule by id
    pub fn rule(&self, id: &str) -> Option<Arc<Rule>> {
        self.rules.get(id).cloned()
    }

    /// Rule group by id
    pub fn rule_group(&self, id: &str) -> Option<Arc<RuleGroup>> {
        self.rule_groups.get(id).cloned()
    }

    /// Station by id
    pub fn station(&self, id: &str) -> Option<Arc<Station>> {
        self.stations.get(id).cloned()
    }

    /// Number of rules, groups and stations
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.rules.len(), self.rule_groups.len(), self.stations.len())
    }
}
