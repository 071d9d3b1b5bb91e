//! Catalog documents: field classes, fields, rules, rule groups and stations

use ruleflow_core::{Catalog, Field, FieldClass, Rule, RuleGroup, SchemaRegistry, Station};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::DslError;
use crate::format::{parse_value, Format};
use crate::validation::identifiers::is_valid_identifier;
use crate::validation::structure::{check_structure, DocumentKind};
use crate::validation::{check_unique, error_codes, into_result, ValidationError};

/// Declarative catalog document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    /// Field classes
    #[serde(default)]
    pub classes: Vec<FieldClass>,
    /// Fields
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Rules
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Rule groups
    #[serde(default)]
    pub rule_groups: Vec<RuleGroup>,
    /// Stations
    #[serde(default)]
    pub stations: Vec<Station>,
}

impl CatalogDocument {
    /// Append the contents of another document
    pub fn merge(&mut self, other: CatalogDocument) {
        self.classes.extend(other.classes);
        self.fields.extend(other.fields);
        self.rules.extend(other.rules);
        self.rule_groups.extend(other.rule_groups);
        self.stations.extend(other.stations);
    }

    /// Build a validated catalog
    pub fn into_catalog(self) -> Result<Catalog, DslError> {
        into_result(self.check())?;
        let schema = SchemaRegistry::new(self.classes, self.fields)?;
        let catalog = Catalog::new(schema, self.rules, self.rule_groups, self.stations)?;
        let (rules, groups, stations) = catalog.counts();
        tracing::debug!(rules, groups, stations, "Catalog built");
        Ok(catalog)
    }

    fn check(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        check_unique(&mut errors, "class", "classes", self.classes.iter().map(|c| c.id.as_str()));
        check_unique(&mut errors, "field", "fields", self.fields.iter().map(|f| f.id.as_str()));
        check_unique(&mut errors, "rule", "rules", self.rules.iter().map(|r| r.id.as_str()));
        check_unique(
            &mut errors,
            "rule group",
            "ruleGroups",
            self.rule_groups.iter().map(|g| g.id.as_str()),
        );
        check_unique(&mut errors, "station", "stations", self.stations.iter().map(|s| s.id.as_str()));

        let ids = self
            .classes
            .iter()
            .map(|c| ("classes", c.id.as_str()))
            .chain(self.rules.iter().map(|r| ("rules", r.id.as_str())))
            .chain(self.rule_groups.iter().map(|g| ("ruleGroups", g.id.as_str())))
            .chain(self.stations.iter().map(|s| ("stations", s.id.as_str())));
        for (section, id) in ids {
            if !is_valid_identifier(id) {
                errors.push(
                    ValidationError::new(error_codes::INVALID_IDENTIFIER, format!("Invalid id '{}'", id))
                        .at(section),
                );
            }
        }

        for (idx, rule) in self.rules.iter().enumerate() {
            for line in rule.conditions.iter().chain(rule.actions.iter()) {
                let mut seen = HashSet::new();
                for param in &line.parameters {
                    if !seen.insert(param.index) {
                        errors.push(
                            ValidationError::new(
                                error_codes::DUPLICATE_ID,
                                format!("Line '{}' repeats parameter index {}", line.id, param.index),
                            )
                            .at(format!("rules[{}]", idx)),
                        );
                    }
                }
            }
        }

        errors
    }
}

/// Import a catalog document from text
pub fn import_catalog(text: &str, format: Format) -> Result<CatalogDocument, DslError> {
    import_catalog_value(parse_value(text, format)?)
}

/// Import an already parsed catalog document
pub fn import_catalog_value(document: Value) -> Result<CatalogDocument, DslError> {
    into_result(check_structure(DocumentKind::Catalog, &document)?)?;
    Ok(serde_json::from_value(document)?)
}
