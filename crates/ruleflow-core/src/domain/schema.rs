//! Field classes and fields
//!
//! The schema registry is the typed vocabulary rules are written against.
//! Every `FieldRef` parameter names a field as `class.field`; the registry
//! resolves that name to a [`Field`] and its declared [`FieldType`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::types::{FieldType, FieldValue};
use crate::CoreError;

/// Where output assignments to fields of a class are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassType {
    /// Caller-supplied values; assignments land in Variables
    Input,
    /// Scratch values
    #[default]
    Variable,
    /// Values returned to the caller
    Output,
}

/// A named grouping of fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldClass {
    /// Class identifier
    pub id: String,
    /// Class name used in `class.field` addressing
    pub name: String,
    /// Class type
    #[serde(default)]
    pub class_type: ClassType,
    /// Parent class for one level of namespacing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A typed field belonging to exactly one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Field identifier
    pub id: String,
    /// Owning class id
    pub class_id: String,
    /// Field name
    pub name: String,
    /// Declared type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Optional size for strings or precision for decimals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    /// Default used when the field is missing from the context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Immutable registry of field classes and their fields
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    classes: HashMap<String, FieldClass>,
    class_ids_by_name: HashMap<String, String>,
    fields: HashMap<String, Field>,
    fields_by_class: HashMap<String, HashMap<String, String>>,
}

impl SchemaRegistry {
    /// Build a registry, checking parent links and field ownership
    pub fn new(classes: Vec<FieldClass>, fields: Vec<Field>) -> Result<Self, CoreError> {
        let mut registry = SchemaRegistry::default();

        for class in classes {
            if registry.classes.contains_key(&class.id) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate field class id: {}",
                    class.id
                )));
            }
            if registry.class_ids_by_name.contains_key(&class.name) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate field class name: {}",
                    class.name
                )));
            }
            registry
                .class_ids_by_name
                .insert(class.name.clone(), class.id.clone());
            registry.classes.insert(class.id.clone(), class);
        }

        for class in registry.classes.values() {
            if let Some(parent_id) = &class.parent_id {
                let parent = registry.classes.get(parent_id).ok_or_else(|| {
                    CoreError::ValidationError(format!(
                        "Field class '{}' references unknown parent '{}'",
                        class.name, parent_id
                    ))
                })?;
                if parent.parent_id.is_some() {
                    return Err(CoreError::ValidationError(format!(
                        "Field class '{}' nests more than one level deep",
                        class.name
                    )));
                }
            }
        }

        for field in fields {
            if !registry.classes.contains_key(&field.class_id) {
                return Err(CoreError::ValidationError(format!(
                    "Field '{}' belongs to unknown class '{}'",
                    field.name, field.class_id
                )));
            }
            let by_name = registry
                .fields_by_class
                .entry(field.class_id.clone())
                .or_default();
            if by_name.contains_key(&field.name) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate field '{}' in class '{}'",
                    field.name, field.class_id
                )));
            }
            by_name.insert(field.name.clone(), field.id.clone());
            registry.fields.insert(field.id.clone(), field);
        }

        Ok(registry)
    }

    /// Look up a class by id
    pub fn class(&self, id: &str) -> Option<&FieldClass> {
        self.classes.get(id)
    }

    /// Look up a class by name
    pub fn class_by_name(&self, name: &str) -> Option<&FieldClass> {
        self.class_ids_by_name
            .get(name)
            .and_then(|id| self.classes.get(id))
    }

    /// All classes
    pub fn classes(&self) -> impl Iterator<Item = &FieldClass> {
        self.classes.values()
    }

    /// Fields of a class
    pub fn fields_of(&self, class_id: &str) -> Vec<&Field> {
        self.fields_by_class
            .get(class_id)
            .map(|by_name| {
                by_name
                    .values()
                    .filter_map(|id| self.fields.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Find a field of a class by name
    pub fn field_in_class(&self, class_id: &str, name: &str) -> Option<&Field> {
        self.fields_by_class
            .get(class_id)
            .and_then(|by_name| by_name.get(name))
            .and_then(|id| self.fields.get(id))
    }

    /// Resolve a `class.field` reference, or a field id
    pub fn resolve(&self, reference: &str) -> Result<&Field, CoreError> {
        if let Some(field) = self.fields.get(reference) {
            return Ok(field);
        }

        let (class_name, field_name) = reference.split_once('.').ok_or_else(|| {
            CoreError::LookupError(format!("Field reference '{}' is not class.field", reference))
        })?;
        let class = self.class_by_name(class_name).ok_or_else(|| {
            CoreError::LookupError(format!("Unknown field class '{}'", class_name))
        })?;
        self.field_in_class(&class.id, field_name).ok_or_else(|| {
            CoreError::LookupError(format!(
                "Unknown field '{}' in class '{}'",
                field_name, class_name
            ))
        })
    }

    /// The qualified `class.field` name of a field
    pub fn qualified_name(&self, field: &Field) -> String {
        match self.classes.get(&field.class_id) {
            Some(class) => format!("{}.{}", class.name, field.name),
            None => field.name.clone(),
        }
    }

    /// Whether a rule owned by `rule_class_id` may reference `field`
    pub fn is_visible_from(&self, rule_class_id: &str, field: &Field) -> bool {
        if field.class_id == rule_class_id {
            return true;
        }
        self.classes
            .get(&field.class_id)
            .and_then(|class| class.parent_id.as_deref())
            == Some(rule_class_id)
    }

    /// Class type of the class owning `field`
    pub fn class_type_of(&self, field: &Field) -> ClassType {
        self.classes
            .get(&field.class_id)
            .map(|class| class.class_type)
            .unwrap_or_default()
    }

    /// Read the value addressed by `field` from a scope map
    ///
    /// Lookup order is the qualified key, the nested `class -> field`
    /// object, then the bare field name.
    pub fn read<'a>(&self, scope: &'a Map<String, Value>, field: &Field) -> Option<&'a Value> {
        let class_name = self
            .classes
            .get(&field.class_id)
            .map(|c| c.name.as_str())
            .unwrap_or_default();

        scope
            .get(&format!("{}.{}", class_name, field.name))
            .or_else(|| {
                scope
                    .get(class_name)
                    .and_then(Value::as_object)
                    .and_then(|nested| nested.get(&field.name))
            })
            .or_else(|| scope.get(&field.name))
            .filter(|value| !value.is_null())
    }

    /// Coerce the raw value of a field, applying the declared default for missing values
    pub fn coerce(&self, field: &Field, raw: Option<&Value>) -> Result<Option<FieldValue>, CoreError> {
        match raw.or(field.default.as_ref()) {
            Some(value) => field.field_type.coerce(value).map(Some).map_err(|e| match e {
                CoreError::ValidationError(msg) => CoreError::ValidationError(format!(
                    "{} ({})",
                    msg,
                    self.qualified_name(field)
                )),
                other => other,
            }),
            None => Ok(None),
        }
    }
}
