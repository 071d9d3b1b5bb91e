//! Structural validation with JSON Schema
//!
//! Each document kind has an embedded schema. Structure is checked on the
//! untyped document before it is deserialized, so every problem is reported
//! with its JSON pointer rather than as the first serde error.

use jsonschema::JSONSchema;
use serde_json::{json, Value};

use crate::error::DslError;
use crate::validation::{error_codes, ValidationError};

/// Kinds of declarative documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Flow import/export document
    Flow,
    /// Field classes, fields, rules, rule groups and stations
    Catalog,
    /// Dynamic endpoint records
    Endpoints,
    /// Reference tables
    Tables,
}

impl DocumentKind {
    fn schema(self) -> Value {
        match self {
            DocumentKind::Flow => flow_schema(),
            DocumentKind::Catalog => catalog_schema(),
            DocumentKind::Endpoints => endpoints_schema(),
            DocumentKind::Tables => tables_schema(),
        }
    }
}

/// Check a document against the schema of its kind
pub fn check_structure(kind: DocumentKind, document: &Value) -> Result<Vec<ValidationError>, DslError> {
    let schema = kind.schema();
    let compiled = JSONSchema::compile(&schema)
        .map_err(|e| DslError::InternalError(format!("Invalid {:?} schema: {}", kind, e)))?;

    let errors = match compiled.validate(document) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| {
                let pointer = e.instance_path.to_string();
                ValidationError::new(error_codes::INVALID_STRUCTURE, e.to_string())
                    .at(if pointer.is_empty() { "/".to_string() } else { pointer })
            })
            .collect(),
    };
    Ok(errors)
}

fn flow_schema() -> Value {
    json!({
        "type": "object",
        "required": ["flow", "nodes"],
        "properties": {
            "flow": {
                "type": "object",
                "required": ["id", "name", "version"],
                "properties": {
                    "id": { "type": "string", "minLength": 1 },
                    "name": { "type": "string" },
                    "version": { "type": "string" },
                    "description": { "type": ["string", "null"] },
                    "startNodes": { "type": "array", "items": { "type": "string" } }
                }
            },
            "nodes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "type", "referenceId"],
                    "properties": {
                        "id": { "type": "string", "minLength": 1 },
                        "type": {
                            "enum": ["STATION", "RULE_GROUP", "RULE", "station", "rule_group", "rule-group", "rule"]
                        },
                        "referenceId": { "type": "string", "minLength": 1 },
                        "label": { "type": ["string", "null"] },
                        "parentId": { "type": ["string", "null"] }
                    }
                }
            },
            "connections": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["sourceId", "targetId", "type"],
                    "properties": {
                        "sourceId": { "type": "string" },
                        "targetId": { "type": "string" },
                        "type": {
                            "enum": ["SUCCESS", "FAILURE", "CONDITIONAL", "DEFAULT", "success", "failure", "conditional", "default"]
                        },
                        "condition": { "type": ["string", "null"] },
                        "label": { "type": ["string", "null"] }
                    }
                }
            }
        }
    })
}

fn catalog_schema() -> Value {
    let parameter = json!({
        "type": "object",
        "required": ["index", "kind"],
        "properties": {
            "index": { "type": "integer", "minimum": 0 },
            "kind": { "enum": ["fieldRef", "literal"] },
            "field": { "type": "string" },
            "fieldType": { "enum": ["string", "text", "integer", "int", "decimal", "number", "float", "boolean", "bool", "date"] }
        }
    });
    let line = json!({
        "type": "object",
        "required": ["id", "sequence", "function"],
        "properties": {
            "id": { "type": "string" },
            "sequence": { "type": "integer", "minimum": 0 },
            "function": { "type": "string", "minLength": 1 },
            "parameters": { "type": "array", "items": parameter }
        }
    });

    json!({
        "type": "object",
        "properties": {
            "classes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "name"],
                    "properties": {
                        "id": { "type": "string" },
                        "name": { "type": "string" },
                        "classType": { "enum": ["input", "variable", "output"] },
                        "parentId": { "type": ["string", "null"] }
                    }
                }
            },
            "fields": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "classId", "name", "type"],
                    "properties": {
                        "id": { "type": "string" },
                        "classId": { "type": "string" },
                        "name": { "type": "string" },
                        "type": { "type": "string" },
                        "size": { "type": ["integer", "null"], "minimum": 0 }
                    }
                }
            },
            "rules": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "name", "classId"],
                    "properties": {
                        "id": { "type": "string" },
                        "name": { "type": "string" },
                        "ruleType": { "type": ["string", "null"] },
                        "classId": { "type": "string" },
                        "conditions": { "type": "array", "items": line.clone() },
                        "actions": { "type": "array", "items": line }
                    }
                }
            },
            "ruleGroups": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "name"],
                    "properties": {
                        "combination": { "enum": ["AND", "OR"] },
                        "members": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["ruleId"],
                                "properties": {
                                    "ruleId": { "type": "string" },
                                    "sequence": { "type": "integer", "minimum": 0 }
                                }
                            }
                        }
                    }
                }
            },
            "stations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "name"]
                }
            }
        }
    })
}

fn endpoints_schema() -> Value {
    json!({
        "type": "object",
        "required": ["endpoints"],
        "properties": {
            "endpoints": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "path", "method", "flowId"],
                    "properties": {
                        "id": { "type": "string" },
                        "path": { "type": "string", "pattern": "^/" },
                        "method": { "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "get", "post", "put", "patch", "delete"] },
                        "flowId": { "type": "string" },
                        "requestClass": { "type": ["string", "null"] },
                        "responseClass": { "type": ["string", "null"] },
                        "mode": { "enum": ["sync", "async"] },
                        "parameters": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["name", "source"],
                                "properties": {
                                    "name": { "type": "string", "minLength": 1 },
                                    "source": { "enum": ["path", "query", "body"] },
                                    "required": { "type": "boolean" },
                                    "field": { "type": ["string", "null"] }
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

fn tables_schema() -> Value {
    json!({
        "type": "object",
        "required": ["tables"],
        "properties": {
            "tables": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "key", "rows"],
                    "properties": {
                        "name": { "type": "string", "minLength": 1 },
                        "key": { "type": "string", "minLength": 1 },
                        "rows": { "type": "array", "items": { "type": "object" } }
                    }
                }
            }
        }
    })
}
