//! Reference table documents

use ruleflow_core::Row;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::DslError;
use crate::format::{parse_value, Format};
use crate::validation::identifiers::is_valid_identifier;
use crate::validation::structure::{check_structure, DocumentKind};
use crate::validation::{check_unique, error_codes, into_result, ValidationError};

/// A reference table keyed by the text of its key column
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTable {
    /// Table name
    pub name: String,
    /// Rows by key
    pub rows: HashMap<String, Row>,
}

#[derive(Debug, Deserialize)]
struct TableDocument {
    name: String,
    key: String,
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct TablesDocument {
    tables: Vec<TableDocument>,
}

/// Import a tables document from text
pub fn import_tables(text: &str, format: Format) -> Result<Vec<ReferenceTable>, DslError> {
    import_tables_value(parse_value(text, format)?)
}

/// Import an already parsed tables document
pub fn import_tables_value(document: Value) -> Result<Vec<ReferenceTable>, DslError> {
    into_result(check_structure(DocumentKind::Tables, &document)?)?;
    let document: TablesDocument = serde_json::from_value(document)?;

    let mut errors = Vec::new();
    check_unique(&mut errors, "table", "tables", document.tables.iter().map(|t| t.name.as_str()));

    let mut tables = Vec::with_capacity(document.tables.len());
    for (tidx, table) in document.tables.into_iter().enumerate() {
        if !is_valid_identifier(&table.name) {
            errors.push(
                ValidationError::new(
                    error_codes::INVALID_IDENTIFIER,
                    format!("Invalid table name '{}'", table.name),
                )
                .at(format!("tables[{}].name", tidx)),
            );
        }

        let mut rows = HashMap::with_capacity(table.rows.len());
        for (ridx, row) in table.rows.into_iter().enumerate() {
            let at = format!("tables[{}].rows[{}]", tidx, ridx);
            let Some(key) = row.get(&table.key).and_then(key_text) else {
                errors.push(
                    ValidationError::new(
                        error_codes::MISSING_REQUIRED_FIELD,
                        format!("Row has no key column '{}'", table.key),
                    )
                    .at(at),
                );
                continue;
            };
            if rows.insert(key.clone(), row).is_some() {
                errors.push(
                    ValidationError::new(error_codes::DUPLICATE_ID, format!("Duplicate key '{}'", key)).at(at),
                );
            }
        }

        tables.push(ReferenceTable { name: table.name, rows });
    }

    into_result(errors)?;
    Ok(tables)
}

fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
