//! Seed reference tables
//!
//! `postal_provinces` maps the first letter of a Canadian postal code to its
//! province; `tax_rates` holds the sales tax components per province.

use ruleflow_core::domain::repository::memory::MemoryReferenceTableRepository;
use ruleflow_core::Row;
use serde_json::json;
use std::collections::HashMap;

/// Postal prefix table
pub const POSTAL_PROVINCES_TABLE: &str = "postal_provinces";

/// Sales tax table
pub const TAX_RATES_TABLE: &str = "tax_rates";

const PREFIXES: &[(&str, &str)] = &[
    ("A", "NL"),
    ("B", "NS"),
    ("C", "PE"),
    ("E", "NB"),
    ("G", "QC"),
    ("H", "QC"),
    ("J", "QC"),
    ("K", "ON"),
    ("L", "ON"),
    ("M", "ON"),
    ("N", "ON"),
    ("P", "ON"),
    ("R", "MB"),
    ("S", "SK"),
    ("T", "AB"),
    ("V", "BC"),
    ("X", "NT"),
    ("Y", "YT"),
];

// province, name, gst, hst, pst
const RATES: &[(&str, &str, f64, f64, f64)] = &[
    ("AB", "Alberta", 0.05, 0.0, 0.0),
    ("BC", "British Columbia", 0.05, 0.0, 0.07),
    ("MB", "Manitoba", 0.05, 0.0, 0.07),
    ("NB", "New Brunswick", 0.0, 0.15, 0.0),
    ("NL", "Newfoundland and Labrador", 0.0, 0.15, 0.0),
    ("NS", "Nova Scotia", 0.0, 0.15, 0.0),
    ("NT", "Northwest Territories", 0.05, 0.0, 0.0),
    ("ON", "Ontario", 0.0, 0.13, 0.0),
    ("PE", "Prince Edward Island", 0.0, 0.15, 0.0),
    ("QC", "Quebec", 0.05, 0.0, 0.09975),
    ("SK", "Saskatchewan", 0.05, 0.0, 0.06),
    ("YT", "Yukon", 0.05, 0.0, 0.0),
];

fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Row::new(),
    }
}

/// Rows of the postal prefix table keyed by prefix letter
pub fn postal_provinces() -> HashMap<String, Row> {
    PREFIXES
        .iter()
        .map(|(prefix, province)| {
            (
                prefix.to_string(),
                row(json!({ "prefix": prefix, "province": province })),
            )
        })
        .collect()
}

/// Rows of the tax table keyed by province code
pub fn tax_rates() -> HashMap<String, Row> {
    RATES
        .iter()
        .map(|(province, name, gst, hst, pst)| {
            (
                province.to_string(),
                row(json!({
                    "province": province,
                    "name": name,
                    "gst": gst,
                    "hst": hst,
                    "pst": pst,
                })),
            )
        })
        .collect()
}

/// Load both seed tables into a memory repository
pub fn seed_reference_tables(repository: &MemoryReferenceTableRepository) {
    repository.put_table(POSTAL_PROVINCES_TABLE, postal_provinces());
    repository.put_table(TAX_RATES_TABLE, tax_rates());
    tracing::info!(
        prefixes = PREFIXES.len(),
        provinces = RATES.len(),
        "Seed reference tables loaded"
    );
}
