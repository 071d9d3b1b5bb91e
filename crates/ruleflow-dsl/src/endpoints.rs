//! Dynamic endpoint records
//!
//! An endpoint binds a path template and method to a flow. Its parameters
//! say where each input value comes from; `field` names the request class
//! field the value is coerced with, defaulting to the parameter name.

use ruleflow_core::SchemaRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use crate::error::DslError;
use crate::format::{parse_value, Format};
use crate::validation::identifiers::{is_valid_identifier, is_valid_path_template, path_parameters};
use crate::validation::structure::{check_structure, DocumentKind};
use crate::validation::{check_unique, error_codes, into_result, ValidationError};

/// HTTP method of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    #[serde(alias = "get")]
    Get,
    /// POST
    #[serde(alias = "post")]
    Post,
    /// PUT
    #[serde(alias = "put")]
    Put,
    /// PATCH
    #[serde(alias = "patch")]
    Patch,
    /// DELETE
    #[serde(alias = "delete")]
    Delete,
}

impl HttpMethod {
    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parameter value is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    /// Named segment of the path template
    Path,
    /// Query string
    Query,
    /// Top-level key of the JSON body
    Body,
}

/// How the endpoint invokes its flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationMode {
    /// Run to completion and answer with the result
    #[default]
    Sync,
    /// Submit and answer 202 with the job id
    Async,
}

/// A declared endpoint parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointParameter {
    /// Parameter name
    pub name: String,
    /// Source
    pub source: ParamSource,
    /// Whether the request is rejected when it is missing
    #[serde(default)]
    pub required: bool,
    /// Request class field the value is bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl EndpointParameter {
    /// Field name the value is bound to
    pub fn field_name(&self) -> &str {
        self.field.as_deref().unwrap_or(&self.name)
    }
}

/// A declarative endpoint record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRecord {
    /// Endpoint id
    pub id: String,
    /// Path template such as `/tax/{postal_code}`
    pub path: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Flow to run
    pub flow_id: String,
    /// Class whose fields type the request values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_class: Option<String>,
    /// Class whose fields select the response values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_class: Option<String>,
    /// Declared parameters
    #[serde(default)]
    pub parameters: Vec<EndpointParameter>,
    /// Invocation mode
    #[serde(default)]
    pub mode: InvocationMode,
}

#[derive(Debug, Deserialize)]
struct EndpointsDocument {
    endpoints: Vec<EndpointRecord>,
}

/// Import an endpoints document from text
pub fn import_endpoints(text: &str, format: Format) -> Result<Vec<EndpointRecord>, DslError> {
    import_endpoints_value(parse_value(text, format)?)
}

/// Import an already parsed endpoints document
pub fn import_endpoints_value(document: Value) -> Result<Vec<EndpointRecord>, DslError> {
    into_result(check_structure(DocumentKind::Endpoints, &document)?)?;
    let document: EndpointsDocument = serde_json::from_value(document)?;
    into_result(check_endpoints(&document.endpoints))?;
    Ok(document.endpoints)
}

fn check_endpoints(endpoints: &[EndpointRecord]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    check_unique(&mut errors, "endpoint", "endpoints", endpoints.iter().map(|e| e.id.as_str()));

    let mut routes = HashSet::new();
    for (idx, endpoint) in endpoints.iter().enumerate() {
        let at = format!("endpoints[{}]", idx);

        if !is_valid_identifier(&endpoint.id) {
            errors.push(
                ValidationError::new(
                    error_codes::INVALID_IDENTIFIER,
                    format!("Invalid endpoint id '{}'", endpoint.id),
                )
                .at(format!("{}.id", at)),
            );
        }

        if !is_valid_path_template(&endpoint.path) {
            errors.push(
                ValidationError::new(
                    error_codes::INVALID_PATH_TEMPLATE,
                    format!("Malformed path template '{}'", endpoint.path),
                )
                .at(format!("{}.path", at)),
            );
            continue;
        }

        if !routes.insert((endpoint.method, normalized_route(&endpoint.path))) {
            errors.push(
                ValidationError::new(
                    error_codes::DUPLICATE_ID,
                    format!("Route {} {} is declared twice", endpoint.method, endpoint.path),
                )
                .at(format!("{}.path", at)),
            );
        }

        let template: Vec<String> = path_parameters(&endpoint.path);
        check_unique(
            &mut errors,
            "parameter",
            &format!("{}.parameters", at),
            endpoint.parameters.iter().map(|p| p.name.as_str()),
        );

        for name in &template {
            let declared = endpoint
                .parameters
                .iter()
                .any(|p| p.source == ParamSource::Path && &p.name == name);
            if !declared {
                errors.push(
                    ValidationError::new(
                        error_codes::MISSING_REQUIRED_FIELD,
                        format!("Path parameter '{}' is not declared", name),
                    )
                    .at(format!("{}.parameters", at)),
                );
            }
        }

        for (pidx, param) in endpoint.parameters.iter().enumerate() {
            if param.source == ParamSource::Path && !template.contains(&param.name) {
                errors.push(
                    ValidationError::new(
                        error_codes::INVALID_REFERENCE,
                        format!("Parameter '{}' does not appear in '{}'", param.name, endpoint.path),
                    )
                    .at(format!("{}.parameters[{}]", at, pidx)),
                );
            }
        }
    }

    errors
}

// Parameter names do not distinguish routes
fn normalized_route(path: &str) -> String {
    path.trim_end_matches('/')
        .split('/')
        .map(|segment| if segment.starts_with('{') { "{}" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check class and field bindings of endpoint records against a schema
pub fn check_bindings(endpoints: &[EndpointRecord], schema: &SchemaRegistry) -> Result<(), DslError> {
    let mut errors = Vec::new();

    for (idx, endpoint) in endpoints.iter().enumerate() {
        let at = format!("endpoints[{}]", idx);

        for (key, class) in [
            ("requestClass", &endpoint.request_class),
            ("responseClass", &endpoint.response_class),
        ] {
            if let Some(name) = class {
                if schema.class_by_name(name).is_none() && schema.class(name).is_none() {
                    errors.push(
                        ValidationError::new(error_codes::INVALID_REFERENCE, format!("Unknown class '{}'", name))
                            .at(format!("{}.{}", at, key)),
                    );
                }
            }
        }

        let request = endpoint
            .request_class
            .as_deref()
            .and_then(|name| schema.class_by_name(name).or_else(|| schema.class(name)));
        if let Some(class) = request {
            for (pidx, param) in endpoint.parameters.iter().enumerate() {
                if param.field.is_some() && schema.field_in_class(&class.id, param.field_name()).is_none() {
                    errors.push(
                        ValidationError::new(
                            error_codes::INVALID_REFERENCE,
                            format!("Class '{}' has no field '{}'", class.name, param.field_name()),
                        )
                        .at(format!("{}.parameters[{}].field", at, pidx)),
                    );
                }
            }
        }
    }

    into_result(errors)
}
