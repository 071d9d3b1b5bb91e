use serde_json::Value;
use std::path::Path;

use crate::error::DslError;

/// Serialization format of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON
    Json,
    /// YAML; JSON is valid YAML as well
    Yaml,
}

impl Format {
    /// Format implied by a file extension
    pub fn from_path(path: &Path) -> Result<Self, DslError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("yaml") | Some("yml") => Ok(Format::Yaml),
            other => Err(DslError::UnsupportedFormat(format!(
                "{} (extension {:?})",
                path.display(),
                other.unwrap_or("")
            ))),
        }
    }
}

/// Parse text into an untyped document
pub fn parse_value(text: &str, format: Format) -> Result<Value, DslError> {
    let value = match format {
        Format::Json => serde_json::from_str(text)?,
        Format::Yaml => serde_yaml::from_str(text)?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::from_path(Path::new("flows/a.json")).unwrap(), Format::Json);
        assert_eq!(Format::from_path(Path::new("catalog.yml")).unwrap(), Format::Yaml);
        assert!(matches!(
            Format::from_path(Path::new("notes.txt")),
            Err(DslError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_yaml_and_json_agree() {
        let yaml = parse_value("a: 1\nb: [x, y]\n", Format::Yaml).unwrap();
        let json = parse_value(r#"{"a": 1, "b": ["x", "y"]}"#, Format::Json).unwrap();
        assert_eq!(yaml, json);
        assert_eq!(yaml, json!({"a": 1, "b": ["x", "y"]}));
    }
}
