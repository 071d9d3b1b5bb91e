use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Ids of flows, nodes, rules, classes and tables
    static ref IDENTIFIER_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").unwrap();

    // "/tax/{postal_code}/rates": literal segments or a single named parameter per segment
    static ref PATH_TEMPLATE_REGEX: Regex = Regex::new(
        r"^(/([A-Za-z0-9_.\-]+|\{[A-Za-z_][A-Za-z0-9_]*\}))+/?$|^/$"
    ).unwrap();

    static ref PATH_PARAM_REGEX: Regex = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Whether an id is well formed
pub fn is_valid_identifier(id: &str) -> bool {
    IDENTIFIER_REGEX.is_match(id)
}

/// Whether a path template is well formed
pub fn is_valid_path_template(path: &str) -> bool {
    PATH_TEMPLATE_REGEX.is_match(path)
}

/// Named parameters of a path template in order of appearance
pub fn path_parameters(path: &str) -> Vec<String> {
    PATH_PARAM_REGEX
        .captures_iter(path)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}
