//! Definitions directory loader
//!
//! Layout:
//!
//! ```text
//! <dir>/catalog.{yaml,yml,json}      classes, fields, rules, groups, stations
//! <dir>/endpoints.{yaml,yml,json}    dynamic endpoint records
//! <dir>/flows/*.{json,yaml,yml}      one flow document per file
//! <dir>/tables/*.{yaml,yml,json}     reference tables
//! ```
//!
//! Every file is optional. Nothing is applied here; the caller swaps the
//! loaded set in as a whole.

use ruleflow_core::FlowDefinition;
use ruleflow_dsl::{
    import_catalog, import_endpoints, import_flow, import_tables, CatalogDocument, EndpointRecord, Format,
    ReferenceTable,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ServerError, ServerResult};

const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Everything read from a definitions directory
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    /// Catalog document
    pub catalog: CatalogDocument,
    /// Flow definitions
    pub flows: Vec<FlowDefinition>,
    /// Endpoint records
    pub endpoints: Vec<EndpointRecord>,
    /// Reference tables
    pub tables: Vec<ReferenceTable>,
}

/// Load a definitions directory
pub async fn load_definitions(dir: &Path) -> ServerResult<Definitions> {
    if !tokio::fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Err(ServerError::NotFound(format!("Definitions directory {}", dir.display())));
    }

    let mut definitions = Definitions::default();

    if let Some(path) = find_document(dir, "catalog").await {
        let text = read(&path).await?;
        definitions.catalog = import_catalog(&text, Format::from_path(&path)?).map_err(|e| located(&path, e))?;
    }

    if let Some(path) = find_document(dir, "endpoints").await {
        let text = read(&path).await?;
        definitions.endpoints =
            import_endpoints(&text, Format::from_path(&path)?).map_err(|e| located(&path, e))?;
    }

    for path in list_documents(&dir.join("flows")).await? {
        let text = read(&path).await?;
        let flow = import_flow(&text, Format::from_path(&path)?).map_err(|e| located(&path, e))?;
        debug!(flow_id = %flow.id, file = %path.display(), "Flow document read");
        definitions.flows.push(flow);
    }

    for path in list_documents(&dir.join("tables")).await? {
        let text = read(&path).await?;
        let tables = import_tables(&text, Format::from_path(&path)?).map_err(|e| located(&path, e))?;
        definitions.tables.extend(tables);
    }

    info!(
        dir = %dir.display(),
        flows = definitions.flows.len(),
        endpoints = definitions.endpoints.len(),
        tables = definitions.tables.len(),
        "Definitions loaded"
    );
    Ok(definitions)
}

async fn find_document(dir: &Path, stem: &str) -> Option<PathBuf> {
    for ext in EXTENSIONS {
        let path = dir.join(format!("{}.{}", stem, ext));
        if tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            return Some(path);
        }
    }
    None
}

// Sorted so that loading order does not depend on the file system
async fn list_documents(dir: &Path) -> ServerResult<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let known = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| EXTENSIONS.contains(&ext));
        if known && entry.file_type().await?.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

async fn read(path: &Path) -> ServerResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ServerError::InternalError(format!("Cannot read {}: {}", path.display(), e)))
}

fn located(path: &Path, err: ruleflow_dsl::DslError) -> ServerError {
    tracing::warn!(file = %path.display(), error = %err, "Definition document rejected");
    ServerError::Definition(err)
}
