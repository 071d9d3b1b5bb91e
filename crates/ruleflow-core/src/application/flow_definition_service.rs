use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    domain::flow_definition::{FlowDefinition, FlowId},
    domain::flow_graph::FlowGraph,
    domain::repository::FlowDefinitionRepository,
    domain::rule::Catalog,
    CoreError,
};

/// Listing entry for a deployed flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    /// Flow id
    pub id: String,
    /// Flow name
    pub name: String,
    /// Flow version
    pub version: String,
    /// Node count
    pub nodes: usize,
    /// Connection count
    pub connections: usize,
}

/// Service for managing flow definitions and their compiled graphs
pub struct FlowDefinitionService {
    /// Repository for flow definitions
    flow_definition_repo: Arc<dyn FlowDefinitionRepository>,

    /// Current catalog snapshot
    catalog: RwLock<Arc<Catalog>>,

    /// Compiled graphs keyed by flow id
    compiled: DashMap<String, Arc<FlowGraph>>,
}

impl FlowDefinitionService {
    /// Create a new flow definition service
    pub fn new(flow_definition_repo: Arc<dyn FlowDefinitionRepository>, catalog: Catalog) -> Self {
        Self {
            flow_definition_repo,
            catalog: RwLock::new(Arc::new(catalog)),
            compiled: DashMap::new(),
        }
    }

    /// Current catalog snapshot
    pub async fn catalog(&self) -> Arc<Catalog> {
        self.catalog.read().await.clone()
    }

    /// Validate, persist and compile a flow definition
    pub async fn deploy_definition(&self, definition: FlowDefinition) -> Result<Arc<FlowGraph>, CoreError> {
        let catalog = self.catalog().await;
        definition.validate(&catalog)?;
        let graph = Arc::new(FlowGraph::compile(&definition, &catalog)?);

        self.flow_definition_repo.save(&definition).await?;
        self.compiled.insert(definition.id.0.clone(), graph.clone());

        tracing::info!(
            flow_id = %definition.id,
            version = %definition.version,
            nodes = definition.nodes.len(),
            connections = definition.connections.len(),
            "Flow deployed"
        );
        Ok(graph)
    }

    /// Remove a flow definition
    pub async fn undeploy_definition(&self, flow_id: &FlowId) -> Result<(), CoreError> {
        if self.flow_definition_repo.find_by_id(flow_id).await?.is_none() {
            return Err(CoreError::FlowDefinitionNotFound(flow_id.0.clone()));
        }
        self.flow_definition_repo.delete(flow_id).await?;
        self.compiled.remove(&flow_id.0);

        tracing::info!(flow_id = %flow_id, "Flow undeployed");
        Ok(())
    }

    /// Stored definition of a flow
    pub async fn get_definition(&self, flow_id: &FlowId) -> Result<FlowDefinition, CoreError> {
        self.flow_definition_repo
            .find_by_id(flow_id)
            .await?
            .ok_or_else(|| CoreError::FlowDefinitionNotFound(flow_id.0.clone()))
    }

    /// List all deployed flow definitions
    pub async fn list_definitions(&self) -> Result<Vec<FlowSummary>, CoreError> {
        let definitions = self.flow_definition_repo.find_all().await?;
        Ok(definitions
            .into_iter()
            .map(|def| FlowSummary {
                id: def.id.0,
                name: def.name,
                version: def.version,
                nodes: def.nodes.len(),
                connections: def.connections.len(),
            })
            .collect())
    }

    /// Compiled graph of a flow together with the catalog it was compiled against
    pub async fn graph(&self, flow_id: &FlowId) -> Result<(Arc<FlowGraph>, Arc<Catalog>), CoreError> {
        let catalog = self.catalog().await;
        if let Some(graph) = self.compiled.get(&flow_id.0) {
            return Ok((graph.clone(), catalog));
        }

        let definition = self.get_definition(flow_id).await?;
        let graph = Arc::new(FlowGraph::compile(&definition, &catalog)?);
        self.compiled.insert(flow_id.0.clone(), graph.clone());
        tracing::debug!(flow_id = %flow_id, "Flow graph compiled");
        Ok((graph, catalog))
    }

    /// Swap in a new catalog after checking every deployed flow against it
    pub async fn replace_catalog(&self, catalog: Catalog) -> Result<(), CoreError> {
        let flows = self.flow_definition_repo.find_all().await?;
        for flow in &flows {
            flow.validate(&catalog)?;
        }

        let mut current = self.catalog.write().await;
        *current = Arc::new(catalog);
        self.compiled.clear();

        tracing::info!(flows = flows.len(), "Catalog replaced");
        Ok(())
    }

    /// Replace the catalog and the whole set of flows
    ///
    /// Nothing is changed unless every flow validates against the new catalog.
    /// Running jobs keep the graph they started with.
    pub async fn reload(&self, catalog: Catalog, flows: Vec<FlowDefinition>) -> Result<(), CoreError> {
        let mut seen = HashSet::new();
        for flow in &flows {
            if !seen.insert(flow.id.0.clone()) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate flow id: {}",
                    flow.id
                )));
            }
            flow.validate(&catalog)?;
        }

        let mut current = self.catalog.write().await;
        for existing in self.flow_definition_repo.find_all().await? {
            if !seen.contains(&existing.id.0) {
                self.flow_definition_repo.delete(&existing.id).await?;
            }
        }
        for flow in &flows {
            self.flow_definition_repo.save(flow).await?;
        }
        *current = Arc::new(catalog);
        self.compiled.clear();

        tracing::info!(flows = flows.len(), "Definitions reloaded");
        Ok(())
    }
}
