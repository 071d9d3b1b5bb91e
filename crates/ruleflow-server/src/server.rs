//! Ruleflow Server implementation
//!
//! Wires the engine services together, owns the live route table and runs
//! the HTTP listener.

use axum::Router;
use ruleflow_core::domain::repository::memory::{
    MemoryFlowDefinitionRepository, MemoryJobRepository, MemoryReferenceTableRepository,
};
use ruleflow_core::{
    CoreError, FlowDefinitionService, FlowExecutionService, JobService, LookupService, RuleInterpreter,
};
use ruleflow_stdlib::{builtin_registry, seed_reference_tables};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::loader::{load_definitions, Definitions};
use crate::registrar::RouteTable;

/// Main server state shared by every handler
pub struct RuleflowServer {
    /// Configuration
    pub config: ServerConfig,

    jobs: Arc<JobService>,
    flows: Arc<FlowDefinitionService>,
    lookups: Arc<LookupService>,
    tables: Arc<MemoryReferenceTableRepository>,
    routes: RwLock<Arc<RouteTable>>,
}

impl std::fmt::Debug for RuleflowServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleflowServer")
            .field("config", &self.config)
            .finish()
    }
}

impl RuleflowServer {
    /// Create a server, loading the configured definitions directory
    pub async fn new(config: ServerConfig) -> ServerResult<Arc<Self>> {
        let definitions = match &config.definitions_dir {
            Some(dir) => load_definitions(dir).await?,
            None => {
                info!("No definitions directory configured, starting empty");
                Definitions::default()
            }
        };
        Self::with_definitions(config, definitions).await
    }

    /// Create a server from already loaded definitions
    pub async fn with_definitions(config: ServerConfig, definitions: Definitions) -> ServerResult<Arc<Self>> {
        let tables = Arc::new(MemoryReferenceTableRepository::new());
        let lookups = Arc::new(LookupService::new(tables.clone(), config.lookup_config()));
        let interpreter = Arc::new(RuleInterpreter::new(Arc::new(builtin_registry()), lookups.clone()));

        let flows = Arc::new(FlowDefinitionService::new(
            Arc::new(MemoryFlowDefinitionRepository::new()),
            Default::default(),
        ));
        let jobs = Arc::new(JobService::new(
            Arc::new(MemoryJobRepository::new()),
            flows.clone(),
            Arc::new(FlowExecutionService::new(interpreter)),
            config.job_service_config(),
        ));

        let server = Arc::new(Self {
            config,
            jobs,
            flows,
            lookups,
            tables,
            routes: RwLock::new(Arc::new(RouteTable::empty())),
        });

        server.apply(definitions).await?;
        server.jobs.start_workers(server.config.worker_count);
        Ok(server)
    }

    /// Job lifecycle manager
    pub fn jobs(&self) -> &Arc<JobService> {
        &self.jobs
    }

    /// Flow definition service
    pub fn flows(&self) -> &Arc<FlowDefinitionService> {
        &self.flows
    }

    /// Reference table lookups
    pub fn lookups(&self) -> &Arc<LookupService> {
        &self.lookups
    }

    /// Snapshot of the current route table
    pub async fn routes(&self) -> Arc<RouteTable> {
        Arc::clone(&*self.routes.read().await)
    }

    /// Re-read the definitions directory and swap everything in
    pub async fn reload(&self) -> ServerResult<()> {
        let Some(dir) = &self.config.definitions_dir else {
            return Err(ServerError::ValidationError(
                "No definitions directory configured".to_string(),
            ));
        };
        let definitions = load_definitions(dir).await?;
        self.apply(definitions).await
    }

    // Everything that can be rejected is checked before anything is replaced
    async fn apply(&self, definitions: Definitions) -> ServerResult<()> {
        let Definitions {
            catalog,
            flows,
            endpoints,
            tables,
        } = definitions;

        let catalog = catalog.into_catalog()?;
        let routes = RouteTable::build(endpoints, catalog.schema(), self.jobs.clone())?;
        let flow_count = flows.len();
        self.flows.reload(catalog, flows).await.map_err(|e| match e {
            CoreError::GraphError(_) | CoreError::ValidationError(_) => ServerError::Definition(e.into()),
            other => ServerError::Core(other),
        })?;

        self.tables.clear();
        if self.config.seed_reference_data {
            seed_reference_tables(&self.tables);
        }
        for table in tables {
            self.tables.put_table(table.name, table.rows);
        }
        self.lookups.clear();

        let route_count = routes.len();
        *self.routes.write().await = Arc::new(routes);

        info!(flows = flow_count, routes = route_count, "Definitions applied");
        Ok(())
    }

    /// Router with the management API, dynamic dispatch and middleware
    pub fn router(self: &Arc<Self>) -> Router {
        crate::api::build_router(Arc::clone(self))
            .layer(RequestBodyLimitLayer::new(self.config.body_limit_bytes))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until ctrl-c
    pub async fn run(self: Arc<Self>) -> ServerResult<()> {
        info!("Starting Ruleflow Server");

        let app = self.router();
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| ServerError::ConfigError(format!("Invalid bind address: {}", e)))?;
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "Server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
