//!
//! Ruleflow Server - HTTP surface of the Ruleflow engine
//!
//! Serves the flow, job and administration API and dispatches every other
//! request through a route table built from declarative endpoint records.

/// API module
pub mod api;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Definitions directory loader
pub mod loader;

/// Dynamic endpoint registrar
pub mod registrar;

/// Server module
pub mod server;

// Re-export key types
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use loader::{load_definitions, Definitions};
pub use registrar::{RouteMatch, RouteRequest, RouteTable};
pub use server::RuleflowServer;

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    init_logging(&config);

    let server = RuleflowServer::new(config).await?;
    server.run().await
}

/// Initialize logging
fn init_logging(config: &ServerConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt().with_env_filter(filter).with_target(true).init();
    }
}
