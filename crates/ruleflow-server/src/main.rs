use anyhow::{Context, Result};
use ruleflow_server::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::load().context("Failed to load configuration")?;

    ruleflow_server::run(config).await.context("Server error")?;

    Ok(())
}
