//! Configuration for the Ruleflow Server
//!
//! Sources, later ones winning: built-in defaults, an optional config file
//! (`RULEFLOW_CONFIG`, default `config/ruleflow` with any extension the
//! `config` crate understands), `RULEFLOW_*` environment variables, and the
//! legacy `SERVER_PORT`, `SERVER_HOST` and `LOG_LEVEL` variables.

use ruleflow_core::{JobServiceConfig, LookupConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{ServerError, ServerResult};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// Log level used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Directory holding catalog, endpoints, flows and tables
    #[serde(default)]
    pub definitions_dir: Option<PathBuf>,

    /// Job workers draining the submission queue
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Capacity of the submission queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Retry limit of a job chain
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Bound on a reference table read
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Reference rows kept in the lookup cache
    #[serde(default = "default_lookup_cache_capacity")]
    pub lookup_cache_capacity: usize,

    /// Bound on a job repository call
    #[serde(default = "default_job_query_timeout_ms")]
    pub job_query_timeout_ms: u64,

    /// Load the built-in postal code and tax rate tables
    #[serde(default = "default_seed_reference_data")]
    pub seed_reference_data: bool,

    /// Maximum request body size
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_retries() -> u32 {
    3
}

fn default_lookup_timeout_ms() -> u64 {
    2000
}

fn default_lookup_cache_capacity() -> usize {
    1000
}

fn default_job_query_timeout_ms() -> u64 {
    5000
}

fn default_seed_reference_data() -> bool {
    true
}

fn default_body_limit_bytes() -> usize {
    1024 * 1024 // 1 MiB
}

impl ServerConfig {
    /// Load configuration from the config file and the environment
    pub fn load() -> ServerResult<Self> {
        let file = env::var("RULEFLOW_CONFIG").unwrap_or_else(|_| "config/ruleflow".to_string());
        let mut config = Self::load_from(&file)?;
        config.apply_legacy_env();
        config.validate()?;

        info!(port = config.port, bind_address = %config.bind_address, "Loaded server configuration");
        Ok(config)
    }

    /// Load from an optional config file followed by `RULEFLOW_*` variables
    pub fn load_from(file: &str) -> ServerResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(config::Environment::with_prefix("RULEFLOW").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    fn apply_legacy_env(&mut self) {
        if let Ok(port) = env::var("SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.port = port;
            } else {
                warn!("Invalid SERVER_PORT value: {}", port);
            }
        }

        if let Ok(host) = env::var("SERVER_HOST") {
            self.bind_address = host;
        }

        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.log_level = log_level;
        }
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> ServerResult<()> {
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(ServerError::ConfigError(format!(
                "log_format must be pretty or json, got '{}'",
                self.log_format
            )));
        }
        if self.worker_count == 0 {
            return Err(ServerError::ConfigError("worker_count must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ServerError::ConfigError("queue_capacity must be at least 1".to_string()));
        }
        if self.lookup_cache_capacity == 0 {
            return Err(ServerError::ConfigError(
                "lookup_cache_capacity must be at least 1".to_string(),
            ));
        }
        if let Some(dir) = &self.definitions_dir {
            if !dir.is_dir() {
                warn!(dir = %dir.display(), "Definitions directory does not exist");
            }
        }
        Ok(())
    }

    /// Job service settings
    pub fn job_service_config(&self) -> JobServiceConfig {
        JobServiceConfig {
            queue_capacity: self.queue_capacity,
            max_retries: self.max_retries,
            job_query_timeout: Duration::from_millis(self.job_query_timeout_ms),
        }
    }

    /// Lookup service settings
    pub fn lookup_config(&self) -> LookupConfig {
        LookupConfig {
            timeout: Duration::from_millis(self.lookup_timeout_ms),
            cache_capacity: self.lookup_cache_capacity,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_host(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            definitions_dir: None,
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            max_retries: default_max_retries(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            lookup_cache_capacity: default_lookup_cache_capacity(),
            job_query_timeout_ms: default_job_query_timeout_ms(),
            seed_reference_data: default_seed_reference_data(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = ServerConfig::load_from("does/not/exist/ruleflow").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.worker_count, 4);
        assert!(config.seed_reference_data);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ruleflow.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "port = 9191\nlog_format = \"json\"\nworker_count = 2\ndefinitions_dir = \"defs\"").unwrap();

        let stem = dir.path().join("ruleflow");
        let config = ServerConfig::load_from(stem.to_str().unwrap()).unwrap();
        assert_eq!(config.port, 9191);
        assert_eq!(config.log_format, "json");
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.definitions_dir, Some(PathBuf::from("defs")));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_validate_rejects_unknown_log_format() {
        let config = ServerConfig {
            log_format: "xml".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ServerError::ConfigError(_))));
    }

    #[test]
    fn test_lookup_cache_capacity_reaches_lookup_config() {
        let config = ServerConfig {
            lookup_cache_capacity: 64,
            ..Default::default()
        };
        assert_eq!(config.lookup_config().cache_capacity, 64);

        let config = ServerConfig {
            lookup_cache_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ServerError::ConfigError(_))));
    }
}
