use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DB_IDLE_TIMEOUT_SECS: u64 = 600;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 8;
const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Runtime environment: "development", "test" or "production"
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level filter passed to the tracing subscriber
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Database pool tuning
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1, max = 1024))]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Optional per-statement timeout
    #[serde(default)]
    pub db_statement_timeout_secs: Option<u64>,

    /// Capacity of the domain-event channel
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    DEFAULT_DB_MAX_CONNECTIONS
}
fn default_db_min_connections() -> u32 {
    DEFAULT_DB_MIN_CONNECTIONS
}
fn default_db_connect_timeout_secs() -> u64 {
    DEFAULT_DB_CONNECT_TIMEOUT_SECS
}
fn default_db_idle_timeout_secs() -> u64 {
    DEFAULT_DB_IDLE_TIMEOUT_SECS
}
fn default_db_acquire_timeout_secs() -> u64 {
    DEFAULT_DB_ACQUIRE_TIMEOUT_SECS
}
fn default_event_buffer_size() -> usize {
    DEFAULT_EVENT_BUFFER_SIZE
}

impl AppConfig {
    /// Convenience constructor used by tests and embedding binaries.
    pub fn new(database_url: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            environment: environment.into(),
            log_level: default_log_level(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_statement_timeout_secs: None,
            event_buffer_size: default_event_buffer_size(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading error: {0}")]
    LoadError(#[from] ConfigError),

    #[error("Configuration validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Loads configuration from layered sources.
///
/// Precedence, lowest to highest: `config/default`, `config/{RUN_ENV}`,
/// environment variables prefixed with `APP__`.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder()
        .set_default("environment", run_env.clone())?
        .add_source(File::from(Path::new(CONFIG_DIR).join("default")).required(false))
        .add_source(File::from(Path::new(CONFIG_DIR).join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    // Bare DATABASE_URL wins over file-based settings, matching common
    // deployment tooling.
    if let Ok(url) = env::var("DATABASE_URL") {
        builder = builder.set_override("database_url", url)?;
    }

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;

    info!(
        environment = %config.environment,
        "configuration loaded"
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fills_defaults() {
        let cfg = AppConfig::new("sqlite::memory:", "test");
        assert_eq!(cfg.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
        assert_eq!(cfg.log_level, "info");
        assert!(!cfg.is_production());
    }

    #[test]
    fn validation_rejects_empty_database_url() {
        let cfg = AppConfig::new("", "test");
        assert!(cfg.validate().is_err());
    }
}
