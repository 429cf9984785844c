use common::config::{MqAppConfig, StorageConfig};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

/// Default namespace that scopes the signing key for attachment references.
pub const DEFAULT_SIGNING_NAMESPACE: &str = "attachment-reference";

/// Secret material for signed attachment references.
#[derive(Debug, Deserialize, Clone)]
pub struct SigningConfig {
    pub secret: String,
    #[serde(default = "default_signing_namespace")]
    pub namespace: String,
}

fn default_signing_namespace() -> String {
    DEFAULT_SIGNING_NAMESPACE.into()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StowageConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    pub signing: SigningConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    pub database: Option<DatabaseConfig>,
}

/// Builder preloaded with defaults, the optional config file and `STOWAGE__*`
/// environment overrides. Binaries add their own defaults on top.
pub fn config_builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let config_path =
        std::env::var("STOWAGE_CONFIG").unwrap_or_else(|_| "config/config".to_string());

    Ok(Config::builder()
        .set_default("storage.base_path", "./storage")?
        .set_default("storage.max_file_size", 128_i64 * 1024 * 1024)?
        .set_default("signing.namespace", DEFAULT_SIGNING_NAMESPACE)?
        .set_default("mq.enabled", true)?
        .set_default("mq.url", "redis://localhost:6379")?
        .set_default("mq.pool_size", 5_i64)?
        .set_default("mq.queue_name", "attachment_jobs")?
        // Load from config/config.toml
        .add_source(File::with_name(&config_path).required(false))
        // Override from environment (e.g., STOWAGE__SIGNING__SECRET)
        .add_source(Environment::with_prefix("STOWAGE").separator("__")))
}

impl StowageConfig {
    pub fn load() -> Result<Self, ConfigError> {
        config_builder()?.build()?.try_deserialize()
    }
}
