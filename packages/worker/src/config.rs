use config::ConfigError;
use serde::Deserialize;

pub use common::config::{MqAppConfig, StorageConfig};
pub use stowage::config::DatabaseConfig;

/// Worker-specific configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    /// Unique identifier for this worker instance. Default: "worker-1".
    #[serde(default = "default_worker_id")]
    pub id: String,
    /// Number of tasks processed concurrently. Default: 4.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_worker_id() -> String {
    "worker-1".into()
}
fn default_concurrency() -> usize {
    4
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            id: default_worker_id(),
            concurrency: default_concurrency(),
        }
    }
}

/// Worker application configuration. Shares the config file and `STOWAGE__*`
/// environment with the library; the signing secret is not needed here.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerAppConfig {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    pub database: DatabaseConfig,
}

impl WorkerAppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        stowage::config::config_builder()?
            .set_default("worker.id", "worker-1")?
            .set_default("worker.concurrency", 4_i64)?
            .build()?
            .try_deserialize()
    }
}
