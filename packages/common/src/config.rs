use std::path::PathBuf;

use serde::Deserialize;

/// App-level MQ configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Whether background jobs go through MQ. Default: true.
    /// When disabled, promotion and cascade destruction run inline and
    /// `purge_later` is unavailable.
    #[serde(default = "default_mq_enabled")]
    pub enabled: bool,
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Queue carrying promote/destroy tasks. Default: "attachment_jobs".
    #[serde(default = "default_mq_queue_name")]
    pub queue_name: String,
}

fn default_mq_enabled() -> bool {
    true
}
fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_mq_queue_name() -> String {
    "attachment_jobs".into()
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            enabled: default_mq_enabled(),
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            queue_name: default_mq_queue_name(),
        }
    }
}

/// File storage configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory holding the `cache` and `store` tiers. Default: "./storage".
    #[serde(default = "default_storage_base_path")]
    pub base_path: PathBuf,
    /// Largest accepted upload in bytes. Default: 128 MiB.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_storage_base_path() -> PathBuf {
    PathBuf::from("./storage")
}
fn default_max_file_size() -> u64 {
    128 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_storage_base_path(),
            max_file_size: default_max_file_size(),
        }
    }
}
