use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Task error: {0}")]
    Task(#[from] stowage::StowageError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
