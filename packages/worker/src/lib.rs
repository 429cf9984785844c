pub mod config;
pub mod error;
pub mod handlers;

pub use config::{WorkerAppConfig, WorkerConfig};
pub use error::{Result, WorkerError};
