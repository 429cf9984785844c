pub mod error;
pub mod models;
pub mod publisher;

pub use models::{BroccoliError, BrokerMessage, MqConfig, MqQueue, init_mq};
pub use publisher::MqTaskQueue;
