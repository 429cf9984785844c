use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unit of background work published to the attachment queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

impl Task {
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            task_type: task_type.into(),
            payload,
            enqueued_at: Utc::now(),
        }
    }
}

/// Asynchronous task queue collaborator.
///
/// Delivery is at-least-once; consumers are responsible for idempotent effects.
/// An enqueued task cannot be withdrawn.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: Task) -> Result<()>;
}
