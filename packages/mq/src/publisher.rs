use std::sync::Arc;

use async_trait::async_trait;
use common::worker::{Task, TaskQueue};
use tracing::debug;

use crate::error::MqError;
use crate::models::MqQueue;

/// [`TaskQueue`] publishing attachment tasks onto a broccoli queue.
#[derive(Clone)]
pub struct MqTaskQueue {
    mq: Arc<MqQueue>,
    queue_name: String,
}

impl MqTaskQueue {
    pub fn new(mq: Arc<MqQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            mq,
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

#[async_trait]
impl TaskQueue for MqTaskQueue {
    async fn enqueue(&self, task: Task) -> anyhow::Result<()> {
        debug!(
            queue = %self.queue_name,
            task_id = %task.id,
            task_type = %task.task_type,
            "Publishing task"
        );
        self.mq
            .publish(&self.queue_name, None, &task, None)
            .await
            .map_err(|e| MqError::Publish {
                queue: self.queue_name.clone(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
