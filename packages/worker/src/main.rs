use std::sync::Arc;

use anyhow::Context;
use common::storage::FilesystemStorage;
use common::{FileStorage, Task};
use mq::{BroccoliError, BrokerMessage, MqConfig, init_mq};
use stowage::{AttachmentRepository, SeaOrmRepository};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use worker::WorkerAppConfig;
use worker::handlers::attachment::handle_attachment_task;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = WorkerAppConfig::load().context("Failed to load config")?;
    info!(worker_id = %config.worker.id, "Worker starting");

    let db = stowage::database::init_db(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    let repository: Arc<dyn AttachmentRepository> = Arc::new(SeaOrmRepository::new(db));

    let storage: Arc<dyn FileStorage> = Arc::new(
        FilesystemStorage::new(config.storage.base_path.clone(), config.storage.max_file_size)
            .await
            .context("Failed to initialize storage")?,
    );

    let mq = init_mq(MqConfig::from(&config.mq))
        .await
        .context("Failed to initialize MQ")?;

    info!(
        queue_name = %config.mq.queue_name,
        concurrency = config.worker.concurrency,
        "MQ connected"
    );

    let result = mq
        .process_messages(
            &config.mq.queue_name,
            Some(config.worker.concurrency),
            None,
            move |message: BrokerMessage<Task>| {
                let repository = Arc::clone(&repository);
                let storage = Arc::clone(&storage);
                async move {
                    handle_attachment_task(&message.payload, repository.as_ref(), storage.as_ref())
                        .await
                        .map(|_| ())
                        .map_err(|e| {
                            error!(task_id = %message.payload.id, error = %e, "Attachment task failed");
                            BroccoliError::Job(e.to_string())
                        })
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Worker stopped unexpectedly");
    }

    Ok(())
}
