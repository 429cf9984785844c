use common::{FileStorage, Task};
use stowage::{AttachmentRepository, DestroyAttachment, JobOutcome, PromoteAttachment, perform_task};
use tracing::{info, instrument, warn};

use crate::error::Result;

/// Run one attachment task. Unknown task types are skipped so a shared queue
/// can carry work for other consumers.
#[instrument(skip_all, fields(task_id = %task.id, task_type = %task.task_type))]
pub async fn handle_attachment_task(
    task: &Task,
    repository: &dyn AttachmentRepository,
    storage: &dyn FileStorage,
) -> Result<Option<JobOutcome>> {
    match task.task_type.as_str() {
        PromoteAttachment::TASK_TYPE | DestroyAttachment::TASK_TYPE => {}
        _ => {
            warn!("Unknown task type, skipping");
            return Ok(None);
        }
    }

    let outcome = perform_task(task, repository, storage).await?;
    match &outcome {
        JobOutcome::Promoted(file) => info!(key = %file.id, "Attachment promoted"),
        JobOutcome::Destroyed { existed } => info!(existed, "Attachment file destroyed"),
        JobOutcome::Skipped(reason) => info!(%reason, "Task skipped"),
    }
    Ok(Some(outcome))
}
