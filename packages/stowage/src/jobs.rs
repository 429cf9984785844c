//! Background promotion and destruction of stored files.
//!
//! Both jobs are safe to run more than once and in any order. A promotion
//! only takes effect while the attachment row still holds exactly the file
//! the job was created for; everything else is a silent no-op.

use std::fmt;

use common::{FileStorage, StorageError, StorageTier, Task, UploadedFile};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::attachment::{Attachment, OwnerRef};
use crate::error::{Result, StowageError};
use crate::persistence::AttachmentRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The attachment row no longer exists.
    AttachmentMissing,
    /// The row was moved to another owner or nullified.
    OwnerChanged,
    /// The row now holds a different file than the job was given.
    AttachmentChanged,
    /// The cached bytes are gone.
    FileMissing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::AttachmentMissing => "attachment no longer exists",
            Self::OwnerChanged => "attachment owner changed",
            Self::AttachmentChanged => "attachment file changed",
            Self::FileMissing => "cached file is missing",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Promoted(UploadedFile),
    Destroyed { existed: bool },
    Skipped(SkipReason),
}

/// Move an attachment's file from the cache tier to the store tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoteAttachment {
    /// Uploader name of the slot.
    pub attacher: String,
    pub attachment_type: String,
    pub attachment_id: Uuid,
    pub owner_type: String,
    pub owner_id: String,
    pub name: String,
    /// File the row held when the job was created.
    pub file: UploadedFile,
}

impl PromoteAttachment {
    pub const TASK_TYPE: &'static str = "promote_attachment";

    /// Job for a committed attachment whose file is still cached.
    pub fn for_attachment(attachment: &Attachment, attacher: &str) -> Option<Self> {
        let file = attachment.file.as_ref().filter(|f| f.is_cached())?;
        let owner = attachment.owner.as_ref()?;
        Some(Self {
            attacher: attacher.to_string(),
            attachment_type: attachment.attachment_type.clone(),
            attachment_id: attachment.id,
            owner_type: owner.owner_type.clone(),
            owner_id: owner.owner_id.clone(),
            name: attachment.name.clone(),
            file: file.clone(),
        })
    }

    pub fn to_task(&self) -> Result<Task> {
        Ok(Task::new(Self::TASK_TYPE, serde_json::to_value(self)?))
    }

    #[instrument(skip_all, fields(attachment_id = %self.attachment_id, slot = %self.name))]
    pub async fn perform(
        &self,
        repository: &dyn AttachmentRepository,
        storage: &dyn FileStorage,
    ) -> Result<JobOutcome> {
        let Some(row) = repository.find(self.attachment_id).await? else {
            debug!("Attachment gone, nothing to promote");
            return Ok(JobOutcome::Skipped(SkipReason::AttachmentMissing));
        };

        let owner = OwnerRef::new(self.owner_type.as_str(), self.owner_id.as_str());
        if row.owner.as_ref() != Some(&owner) || row.name != self.name {
            debug!("Attachment no longer belongs to this slot");
            return Ok(JobOutcome::Skipped(SkipReason::OwnerChanged));
        }

        if row.file.as_ref() != Some(&self.file) {
            warn!(key = %self.file.id, "Attachment changed since promotion was scheduled");
            return Ok(JobOutcome::Skipped(SkipReason::AttachmentChanged));
        }

        let promoted = match storage.copy_to(&self.file, StorageTier::Store).await {
            Ok(file) => file,
            Err(StorageError::NotFound(key)) => {
                warn!(key = %key, "Cached file missing, cannot promote");
                return Ok(JobOutcome::Skipped(SkipReason::FileMissing));
            }
            Err(e) => return Err(e.into()),
        };

        if repository
            .compare_and_set_file(self.attachment_id, &self.file, &promoted)
            .await?
        {
            if let Err(e) = storage.delete(&self.file).await {
                warn!(error = %e, key = %self.file.id, "Failed to remove cached copy");
            }
            info!(key = %promoted.id, "Promoted attachment");
            Ok(JobOutcome::Promoted(promoted))
        } else {
            // Lost the race to a newer upload; drop our copy.
            storage.delete(&promoted).await?;
            warn!(key = %self.file.id, "Attachment changed during promotion");
            Ok(JobOutcome::Skipped(SkipReason::AttachmentChanged))
        }
    }
}

/// Delete a stored file whose row is gone or going.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyAttachment {
    pub attacher: String,
    pub owner_type: String,
    pub file: UploadedFile,
}

impl DestroyAttachment {
    pub const TASK_TYPE: &'static str = "destroy_attachment";

    pub fn new(attacher: &str, owner_type: &str, file: UploadedFile) -> Self {
        Self {
            attacher: attacher.to_string(),
            owner_type: owner_type.to_string(),
            file,
        }
    }

    pub fn to_task(&self) -> Result<Task> {
        Ok(Task::new(Self::TASK_TYPE, serde_json::to_value(self)?))
    }

    #[instrument(skip_all, fields(key = %self.file.id, tier = %self.file.storage))]
    pub async fn perform(&self, storage: &dyn FileStorage) -> Result<JobOutcome> {
        let existed = storage.delete(&self.file).await?;
        if existed {
            info!("Destroyed stored file");
        } else {
            debug!("Stored file already gone");
        }
        Ok(JobOutcome::Destroyed { existed })
    }
}

/// Run a queue task by its `task_type`.
pub async fn perform_task(
    task: &Task,
    repository: &dyn AttachmentRepository,
    storage: &dyn FileStorage,
) -> Result<JobOutcome> {
    match task.task_type.as_str() {
        PromoteAttachment::TASK_TYPE => {
            let job: PromoteAttachment = serde_json::from_value(task.payload.clone())?;
            job.perform(repository, storage).await
        }
        DestroyAttachment::TASK_TYPE => {
            let job: DestroyAttachment = serde_json::from_value(task.payload.clone())?;
            job.perform(storage).await
        }
        other => Err(StowageError::Queue(format!("unknown task type '{other}'"))),
    }
}
