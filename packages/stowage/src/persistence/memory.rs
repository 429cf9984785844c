use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use common::UploadedFile;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AttachmentRepository, RepositoryError, RowOp};
use crate::attachment::{Attachment, OwnerRef};

/// In-process repository. Rows are keyed by their time-ordered ids, so
/// iteration order is creation order.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    rows: Mutex<BTreeMap<Uuid, Attachment>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }

    pub async fn all(&self) -> Vec<Attachment> {
        self.rows.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl AttachmentRepository for MemoryRepository {
    async fn find(&self, id: Uuid) -> Result<Option<Attachment>, RepositoryError> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn find_by_slot(
        &self,
        owner: &OwnerRef,
        name: &str,
    ) -> Result<Vec<Attachment>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter(|row| row.name == name && row.owner.as_ref() == Some(owner))
            .cloned()
            .collect())
    }

    async fn find_by_owners(
        &self,
        owner_type: &str,
        owner_ids: &[String],
        name: &str,
    ) -> Result<Vec<Attachment>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter(|row| row.name == name)
            .filter(|row| {
                row.owner.as_ref().is_some_and(|owner| {
                    owner.owner_type == owner_type && owner_ids.contains(&owner.owner_id)
                })
            })
            .cloned()
            .collect())
    }

    async fn apply(&self, ops: Vec<RowOp>) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().await;
        // Work on a copy and swap it in only if every operation succeeds.
        let mut next = rows.clone();

        for op in ops {
            match op {
                RowOp::Insert(attachment) => {
                    if next.contains_key(&attachment.id) {
                        return Err(RepositoryError::Conflict(format!(
                            "attachment {} already exists",
                            attachment.id
                        )));
                    }
                    next.insert(attachment.id, attachment.stored());
                }
                RowOp::Update(attachment) => {
                    let Some(row) = next.get_mut(&attachment.id) else {
                        return Err(RepositoryError::Conflict(format!(
                            "attachment {} no longer exists",
                            attachment.id
                        )));
                    };
                    *row = attachment.stored();
                }
                RowOp::Delete(id) => {
                    next.remove(&id);
                }
                RowOp::Nullify(id) => {
                    if let Some(row) = next.get_mut(&id) {
                        row.owner = None;
                        row.updated_at = Utc::now();
                    }
                }
            }
        }

        *rows = next;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.rows.lock().await.remove(&id).is_some())
    }

    async fn compare_and_set_file(
        &self,
        id: Uuid,
        expected: &UploadedFile,
        new: &UploadedFile,
    ) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock().await;
        match rows.get_mut(&id) {
            Some(row) if row.file.as_ref() == Some(expected) => {
                row.file = Some(new.clone());
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
