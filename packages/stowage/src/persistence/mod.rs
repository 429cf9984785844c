//! Storage of attachment rows.

mod memory;
mod sea;

pub use memory::MemoryRepository;
pub use sea::SeaOrmRepository;

use async_trait::async_trait;
use common::UploadedFile;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

use crate::attachment::{Attachment, OwnerRef};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Corrupt attachment row: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// One row mutation of a commit.
#[derive(Debug, Clone)]
pub enum RowOp {
    Insert(Attachment),
    Update(Attachment),
    Delete(Uuid),
    /// Clear the owner reference, keeping the row.
    Nullify(Uuid),
}

/// Persistence collaborator for attachment rows, keyed by
/// `(owner_type, owner_id, name)`.
#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<Attachment>, RepositoryError>;

    /// Rows of one owner's slot, oldest first.
    async fn find_by_slot(
        &self,
        owner: &OwnerRef,
        name: &str,
    ) -> Result<Vec<Attachment>, RepositoryError>;

    /// Rows of one slot for many owners of a type, in a single query.
    async fn find_by_owners(
        &self,
        owner_type: &str,
        owner_ids: &[String],
        name: &str,
    ) -> Result<Vec<Attachment>, RepositoryError>;

    /// Apply all operations atomically: either every one lands or none does.
    async fn apply(&self, ops: Vec<RowOp>) -> Result<(), RepositoryError>;

    /// Delete one row. Returns `false` if it did not exist.
    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError>;

    /// Replace the row's file with `new` only if it still holds `expected`.
    async fn compare_and_set_file(
        &self,
        id: Uuid,
        expected: &UploadedFile,
        new: &UploadedFile,
    ) -> Result<bool, RepositoryError>;
}
