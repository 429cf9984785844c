//! Not-yet-committed mutations of a slot.
//!
//! A host record holds at most one [`PendingChange`] per slot. Create and
//! delete variants are staged until the owner is saved; detach and purge
//! variants act as soon as they are built and never stay in the change map.

mod create;
mod delete;
mod detach;
mod purge;

pub use create::{CreateMany, CreateOne};
pub use delete::{DeleteMany, DeleteOne};
pub use detach::{DetachMany, DetachOne};
pub use purge::{PurgeMany, PurgeOne};

use crate::attacher::Attacher;
use crate::attachment::Attachment;
use crate::error::Result;
use crate::slots::Slot;

/// Outcome of asking a pending change to save.
#[derive(Debug)]
pub(crate) enum Staged {
    /// The slot's association should become exactly these attachments.
    Valid(Vec<Attachment>),
    /// Messages to record under the slot name; nothing may be committed.
    Invalid(Vec<String>),
}

#[derive(Debug, Clone)]
pub enum PendingChange {
    CreateOne(CreateOne),
    CreateMany(CreateMany),
    DeleteOne(DeleteOne),
    DeleteMany(DeleteMany),
    DetachOne(DetachOne),
    DetachMany(DetachMany),
    PurgeOne(PurgeOne),
    PurgeMany(PurgeMany),
}

impl PendingChange {
    pub fn name(&self) -> &str {
        match self {
            Self::CreateOne(c) => c.name(),
            Self::CreateMany(c) => c.name(),
            Self::DeleteOne(c) => c.name(),
            Self::DeleteMany(c) => c.name(),
            Self::DetachOne(c) => c.name(),
            Self::DetachMany(c) => c.name(),
            Self::PurgeOne(c) => c.name(),
            Self::PurgeMany(c) => c.name(),
        }
    }

    /// What a reader of the slot sees while this change is pending.
    pub fn attachments(&self) -> Vec<&Attachment> {
        match self {
            Self::CreateOne(c) => vec![c.attachment()],
            Self::CreateMany(c) => c.attachments().collect(),
            _ => Vec::new(),
        }
    }

    /// Uploads carried forward across plural reassignments.
    pub fn pending_uploads(&self) -> &[CreateOne] {
        match self {
            Self::CreateMany(c) => c.pending_uploads(),
            _ => &[],
        }
    }

    pub(crate) async fn save(&self, attacher: &Attacher, slot: &Slot) -> Result<Staged> {
        match self {
            Self::CreateOne(c) => c.save(attacher, slot).await,
            Self::CreateMany(c) => c.save(attacher, slot).await,
            // Everything else leaves the slot empty; destructive variants
            // have already removed their rows.
            _ => Ok(Staged::Valid(Vec::new())),
        }
    }
}
