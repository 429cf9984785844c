//! Per-slot facades over "pending change, else persisted association".

use crate::attacher::Attacher;
use crate::attachment::{Attachable, Attachment};
use crate::changes::{DetachMany, DetachOne, PendingChange, PurgeMany, PurgeOne};
use crate::error::{Result, StowageError};
use crate::record::HasAttachments;
use crate::slots::Slot;

enum Assign {
    One(Attachable),
    Many(Vec<Attachable>),
}

/// Stage `value` on the record, then save right away if the owner is
/// persisted and otherwise clean. A failed save restores the slot's previous
/// pending change and reports `false`; the errors stay on the owner.
async fn attach_and_save<R: HasAttachments>(
    attacher: &Attacher,
    record: &mut R,
    slot: &Slot,
    value: Assign,
) -> Result<bool> {
    let name = slot.name();
    let dirty = record.is_changed() || record.attachment_state().has_changes_besides(name);
    let previous: Option<PendingChange> = record.attachment_state().change(name).cloned();

    match value {
        Assign::One(input) => attacher.set_one(record, name, Some(input)).await?,
        Assign::Many(inputs) => attacher.set_many(record, name, inputs).await?,
    }

    if !record.is_persisted() || dirty {
        return Ok(true);
    }

    match attacher.save(record).await {
        Ok(()) => Ok(true),
        Err(e) => {
            record.attachment_state_mut().restore_change(name, previous);
            match e {
                StowageError::RecordInvalid(_) => Ok(false),
                other => Err(other),
            }
        }
    }
}

/// Singular slot proxy.
pub struct One<'a, R> {
    attacher: &'a Attacher,
    record: &'a mut R,
    slot: &'static Slot,
}

impl<'a, R: HasAttachments> One<'a, R> {
    pub(crate) fn new(attacher: &'a Attacher, record: &'a mut R, slot: &'static Slot) -> Self {
        Self {
            attacher,
            record,
            slot,
        }
    }

    pub fn name(&self) -> &str {
        self.slot.name()
    }

    pub fn slot(&self) -> &Slot {
        self.slot
    }

    pub async fn attachment(&mut self) -> Result<Option<Attachment>> {
        Ok(self
            .attacher
            .attachments(self.record, self.slot.name())
            .await?
            .into_iter()
            .next())
    }

    pub async fn is_attached(&mut self) -> Result<bool> {
        Ok(self.attachment().await?.is_some())
    }

    pub async fn is_blank(&mut self) -> Result<bool> {
        Ok(!self.is_attached().await?)
    }

    /// Assign `input`, committing immediately when the owner is persisted and
    /// has nothing else unsaved. Returns `false` if that commit was rejected.
    pub async fn attach(&mut self, input: impl Into<Attachable>) -> Result<bool> {
        attach_and_save(self.attacher, self.record, self.slot, Assign::One(input.into())).await
    }

    /// Delete the association row now, keeping the stored file.
    pub async fn detach(&mut self) -> Result<()> {
        let current = self.attachment().await?;
        DetachOne::new(self.slot.name(), current)
            .detach(self.attacher)
            .await?;
        self.attacher.reset(self.record, self.slot.name());
        Ok(())
    }

    /// Delete the stored file, then the association row.
    pub async fn purge(&mut self) -> Result<()> {
        let current = self.attachment().await?;
        PurgeOne::new(self.slot.name(), current)
            .purge(self.attacher)
            .await?;
        self.attacher.reset(self.record, self.slot.name());
        Ok(())
    }

    /// Delete the association row now and the stored file in the background.
    pub async fn purge_later(&mut self) -> Result<()> {
        self.attacher.require_queue()?;
        let current = self.attachment().await?;
        PurgeOne::new(self.slot.name(), current)
            .purge_later(self.attacher)
            .await?;
        self.attacher.reset(self.record, self.slot.name());
        Ok(())
    }
}

/// Plural slot proxy.
pub struct Many<'a, R> {
    attacher: &'a Attacher,
    record: &'a mut R,
    slot: &'static Slot,
}

impl<'a, R: HasAttachments> Many<'a, R> {
    pub(crate) fn new(attacher: &'a Attacher, record: &'a mut R, slot: &'static Slot) -> Self {
        Self {
            attacher,
            record,
            slot,
        }
    }

    pub fn name(&self) -> &str {
        self.slot.name()
    }

    pub fn slot(&self) -> &Slot {
        self.slot
    }

    pub async fn attachments(&mut self) -> Result<Vec<Attachment>> {
        self.attacher.attachments(self.record, self.slot.name()).await
    }

    pub async fn is_attached(&mut self) -> Result<bool> {
        Ok(!self.attachments().await?.is_empty())
    }

    pub async fn is_blank(&mut self) -> Result<bool> {
        Ok(!self.is_attached().await?)
    }

    /// Append `inputs` to the slot's current attachments, committing
    /// immediately when the owner is persisted and otherwise clean.
    pub async fn attach<I>(&mut self, inputs: I) -> Result<bool>
    where
        I: IntoIterator,
        I::Item: Into<Attachable>,
    {
        let mut values = Vec::new();
        for attachment in self.attachments().await? {
            values.push(Attachable::Reference(attachment.signed_id(self.attacher.codec())?));
        }
        values.extend(inputs.into_iter().map(Into::into));

        attach_and_save(self.attacher, self.record, self.slot, Assign::Many(values)).await
    }

    /// Delete every association row now, keeping stored files.
    pub async fn detach(&mut self) -> Result<()> {
        let current = self.attachments().await?;
        DetachMany::new(self.slot.name(), current)
            .detach(self.attacher)
            .await?;
        self.attacher.reset(self.record, self.slot.name());
        Ok(())
    }

    pub async fn purge(&mut self) -> Result<()> {
        let current = self.attachments().await?;
        PurgeMany::new(self.slot.name(), current)
            .purge(self.attacher)
            .await?;
        self.attacher.reset(self.record, self.slot.name());
        Ok(())
    }

    pub async fn purge_later(&mut self) -> Result<()> {
        self.attacher.require_queue()?;
        let current = self.attachments().await?;
        PurgeMany::new(self.slot.name(), current)
            .purge_later(self.attacher)
            .await?;
        self.attacher.reset(self.record, self.slot.name());
        Ok(())
    }
}
