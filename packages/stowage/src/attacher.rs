//! Save-time commit of pending changes and scheduling of file work.
//!
//! A save runs in two phases. [`Attacher::prepare`] asks every pending change
//! to save, validates the result and turns it into row operations without
//! touching the owner's change map. [`Attacher::finalize`] runs only after
//! those operations are durably applied: it clears the change map, caches the
//! new associations and schedules promotion of cached files and disposal of
//! released ones. A failed apply therefore leaves every pending change in
//! place for a retry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::{FileStorage, Task, TaskQueue, UploadedFile};
use tracing::{debug, info, instrument, warn};

use crate::attachment::{Attachable, Attachment, INVALID};
use crate::changes::{
    CreateMany, CreateOne, DeleteMany, DeleteOne, PendingChange, Staged,
};
use crate::error::{Errors, Result, StowageError};
use crate::jobs::{DestroyAttachment, JobOutcome, PromoteAttachment};
use crate::persistence::{AttachmentRepository, RowOp};
use crate::proxy::{Many, One};
use crate::record::HasAttachments;
use crate::signed::ReferenceCodec;
use crate::slots::{DependentPolicy, Slot, SlotKind};

const BLANK: &str = "can't be blank";

/// Row operations and follow-up work for one owner save.
#[derive(Debug, Default)]
pub struct CommitPlan {
    ops: Vec<RowOp>,
    slots: Vec<(String, Vec<Attachment>)>,
    disposals: Vec<DestroyAttachment>,
    leftovers: Vec<UploadedFile>,
}

impl CommitPlan {
    pub fn ops(&self) -> &[RowOp] {
        &self.ops
    }

    /// Hand the row operations to the caller's transaction.
    pub fn take_ops(&mut self) -> Vec<RowOp> {
        std::mem::take(&mut self.ops)
    }
}

/// Coordinates slots, storage, persistence and the optional task queue.
#[derive(Clone)]
pub struct Attacher {
    repository: Arc<dyn AttachmentRepository>,
    storage: Arc<dyn FileStorage>,
    codec: ReferenceCodec,
    queue: Option<Arc<dyn TaskQueue>>,
}

impl Attacher {
    pub fn new(
        repository: Arc<dyn AttachmentRepository>,
        storage: Arc<dyn FileStorage>,
        codec: ReferenceCodec,
    ) -> Self {
        Self {
            repository,
            storage,
            codec,
            queue: None,
        }
    }

    /// Run promotion and destruction through `queue` instead of inline.
    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn repository(&self) -> &dyn AttachmentRepository {
        self.repository.as_ref()
    }

    pub fn storage(&self) -> &dyn FileStorage {
        self.storage.as_ref()
    }

    pub fn codec(&self) -> &ReferenceCodec {
        &self.codec
    }

    pub fn has_queue(&self) -> bool {
        self.queue.is_some()
    }

    /// Proxy for singular slot `name`.
    pub fn one<'a, R: HasAttachments>(&'a self, record: &'a mut R, name: &str) -> Result<One<'a, R>> {
        let slot = R::slots().require(name, SlotKind::One)?;
        Ok(One::new(self, record, slot))
    }

    /// Proxy for plural slot `name`.
    pub fn many<'a, R: HasAttachments>(&'a self, record: &'a mut R, name: &str) -> Result<Many<'a, R>> {
        let slot = R::slots().require(name, SlotKind::Many)?;
        Ok(Many::new(self, record, slot))
    }

    /// Stage `value` for singular slot `name`. `None` or a blank value stages
    /// an unassignment.
    pub async fn set_one<R: HasAttachments>(
        &self,
        record: &mut R,
        name: &str,
        value: Option<Attachable>,
    ) -> Result<()> {
        let slot = R::slots().require(name, SlotKind::One)?;

        let change = match value.filter(|v| !v.is_blank()) {
            None => PendingChange::DeleteOne(DeleteOne::new(name)),
            Some(input) => {
                let candidates = self.candidates(record, slot).await?;
                let owner = record.owner_ref();
                PendingChange::CreateOne(
                    CreateOne::build(self, slot, owner, &candidates, input).await?,
                )
            }
        };

        debug!(slot = name, "Staged singular attachment change");
        record.attachment_state_mut().set_change(change);
        Ok(())
    }

    /// Stage `values` for plural slot `name`, replacing its whole list.
    ///
    /// Uploads from a superseded pending change are carried forward as
    /// pending uploads.
    pub async fn set_many<R: HasAttachments>(
        &self,
        record: &mut R,
        name: &str,
        values: Vec<Attachable>,
    ) -> Result<()> {
        let slot = R::slots().require(name, SlotKind::Many)?;
        let inputs: Vec<_> = values.into_iter().filter(|v| !v.is_blank()).collect();

        let change = if inputs.is_empty() {
            PendingChange::DeleteMany(DeleteMany::new(name))
        } else {
            let previous_uploads = record
                .attachment_state()
                .change(name)
                .map(|change| change.pending_uploads().to_vec())
                .unwrap_or_default();

            let mut candidates = self.candidates(record, slot).await?;
            candidates.extend(previous_uploads.iter().map(|c| c.attachment().clone()));

            let owner = record.owner_ref();
            PendingChange::CreateMany(
                CreateMany::build(self, slot, owner, &candidates, inputs, previous_uploads)
                    .await?,
            )
        };

        debug!(slot = name, "Staged plural attachment change");
        record.attachment_state_mut().set_change(change);
        Ok(())
    }

    /// Attachments a signed reference may resolve to: the persisted
    /// association plus whatever is pending for the slot.
    async fn candidates<R: HasAttachments>(&self, record: &mut R, slot: &Slot) -> Result<Vec<Attachment>> {
        let mut candidates = self.association(record, slot, false).await?;
        if let Some(change) = record.attachment_state().change(slot.name()) {
            candidates.extend(change.attachments().into_iter().cloned());
        }
        Ok(candidates)
    }

    /// Current value of slot `name`: the pending change's attachments if there
    /// is one, else the persisted association.
    pub async fn attachments<R: HasAttachments>(&self, record: &mut R, name: &str) -> Result<Vec<Attachment>> {
        let slot = R::slots().lookup(name)?;
        if let Some(change) = record.attachment_state().change(name) {
            return Ok(change.attachments().into_iter().cloned().collect());
        }
        self.association(record, slot, true).await
    }

    /// Cached association of `slot`, loading it on first use.
    async fn association<R: HasAttachments>(
        &self,
        record: &mut R,
        slot: &Slot,
        lazy: bool,
    ) -> Result<Vec<Attachment>> {
        let name = slot.name();
        if let Some(loaded) = record.attachment_state().loaded(name) {
            return Ok(loaded.to_vec());
        }
        let Some(owner) = record.owner_ref() else {
            return Ok(Vec::new());
        };
        if lazy && slot.is_strict_loading() {
            return Err(StowageError::StrictLoading(name.to_string()));
        }

        let rows = self.repository.find_by_slot(&owner, name).await?;
        record.attachment_state_mut().set_loaded(name, rows.clone());
        Ok(rows)
    }

    /// Load slot `name` for one record, replacing any cached association.
    pub async fn load<R: HasAttachments>(&self, record: &mut R, name: &str) -> Result<Vec<Attachment>> {
        let slot = R::slots().lookup(name)?;
        let rows = match record.owner_ref() {
            Some(owner) => self.repository.find_by_slot(&owner, slot.name()).await?,
            None => Vec::new(),
        };
        record.attachment_state_mut().set_loaded(name, rows.clone());
        Ok(rows)
    }

    /// Load slot `name` for all `records` with a single query.
    #[instrument(skip(self, records), fields(owner_type = R::owner_type(), records = records.len()))]
    pub async fn preload<R: HasAttachments>(&self, records: &mut [R], name: &str) -> Result<()> {
        let slot = R::slots().lookup(name)?;
        let owner_ids: Vec<String> = records.iter().filter_map(|r| r.owner_id()).collect();
        let rows = self
            .repository
            .find_by_owners(R::owner_type(), &owner_ids, slot.name())
            .await?;

        let mut by_owner: HashMap<String, Vec<Attachment>> = HashMap::new();
        for row in rows {
            if let Some(owner) = &row.owner {
                by_owner.entry(owner.owner_id.clone()).or_default().push(row);
            }
        }

        for record in records.iter_mut() {
            let rows = record
                .owner_id()
                .and_then(|id| by_owner.remove(&id))
                .unwrap_or_default();
            record.attachment_state_mut().set_loaded(name, rows);
        }
        Ok(())
    }

    /// Validation messages for a staged attachment of `slot`.
    pub(crate) async fn validate(&self, attachment: &Attachment, slot: &Slot) -> Result<Vec<String>> {
        let mut errors = attachment.assignment_errors.clone();

        match &attachment.file {
            None if errors.is_empty() => errors.push(BLANK.to_string()),
            None => {}
            Some(file) => {
                // Borrowed files may only point at bytes still in the cache tier.
                if attachment.unverified
                    && !(file.is_cached() && self.storage.exists(file).await?)
                {
                    errors.push(INVALID.to_string());
                }
                errors.extend(slot.uploader().validate(file));
            }
        }

        Ok(errors)
    }

    /// Commit every pending change of `record` as one unit.
    ///
    /// The owner row itself must already be persisted. On a validation
    /// failure the messages are recorded on the owner under each slot's name,
    /// nothing is written, and the pending changes stay in place.
    #[instrument(skip_all, fields(owner_type = R::owner_type(), owner_id = ?record.owner_id()))]
    pub async fn save<R: HasAttachments>(&self, record: &mut R) -> Result<()> {
        if !record.attachment_state().has_changes() {
            return Ok(());
        }
        let mut plan = self.prepare(record).await?;
        self.repository.apply(plan.take_ops()).await?;
        self.finalize(record, plan).await
    }

    /// First phase of a save: validate and plan row operations.
    pub async fn prepare<R: HasAttachments>(&self, record: &mut R) -> Result<CommitPlan> {
        let owner = record.owner_ref().ok_or(StowageError::OwnerNotPersisted)?;
        record.attachment_state_mut().errors_mut().clear();

        let slots: Vec<&'static Slot> = R::slots()
            .reflect_on_all_attachments()
            .iter()
            .filter(|slot| record.attachment_state().change(slot.name()).is_some())
            .collect();

        // Diff against the rows as stored now; a worker may have promoted
        // their files since the association was loaded.
        for slot in &slots {
            self.load(record, slot.name()).await?;
        }

        let mut errors = Errors::new();
        let mut staged = Vec::new();
        for slot in &slots {
            let Some(change) = record.attachment_state().change(slot.name()) else {
                continue;
            };
            match change.save(self, slot).await? {
                Staged::Valid(attachments) => staged.push((*slot, attachments)),
                Staged::Invalid(messages) => {
                    for message in messages {
                        errors.add(slot.name(), message);
                    }
                }
            }
        }

        if !errors.is_empty() {
            debug!(errors = %errors, "Attachment validation failed");
            record.attachment_state_mut().errors_mut().merge(&errors);
            return Err(StowageError::RecordInvalid(errors));
        }

        let mut plan = CommitPlan::default();
        for (slot, attachments) in staged {
            let previous = record
                .attachment_state()
                .loaded(slot.name())
                .unwrap_or_default()
                .to_vec();

            let mut next = Vec::with_capacity(attachments.len());
            for mut attachment in attachments {
                attachment.owner = Some(owner.clone());
                attachment.merge_owner_metadata();

                let stored = previous.iter().find(|p| p.id == attachment.id);
                // Reused rows never take a new file through assignment.
                if let Some(p) = stored {
                    attachment.file = p.file.clone();
                }

                match stored {
                    Some(p) if p.same_row(&attachment) => {}
                    Some(_) => {
                        attachment.updated_at = Utc::now();
                        plan.ops.push(RowOp::Update(attachment.clone()));
                    }
                    None if attachment.is_persisted() => {
                        attachment.updated_at = Utc::now();
                        plan.ops.push(RowOp::Update(attachment.clone()));
                    }
                    None => plan.ops.push(RowOp::Insert(attachment.clone())),
                }
                next.push(attachment);
            }

            for released in previous.iter().filter(|p| next.iter().all(|a| a.id != p.id)) {
                release(slot, released, &owner.owner_type, &mut plan);
            }

            if let Some(change) = record.attachment_state().change(slot.name()) {
                plan.leftovers.extend(
                    change
                        .pending_uploads()
                        .iter()
                        .map(CreateOne::attachment)
                        .filter(|a| next.iter().all(|n| n.id != a.id))
                        .filter_map(|a| a.file.clone())
                        .filter(UploadedFile::is_cached),
                );
            }

            plan.slots.push((slot.name().to_string(), next));
        }

        Ok(plan)
    }

    /// Second phase of a save, run once the plan's row operations are durable.
    pub async fn finalize<R: HasAttachments>(&self, record: &mut R, plan: CommitPlan) -> Result<()> {
        let CommitPlan {
            slots,
            disposals,
            leftovers,
            ..
        } = plan;

        let mut promotions = Vec::new();
        for (name, mut attachments) in slots {
            let uploader = R::slots().lookup(&name)?.uploader().name();
            for attachment in &mut attachments {
                attachment.mark_persisted();
                promotions.extend(PromoteAttachment::for_attachment(attachment, uploader));
            }

            let state = record.attachment_state_mut();
            state.take_change(&name);
            state.set_loaded(&name, attachments);
            info!(slot = %name, "Committed attachment change");
        }

        for file in &leftovers {
            warn!(key = %file.id, "Superseded upload left in cache tier");
        }

        for job in promotions {
            match &self.queue {
                Some(queue) => enqueue(queue.as_ref(), job.to_task()?).await?,
                None => {
                    if let JobOutcome::Promoted(file) =
                        job.perform(self.repository(), self.storage()).await?
                    {
                        let state = record.attachment_state_mut();
                        if let Some(attachment) = state
                            .loaded_mut(&job.name)
                            .and_then(|rows| rows.iter_mut().find(|a| a.id == job.attachment_id))
                        {
                            attachment.file = Some(file);
                        }
                    }
                }
            }
        }

        for job in disposals {
            self.dispose(job).await?;
        }

        Ok(())
    }

    /// Apply every slot's dependent policy for an owner about to be deleted,
    /// then forget its attachment state.
    #[instrument(skip_all, fields(owner_type = R::owner_type(), owner_id = ?record.owner_id()))]
    pub async fn destroy_owner<R: HasAttachments>(&self, record: &mut R) -> Result<()> {
        let Some(owner) = record.owner_ref() else {
            record.attachment_state_mut().reload();
            return Ok(());
        };

        let mut plan = CommitPlan::default();
        for slot in R::slots().reflect_on_all_attachments() {
            for row in self.repository.find_by_slot(&owner, slot.name()).await? {
                release(slot, &row, &owner.owner_type, &mut plan);
            }
        }

        self.repository.apply(plan.take_ops()).await?;
        record.attachment_state_mut().reload();
        info!("Released attachments of destroyed owner");

        for job in plan.disposals {
            self.dispose(job).await?;
        }
        Ok(())
    }

    pub(crate) fn require_queue(&self) -> Result<&dyn TaskQueue> {
        self.queue
            .as_deref()
            .ok_or(StowageError::BackgroundingNotConfigured)
    }

    /// Delete an attachment's row, leaving its stored file.
    pub(crate) async fn delete_attachment(&self, attachment: &mut Attachment) -> Result<()> {
        if attachment.is_persisted() {
            self.repository.delete(attachment.id).await?;
            info!(attachment_id = %attachment.id, slot = %attachment.name, "Deleted attachment row");
        }
        attachment.mark_destroyed();
        Ok(())
    }

    /// Replace a persisted attachment's file with the one its row holds now.
    async fn refresh_file(&self, attachment: &mut Attachment) -> Result<()> {
        if !attachment.is_persisted() {
            return Ok(());
        }
        if let Some(row) = self.repository.find(attachment.id).await? {
            attachment.file = row.file;
        }
        Ok(())
    }

    /// Delete an attachment's stored file, then its row.
    pub async fn purge_attachment(&self, attachment: &mut Attachment) -> Result<()> {
        self.refresh_file(attachment).await?;
        if let Some(file) = attachment.file.as_ref().filter(|_| !attachment.skip_file_destroy) {
            self.storage.delete(file).await?;
        }
        self.delete_attachment(attachment).await
    }

    /// Delete an attachment's row now and its stored file in the background.
    pub async fn purge_attachment_later(&self, attachment: &mut Attachment) -> Result<()> {
        let queue = self.require_queue()?;
        self.refresh_file(attachment).await?;
        if let Some(file) = &attachment.file {
            let owner_type = attachment
                .owner
                .as_ref()
                .map(|o| o.owner_type.as_str())
                .unwrap_or_default();
            let job = DestroyAttachment::new(attachment.uploader_name(), owner_type, file.clone());
            enqueue(queue, job.to_task()?).await?;
            attachment.skip_file_destroy = true;
        }
        self.purge_attachment(attachment).await
    }

    async fn dispose(&self, job: DestroyAttachment) -> Result<()> {
        match &self.queue {
            Some(queue) => enqueue(queue.as_ref(), job.to_task()?).await,
            None => job.perform(self.storage()).await.map(|_| ()),
        }
    }

    pub(crate) fn reset<R: HasAttachments>(&self, record: &mut R, name: &str) {
        let state = record.attachment_state_mut();
        state.take_change(name);
        state.unload(name);
    }
}

/// Queue the effect of `slot`'s dependent policy on a row leaving it.
fn release(slot: &Slot, row: &Attachment, owner_type: &str, plan: &mut CommitPlan) {
    match slot.dependent() {
        DependentPolicy::Destroy => {
            plan.ops.push(RowOp::Delete(row.id));
            if let Some(file) = &row.file {
                plan.disposals.push(DestroyAttachment::new(
                    slot.uploader().name(),
                    owner_type,
                    file.clone(),
                ));
            }
        }
        DependentPolicy::Delete => plan.ops.push(RowOp::Delete(row.id)),
        DependentPolicy::Nullify => plan.ops.push(RowOp::Nullify(row.id)),
    }
}

async fn enqueue(queue: &dyn TaskQueue, task: Task) -> Result<()> {
    debug!(task_id = %task.id, task_type = %task.task_type, "Enqueueing attachment task");
    queue
        .enqueue(task)
        .await
        .map_err(|e| StowageError::Queue(e.to_string()))
}
