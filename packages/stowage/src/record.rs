use std::collections::HashMap;

use crate::attachment::{Attachment, OwnerRef};
use crate::changes::PendingChange;
use crate::error::Errors;
use crate::slots::SlotSet;

/// Per-instance attachment bookkeeping a host record carries.
///
/// Holds at most one pending change per slot, the slot associations loaded
/// so far, and the field errors from the last failed save.
#[derive(Debug, Clone, Default)]
pub struct AttachmentState {
    changes: HashMap<String, PendingChange>,
    loaded: HashMap<String, Vec<Attachment>>,
    errors: Errors,
}

impl AttachmentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn change(&self, name: &str) -> Option<&PendingChange> {
        self.changes.get(name)
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Whether any slot other than `name` has a pending change.
    pub fn has_changes_besides(&self, name: &str) -> bool {
        self.changes.keys().any(|slot| slot != name)
    }

    pub fn loaded(&self, name: &str) -> Option<&[Attachment]> {
        self.loaded.get(name).map(Vec::as_slice)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
    }

    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    /// Forget pending changes and cached associations, as after re-reading
    /// the owner from the database.
    pub fn reload(&mut self) {
        self.changes.clear();
        self.loaded.clear();
        self.errors.clear();
    }

    /// Install `change` for its slot, returning whatever it replaced.
    pub(crate) fn set_change(&mut self, change: PendingChange) -> Option<PendingChange> {
        self.changes.insert(change.name().to_string(), change)
    }

    pub(crate) fn take_change(&mut self, name: &str) -> Option<PendingChange> {
        self.changes.remove(name)
    }

    pub(crate) fn restore_change(&mut self, name: &str, previous: Option<PendingChange>) {
        match previous {
            Some(change) => {
                self.changes.insert(name.to_string(), change);
            }
            None => {
                self.changes.remove(name);
            }
        }
    }

    pub(crate) fn set_loaded(&mut self, name: &str, attachments: Vec<Attachment>) {
        self.loaded.insert(name.to_string(), attachments);
    }

    /// Drop the cached association so the next read goes to the repository.
    pub(crate) fn unload(&mut self, name: &str) {
        self.loaded.remove(name);
    }

    pub(crate) fn loaded_mut(&mut self, name: &str) -> Option<&mut Vec<Attachment>> {
        self.loaded.get_mut(name)
    }

    pub(crate) fn errors_mut(&mut self) -> &mut Errors {
        &mut self.errors
    }
}

/// Contract a host record type fulfils to own attachment slots.
///
/// ```ignore
/// static SLOTS: LazyLock<SlotSet> = LazyLock::new(|| {
///     SlotSet::new().has_one_attached("avatar", SlotOptions::new())
/// });
///
/// impl HasAttachments for User {
///     fn owner_type() -> &'static str { "User" }
///     fn slots() -> &'static SlotSet { &SLOTS }
///     fn owner_id(&self) -> Option<String> { self.id.map(|id| id.to_string()) }
///     fn attachment_state(&self) -> &AttachmentState { &self.attachments }
///     fn attachment_state_mut(&mut self) -> &mut AttachmentState { &mut self.attachments }
/// }
/// ```
pub trait HasAttachments: Send {
    /// Type name stored in attachment rows' `owner_type` column.
    fn owner_type() -> &'static str;

    fn slots() -> &'static SlotSet;

    /// Primary key of the owner, `None` until it has been persisted.
    fn owner_id(&self) -> Option<String>;

    /// Whether the owner has unsaved changes of its own.
    fn is_changed(&self) -> bool {
        false
    }

    fn attachment_state(&self) -> &AttachmentState;

    fn attachment_state_mut(&mut self) -> &mut AttachmentState;

    fn owner_ref(&self) -> Option<OwnerRef> {
        self.owner_id()
            .map(|id| OwnerRef::new(Self::owner_type(), id))
    }

    fn is_persisted(&self) -> bool {
        self.owner_id().is_some()
    }

    /// Field errors from the last failed attachment save.
    fn errors(&self) -> &Errors {
        self.attachment_state().errors()
    }
}
