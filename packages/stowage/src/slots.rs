use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StowageError};
use crate::uploader::{BasicUploader, Uploader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    One,
    Many,
}

impl SlotKind {
    pub fn macro_name(&self) -> &'static str {
        match self {
            Self::One => "has_one_attached",
            Self::Many => "has_many_attached",
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.macro_name())
    }
}

/// What happens to attachment rows when their owner is destroyed or when they
/// drop out of the slot's association on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependentPolicy {
    /// Delete the row and dispose of the stored file.
    #[default]
    Destroy,
    /// Delete the row, leave the stored file.
    Delete,
    /// Clear the row's owner reference, keep row and file.
    Nullify,
}

#[derive(Debug, Clone)]
pub struct SlotOptions {
    uploader: Arc<dyn Uploader>,
    dependent: DependentPolicy,
    strict_loading: bool,
}

impl SlotOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploader(mut self, uploader: impl Uploader + 'static) -> Self {
        self.uploader = Arc::new(uploader);
        self
    }

    pub fn dependent(mut self, dependent: DependentPolicy) -> Self {
        self.dependent = dependent;
        self
    }

    pub fn strict_loading(mut self, strict: bool) -> Self {
        self.strict_loading = strict;
        self
    }
}

impl Default for SlotOptions {
    fn default() -> Self {
        Self {
            uploader: Arc::new(BasicUploader::default()),
            dependent: DependentPolicy::default(),
            strict_loading: false,
        }
    }
}

/// A named attachment point declared on a host record type.
#[derive(Debug, Clone)]
pub struct Slot {
    name: String,
    kind: SlotKind,
    uploader: Arc<dyn Uploader>,
    dependent: DependentPolicy,
    strict_loading: bool,
}

impl Slot {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    pub fn uploader(&self) -> &dyn Uploader {
        self.uploader.as_ref()
    }

    pub fn dependent(&self) -> DependentPolicy {
        self.dependent
    }

    pub fn is_strict_loading(&self) -> bool {
        self.strict_loading
    }
}

/// Slots declared on one host record type, in declaration order.
///
/// ```
/// use stowage::{BasicUploader, SlotOptions, SlotSet};
///
/// let slots = SlotSet::new()
///     .has_one_attached("avatar", SlotOptions::new().uploader(BasicUploader::new("Image")))
///     .has_many_attached("photos", SlotOptions::new());
///
/// assert_eq!(slots.reflect_on_all_attachments().len(), 2);
/// assert_eq!(slots.reflect_on_attachment("avatar").unwrap().uploader().name(), "Image");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SlotSet {
    slots: Vec<Slot>,
}

impl SlotSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_one_attached(self, name: impl Into<String>, options: SlotOptions) -> Self {
        self.declare(name.into(), SlotKind::One, options)
    }

    pub fn has_many_attached(self, name: impl Into<String>, options: SlotOptions) -> Self {
        self.declare(name.into(), SlotKind::Many, options)
    }

    // Redeclaring a name replaces the earlier declaration.
    fn declare(mut self, name: String, kind: SlotKind, options: SlotOptions) -> Self {
        self.slots.retain(|slot| slot.name != name);
        self.slots.push(Slot {
            name,
            kind,
            uploader: options.uploader,
            dependent: options.dependent,
            strict_loading: options.strict_loading,
        });
        self
    }

    pub fn reflect_on_attachment(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.name == name)
    }

    pub fn reflect_on_all_attachments(&self) -> &[Slot] {
        &self.slots
    }

    pub(crate) fn require(&self, name: &str, kind: SlotKind) -> Result<&Slot> {
        let slot = self
            .reflect_on_attachment(name)
            .ok_or_else(|| StowageError::UnknownSlot(name.to_string()))?;
        if slot.kind != kind {
            return Err(StowageError::SlotKindMismatch {
                name: name.to_string(),
                declared: slot.kind,
                requested: kind,
            });
        }
        Ok(slot)
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<&Slot> {
        self.reflect_on_attachment(name)
            .ok_or_else(|| StowageError::UnknownSlot(name.to_string()))
    }
}
