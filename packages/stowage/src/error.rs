use std::collections::BTreeMap;
use std::fmt;

use common::StorageError;
use thiserror::Error;

use crate::persistence::RepositoryError;
use crate::signed::SignatureError;
use crate::slots::SlotKind;

/// Field-level validation errors keyed by attribute name.
///
/// Attachment failures are always recorded under the slot name so callers can
/// render them next to the matching form field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Errors(BTreeMap<String, Vec<String>>);

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Messages recorded for `field`, empty if none.
    pub fn on(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn merge(&mut self, other: &Errors) {
        for (field, messages) in &other.0 {
            for message in messages {
                self.add(field.clone(), message.clone());
            }
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `"<field> <message>"` for every recorded error.
    pub fn full_messages(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(field, messages)| messages.iter().map(move |m| format!("{field} {m}")))
            .collect()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_messages().join(", "))
    }
}

#[derive(Debug, Error)]
pub enum StowageError {
    #[error("Validation failed: {0}")]
    RecordInvalid(Errors),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Owner record has not been persisted")]
    OwnerNotPersisted,

    #[error("Unknown attachment slot: {0}")]
    UnknownSlot(String),

    #[error("Slot '{name}' is declared {declared}, not {requested}")]
    SlotKindMismatch {
        name: String,
        declared: SlotKind,
        requested: SlotKind,
    },

    #[error("Slot '{0}' is strict_loading and its attachments were not preloaded")]
    StrictLoading(String),

    #[error("Background jobs are not configured; purge_later requires a task queue")]
    BackgroundingNotConfigured,
}

impl StowageError {
    pub fn is_record_invalid(&self) -> bool {
        matches!(self, Self::RecordInvalid(_))
    }
}

pub type Result<T> = std::result::Result<T, StowageError>;
