use chrono::{DateTime, Utc};
use common::{FileStorage, StorageError, StorageTier, Upload, UploadedFile};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::signed::{Reference, ReferenceCodec, SignatureError};

pub(crate) const INVALID: &str = "is invalid";

/// Polymorphic owner reference: the host record's type name plus its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerRef {
    pub owner_type: String,
    pub owner_id: String,
}

impl OwnerRef {
    pub fn new(owner_type: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id: owner_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowState {
    New,
    Persisted,
    Destroyed,
}

/// Anything that can be assigned to a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachable {
    /// Raw bytes; written to the cache tier as soon as they are assigned.
    Upload(Upload),
    /// A signed reference token, or a raw JSON file descriptor.
    Reference(String),
    /// An already stored file, assigned programmatically.
    File(UploadedFile),
}

impl Attachable {
    /// Empty strings count as "no value", like a blank form field.
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Reference(s) if s.trim().is_empty())
    }
}

impl From<Upload> for Attachable {
    fn from(upload: Upload) -> Self {
        Self::Upload(upload)
    }
}

impl From<String> for Attachable {
    fn from(reference: String) -> Self {
        Self::Reference(reference)
    }
}

impl From<&str> for Attachable {
    fn from(reference: &str) -> Self {
        Self::Reference(reference.to_string())
    }
}

impl From<UploadedFile> for Attachable {
    fn from(file: UploadedFile) -> Self {
        Self::File(file)
    }
}

/// One uploaded file bound to a named slot on a host record.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub id: Uuid,
    pub owner: Option<OwnerRef>,
    pub name: String,
    pub attachment_type: String,
    pub file: Option<UploadedFile>,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    state: RowState,
    /// Problems found while interpreting the last assigned value.
    pub(crate) assignment_errors: Vec<String>,
    /// Set while `file` came from a reference to some other attachment or
    /// from an unsigned JSON descriptor. Such a file is only acceptable while
    /// it still sits in the cache tier.
    pub(crate) unverified: bool,
    /// Set once file disposal has been handed to a background job.
    pub(crate) skip_file_destroy: bool,
}

impl Attachment {
    /// A fresh, unsaved attachment for slot `name`.
    pub fn build(
        owner: Option<OwnerRef>,
        name: impl Into<String>,
        attachment_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            owner,
            name: name.into(),
            attachment_type: attachment_type.into(),
            file: None,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
            state: RowState::New,
            assignment_errors: Vec::new(),
            unverified: false,
            skip_file_destroy: false,
        }
    }

    /// Rehydrate a stored row.
    #[allow(clippy::too_many_arguments)]
    pub fn from_row(
        id: Uuid,
        owner: Option<OwnerRef>,
        name: String,
        attachment_type: String,
        file: Option<UploadedFile>,
        metadata: Map<String, Value>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            name,
            attachment_type,
            file,
            metadata,
            created_at,
            updated_at,
            state: RowState::Persisted,
            assignment_errors: Vec::new(),
            unverified: false,
            skip_file_destroy: false,
        }
    }

    pub fn is_new_record(&self) -> bool {
        self.state == RowState::New
    }

    pub fn is_persisted(&self) -> bool {
        self.state == RowState::Persisted
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == RowState::Destroyed
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.state = RowState::Persisted;
        self.assignment_errors.clear();
        self.unverified = false;
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.state = RowState::Destroyed;
    }

    /// Copy of the row as the repository stores it, without in-memory flags.
    pub(crate) fn stored(&self) -> Self {
        let mut row = self.clone();
        row.mark_persisted();
        row.skip_file_destroy = false;
        row
    }

    /// Uploader name encoded in the `<Uploader>Attachment` discriminant.
    pub fn uploader_name(&self) -> &str {
        self.attachment_type
            .strip_suffix("Attachment")
            .unwrap_or(&self.attachment_type)
    }

    /// Tamper-evident token for this attachment in its current state.
    pub fn signed_id(&self, codec: &ReferenceCodec) -> std::result::Result<String, SignatureError> {
        codec.encode(self.id, self.file.as_ref())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.file.as_ref()?.mime_type()
    }

    pub fn filename(&self) -> Option<&str> {
        self.file.as_ref()?.original_filename()
    }

    pub fn extension(&self) -> Option<String> {
        self.file.as_ref()?.extension()
    }

    pub fn size(&self) -> Option<u64> {
        self.file.as_ref().map(UploadedFile::size)
    }

    /// Whether the file can be rendered as an image.
    pub fn is_representable(&self) -> bool {
        self.content_type()
            .is_some_and(|mime| mime.starts_with("image/"))
    }

    /// Interpret `input` and store the result as this attachment's file.
    ///
    /// Uploads are written to the cache tier immediately. This attachment's
    /// own signed id is a no-op. Any other verified token or raw JSON
    /// descriptor is flagged as unverified, and anything else records an
    /// "is invalid" assignment error.
    pub(crate) async fn assign(
        &mut self,
        input: Attachable,
        codec: &ReferenceCodec,
        storage: &dyn FileStorage,
    ) -> Result<()> {
        self.assignment_errors.clear();

        match input {
            Attachable::Upload(upload) => match storage.store(&upload, StorageTier::Cache).await {
                Ok(file) => {
                    debug!(attachment_id = %self.id, key = %file.id, "Cached upload");
                    self.set_file(Some(file), false);
                }
                Err(StorageError::SizeLimitExceeded { limit, .. }) => {
                    self.assignment_errors
                        .push(format!("is too large (maximum is {limit} bytes)"));
                }
                Err(e) => return Err(e.into()),
            },
            Attachable::File(file) => self.set_file(Some(file), false),
            Attachable::Reference(token) => {
                if self.signed_id(codec).is_ok_and(|current| current == token) {
                    return Ok(());
                }
                match codec.resolve(&token) {
                    Ok(Reference::Unsigned(file)) => self.set_file(Some(file), true),
                    // Someone else's file: adopt it only while it is cached, so two
                    // rows never share stored bytes.
                    Ok(Reference::Signed(reference)) => match reference.uploaded_file() {
                        Ok(file) => self.set_file(file, true),
                        Err(_) => self.assignment_errors.push(INVALID.to_string()),
                    },
                    Err(_) => self.assignment_errors.push(INVALID.to_string()),
                }
            }
        }

        Ok(())
    }

    fn set_file(&mut self, file: Option<UploadedFile>, unverified: bool) {
        if self.file != file {
            self.updated_at = Utc::now();
        }
        self.file = file;
        self.unverified = unverified;
    }

    /// Record the owner back-reference in `metadata`.
    pub(crate) fn merge_owner_metadata(&mut self) {
        if let Some(owner) = &self.owner {
            self.metadata
                .insert("record_type".into(), Value::String(owner.owner_type.clone()));
            self.metadata
                .insert("record_id".into(), Value::String(owner.owner_id.clone()));
        }
    }

    /// Persistent fields equal, ignoring timestamps and in-memory flags.
    pub(crate) fn same_row(&self, other: &Attachment) -> bool {
        self.id == other.id
            && self.owner == other.owner
            && self.name == other.name
            && self.attachment_type == other.attachment_type
            && self.file == other.file
            && self.metadata == other.metadata
    }
}
