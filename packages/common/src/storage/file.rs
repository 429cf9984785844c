use std::fmt;

use serde::{Deserialize, Serialize};

use super::checksum::Checksum;

/// Storage tier a file lives in.
///
/// Uploads land in `Cache` when assigned and are promoted to `Store` once the
/// owning record has been committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTier {
    Cache,
    Store,
}

impl StorageTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<Checksum>,
}

/// Descriptor of a stored file: which tier, under which key, plus metadata.
///
/// This is the value persisted in an attachment row's `file_data` column and
/// carried inside signed references and background job payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub storage: StorageTier,
    #[serde(default)]
    pub metadata: FileMetadata,
}

impl UploadedFile {
    pub fn new(id: impl Into<String>, storage: StorageTier, metadata: FileMetadata) -> Self {
        Self {
            id: id.into(),
            storage,
            metadata,
        }
    }

    pub fn size(&self) -> u64 {
        self.metadata.size
    }

    pub fn original_filename(&self) -> Option<&str> {
        self.metadata.filename.as_deref()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.metadata.mime_type.as_deref()
    }

    /// Lowercased extension of the storage key, falling back to the original filename.
    pub fn extension(&self) -> Option<String> {
        fn ext_of(name: &str) -> Option<&str> {
            let (stem, ext) = name.rsplit_once('.')?;
            (!stem.is_empty() && !ext.is_empty()).then_some(ext)
        }

        ext_of(&self.id)
            .or_else(|| self.original_filename().and_then(ext_of))
            .map(str::to_ascii_lowercase)
    }

    pub fn is_cached(&self) -> bool {
        self.storage == StorageTier::Cache
    }

    /// Same descriptor relocated to another tier under a new key.
    pub fn relocated(&self, storage: StorageTier, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            storage,
            metadata: self.metadata.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
