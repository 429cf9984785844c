use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;
use super::file::{StorageTier, UploadedFile};

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Raw uploaded content as received from a caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Upload {
    pub data: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl Upload {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Declared content type, else a guess from the filename extension.
    pub fn mime_type(&self) -> Option<String> {
        self.content_type.clone().or_else(|| {
            self.filename
                .as_deref()
                .and_then(|name| mime_guess::from_path(name).first())
                .map(|m| m.to_string())
        })
    }
}

/// Two-tier file storage: a temporary cache tier and a permanent store tier.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Write an upload into `tier` under a freshly generated key.
    async fn store(&self, upload: &Upload, tier: StorageTier) -> Result<UploadedFile, StorageError>;

    /// Open a stored file as a streaming async reader.
    async fn open(&self, file: &UploadedFile) -> Result<BoxReader, StorageError>;

    /// Read all bytes of a stored file.
    async fn read(&self, file: &UploadedFile) -> Result<Vec<u8>, StorageError> {
        let mut reader = self.open(file).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    async fn exists(&self, file: &UploadedFile) -> Result<bool, StorageError>;

    /// Delete a stored file.
    ///
    /// Returns `true` if the file was deleted, `false` if it did not exist.
    async fn delete(&self, file: &UploadedFile) -> Result<bool, StorageError>;

    /// Copy a file into `tier` under a new key, leaving the source in place.
    async fn copy_to(
        &self,
        file: &UploadedFile,
        tier: StorageTier,
    ) -> Result<UploadedFile, StorageError>;

    /// Move a file into `tier`: copy, then delete the source.
    async fn move_to(
        &self,
        file: &UploadedFile,
        tier: StorageTier,
    ) -> Result<UploadedFile, StorageError> {
        let moved = self.copy_to(file, tier).await?;
        self.delete(file).await?;
        Ok(moved)
    }
}
