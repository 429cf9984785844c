use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::BufReader;
use tracing::debug;

use super::checksum::Checksum;
use super::error::StorageError;
use super::file::{FileMetadata, StorageTier, UploadedFile};
use super::traits::{BoxReader, FileStorage, Upload};

/// Filesystem-backed two-tier file storage.
///
/// Files are stored under a sharded directory per tier:
/// `{base_path}/{tier}/{first 2 key chars}/{key}`
pub struct FilesystemStorage {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemStorage {
    /// Create the storage root, both tier directories and the temp directory.
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        for tier in [StorageTier::Cache, StorageTier::Store] {
            fs::create_dir_all(base_path.join(tier.as_str())).await?;
        }
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn file_path(&self, tier: StorageTier, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self
            .base_path
            .join(tier.as_str())
            .join(&key[..2])
            .join(key))
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }

    /// Atomically place a fully written temp file at `dest`.
    async fn commit_temp(&self, temp_path: &Path, dest: &Path) -> Result<(), StorageError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Err(e) = fs::rename(temp_path, dest).await {
            let _ = fs::remove_file(temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let safe = key.len() >= 3
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
        && !key.starts_with('.')
        && !key.contains("..");
    if safe {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Fresh storage key, keeping the extension of the original name if it has one.
fn generate_key(extension: Option<&str>) -> String {
    let base = uuid::Uuid::new_v4().simple().to_string();
    match extension {
        Some(ext) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!("{base}.{}", ext.to_ascii_lowercase())
        }
        _ => base,
    }
}

fn extension_of(filename: Option<&str>) -> Option<&str> {
    let (stem, ext) = filename?.rsplit_once('.')?;
    (!stem.is_empty()).then_some(ext)
}

#[async_trait]
impl FileStorage for FilesystemStorage {
    async fn store(&self, upload: &Upload, tier: StorageTier) -> Result<UploadedFile, StorageError> {
        let size = upload.data.len() as u64;
        if size > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: size,
                limit: self.max_size,
            });
        }

        let key = generate_key(extension_of(upload.filename.as_deref()));
        let dest = self.file_path(tier, &key)?;

        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, &upload.data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        self.commit_temp(&temp_path, &dest).await?;

        debug!(key = %key, tier = %tier, size, "Stored upload");

        Ok(UploadedFile::new(
            key,
            tier,
            FileMetadata {
                size,
                filename: upload.filename.clone(),
                mime_type: upload.mime_type(),
                sha256: Some(Checksum::compute(&upload.data)),
            },
        ))
    }

    async fn open(&self, file: &UploadedFile) -> Result<BoxReader, StorageError> {
        let path = self.file_path(file.storage, &file.id)?;
        match fs::File::open(&path).await {
            Ok(f) => Ok(Box::new(BufReader::new(f))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(file.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, file: &UploadedFile) -> Result<bool, StorageError> {
        let path = match self.file_path(file.storage, &file.id) {
            Ok(path) => path,
            Err(StorageError::InvalidKey(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, file: &UploadedFile) -> Result<bool, StorageError> {
        let path = self.file_path(file.storage, &file.id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn copy_to(
        &self,
        file: &UploadedFile,
        tier: StorageTier,
    ) -> Result<UploadedFile, StorageError> {
        let source = self.file_path(file.storage, &file.id)?;
        let key = generate_key(file.extension().as_deref());
        let dest = self.file_path(tier, &key)?;

        let temp_path = self.temp_path();
        match fs::copy(&source, &temp_path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(StorageError::NotFound(file.id.clone()));
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e.into());
            }
        }
        if let Some(expected) = file.metadata.sha256 {
            let copied = fs::read(&temp_path).await?;
            if !expected.matches(&copied) {
                let _ = fs::remove_file(&temp_path).await;
                return Err(StorageError::ChecksumMismatch(file.id.clone()));
            }
        }
        self.commit_temp(&temp_path, &dest).await?;

        debug!(from = %file.id, to = %key, tier = %tier, "Copied file between tiers");

        Ok(file.relocated(tier, key))
    }
}
