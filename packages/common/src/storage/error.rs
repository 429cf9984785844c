use std::fmt;

/// Errors that can occur during file storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// The requested file was not found in its tier.
    NotFound(String),
    /// An I/O error occurred.
    Io(std::io::Error),
    /// The provided checksum is not a valid SHA-256 hex digest.
    InvalidChecksum(String),
    /// Copied bytes no longer match the digest recorded at upload.
    ChecksumMismatch(String),
    /// The storage key contains characters that could escape the tier directory.
    InvalidKey(String),
    /// The upload exceeds the configured size limit.
    SizeLimitExceeded { actual: u64, limit: u64 },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "file not found: {key}"),
            Self::Io(err) => write!(f, "storage IO error: {err}"),
            Self::InvalidChecksum(msg) => write!(f, "invalid checksum: {msg}"),
            Self::ChecksumMismatch(key) => write!(f, "checksum mismatch for {key}"),
            Self::InvalidKey(key) => write!(f, "invalid storage key: {key}"),
            Self::SizeLimitExceeded { actual, limit } => {
                write!(f, "upload exceeds size limit ({actual} > {limit} bytes)")
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
