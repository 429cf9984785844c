mod checksum;
mod error;
mod file;
mod traits;

pub mod filesystem;

pub use checksum::Checksum;
pub use error::StorageError;
pub use file::{FileMetadata, StorageTier, UploadedFile};
pub use filesystem::FilesystemStorage;
pub use traits::{BoxReader, FileStorage, Upload};
