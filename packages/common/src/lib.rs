pub mod config;
pub mod storage;
pub mod worker;

pub use storage::{FileStorage, StorageError, StorageTier, Upload, UploadedFile};
pub use worker::{Task, TaskQueue};
