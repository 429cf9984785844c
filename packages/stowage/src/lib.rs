//! File attachments for host records: pending-change tracking, signed
//! references and background promotion of cached uploads.

pub mod attacher;
pub mod attachment;
pub mod changes;
pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod jobs;
pub mod persistence;
pub mod proxy;
pub mod record;
pub mod signed;
pub mod slots;
pub mod uploader;

pub use attacher::{Attacher, CommitPlan};
pub use attachment::{Attachable, Attachment, OwnerRef};
pub use changes::PendingChange;
pub use config::StowageConfig;
pub use error::{Errors, Result, StowageError};
pub use jobs::{DestroyAttachment, JobOutcome, PromoteAttachment, SkipReason, perform_task};
pub use persistence::{AttachmentRepository, MemoryRepository, RepositoryError, RowOp, SeaOrmRepository};
pub use proxy::{Many, One};
pub use record::{AttachmentState, HasAttachments};
pub use signed::{ReferenceCodec, SignatureError};
pub use slots::{DependentPolicy, Slot, SlotKind, SlotOptions, SlotSet};
pub use uploader::{BasicUploader, Uploader};
