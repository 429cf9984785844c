pub mod attachment;

pub use attachment::Entity as AttachmentEntity;
