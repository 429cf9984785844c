use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One attachment row. Owner columns are NULL while the row is nullified.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stowage_attachment")]
pub struct Model {
    /// UUIDv7 primary key, assigned when the attachment is built.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Host record type (e.g. "User").
    #[sea_orm(indexed)]
    pub owner_type: Option<String>,

    /// Host record id (canonical string form).
    #[sea_orm(indexed)]
    pub owner_id: Option<String>,

    /// Slot name.
    #[sea_orm(indexed)]
    pub name: String,

    /// `<Uploader>Attachment` discriminant.
    pub attachment_type: String,

    /// Serialized file descriptor: tier, key and file metadata.
    #[sea_orm(column_type = "JsonBinary")]
    pub file_data: serde_json::Value,

    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: serde_json::Value,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
