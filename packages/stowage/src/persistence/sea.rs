use async_trait::async_trait;
use chrono::Utc;
use common::UploadedFile;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::{Map, Value};
use tracing::instrument;
use uuid::Uuid;

use super::{AttachmentRepository, RepositoryError, RowOp};
use crate::attachment::{Attachment, OwnerRef};
use crate::entity::attachment;

/// Postgres-backed repository on sea-orm.
#[derive(Debug, Clone)]
pub struct SeaOrmRepository {
    db: DatabaseConnection,
}

impl SeaOrmRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Apply `ops` on an existing connection or transaction.
    ///
    /// Hosts that persist their own row in a transaction can run the
    /// attachment writes inside it and call `Attacher::finalize` after commit.
    pub async fn apply_in<C: ConnectionTrait>(conn: &C, ops: Vec<RowOp>) -> Result<(), RepositoryError> {
        for op in ops {
            match op {
                RowOp::Insert(a) => {
                    to_active_model(&a)?.insert(conn).await?;
                }
                RowOp::Update(a) => match to_active_model(&a)?.update(conn).await {
                    Ok(_) => {}
                    Err(DbErr::RecordNotUpdated) => {
                        return Err(RepositoryError::Conflict(format!(
                            "attachment {} no longer exists",
                            a.id
                        )));
                    }
                    Err(e) => return Err(e.into()),
                },
                RowOp::Delete(id) => {
                    attachment::Entity::delete_by_id(id).exec(conn).await?;
                }
                RowOp::Nullify(id) => {
                    attachment::Entity::update_many()
                        .col_expr(attachment::Column::OwnerType, Expr::value(Option::<String>::None))
                        .col_expr(attachment::Column::OwnerId, Expr::value(Option::<String>::None))
                        .col_expr(attachment::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(attachment::Column::Id.eq(id))
                        .exec(conn)
                        .await?;
                }
            }
        }
        Ok(())
    }
}

fn file_to_json(file: Option<&UploadedFile>) -> Result<Value, serde_json::Error> {
    match file {
        Some(file) => serde_json::to_value(file),
        None => Ok(Value::Object(Map::new())),
    }
}

fn file_from_json(value: Value) -> Result<Option<UploadedFile>, serde_json::Error> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        other => serde_json::from_value(other).map(Some),
    }
}

fn to_active_model(a: &Attachment) -> Result<attachment::ActiveModel, serde_json::Error> {
    Ok(attachment::ActiveModel {
        id: Set(a.id),
        owner_type: Set(a.owner.as_ref().map(|o| o.owner_type.clone())),
        owner_id: Set(a.owner.as_ref().map(|o| o.owner_id.clone())),
        name: Set(a.name.clone()),
        attachment_type: Set(a.attachment_type.clone()),
        file_data: Set(file_to_json(a.file.as_ref())?),
        metadata: Set(Value::Object(a.metadata.clone())),
        created_at: Set(a.created_at),
        updated_at: Set(a.updated_at),
    })
}

fn from_model(model: attachment::Model) -> Result<Attachment, RepositoryError> {
    let owner = match (model.owner_type, model.owner_id) {
        (Some(owner_type), Some(owner_id)) => Some(OwnerRef { owner_type, owner_id }),
        _ => None,
    };
    let metadata = match model.metadata {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Ok(Attachment::from_row(
        model.id,
        owner,
        model.name,
        model.attachment_type,
        file_from_json(model.file_data)?,
        metadata,
        model.created_at,
        model.updated_at,
    ))
}

#[async_trait]
impl AttachmentRepository for SeaOrmRepository {
    async fn find(&self, id: Uuid) -> Result<Option<Attachment>, RepositoryError> {
        attachment::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(from_model)
            .transpose()
    }

    async fn find_by_slot(
        &self,
        owner: &OwnerRef,
        name: &str,
    ) -> Result<Vec<Attachment>, RepositoryError> {
        attachment::Entity::find()
            .filter(attachment::Column::OwnerType.eq(owner.owner_type.as_str()))
            .filter(attachment::Column::OwnerId.eq(owner.owner_id.as_str()))
            .filter(attachment::Column::Name.eq(name))
            .order_by_asc(attachment::Column::CreatedAt)
            .order_by_asc(attachment::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(from_model)
            .collect()
    }

    async fn find_by_owners(
        &self,
        owner_type: &str,
        owner_ids: &[String],
        name: &str,
    ) -> Result<Vec<Attachment>, RepositoryError> {
        if owner_ids.is_empty() {
            return Ok(Vec::new());
        }
        attachment::Entity::find()
            .filter(attachment::Column::OwnerType.eq(owner_type))
            .filter(attachment::Column::OwnerId.is_in(owner_ids.iter().cloned()))
            .filter(attachment::Column::Name.eq(name))
            .order_by_asc(attachment::Column::CreatedAt)
            .order_by_asc(attachment::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(from_model)
            .collect()
    }

    #[instrument(skip(self, ops), fields(ops = ops.len()))]
    async fn apply(&self, ops: Vec<RowOp>) -> Result<(), RepositoryError> {
        if ops.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin().await?;
        // Dropping the transaction on error rolls it back.
        Self::apply_in(&txn, ops).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = attachment::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn compare_and_set_file(
        &self,
        id: Uuid,
        expected: &UploadedFile,
        new: &UploadedFile,
    ) -> Result<bool, RepositoryError> {
        let txn = self.db.begin().await?;

        let row = attachment::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(&txn)
            .await?;

        let Some(row) = row else {
            txn.rollback().await?;
            return Ok(false);
        };

        if file_from_json(row.file_data.clone())?.as_ref() != Some(expected) {
            txn.rollback().await?;
            return Ok(false);
        }

        let mut active: attachment::ActiveModel = row.into();
        active.file_data = Set(file_to_json(Some(new))?);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;
        txn.commit().await?;

        Ok(true)
    }
}
