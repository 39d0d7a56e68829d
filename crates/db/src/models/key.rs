use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::{entities::key, models::ids};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Key {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateKey {
    pub project_id: Uuid,
    pub name: String,
}

impl Key {
    async fn from_model<C: ConnectionTrait>(db: &C, model: key::Model) -> Result<Self, DbErr> {
        let project_id = ids::project_uuid_by_id(db, model.project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;

        Ok(Self {
            id: model.uuid,
            project_id,
            name: model.name,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = key::Entity::find()
            .filter(key::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_project<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let Some(project_row_id) = ids::project_id_by_uuid(db, project_id).await? else {
            return Ok(Vec::new());
        };

        let records = key::Entity::find()
            .filter(key::Column::ProjectId.eq(project_row_id))
            .order_by_asc(key::Column::Name)
            .all(db)
            .await?;

        let mut keys = Vec::with_capacity(records.len());
        for model in records {
            keys.push(Self::from_model(db, model).await?);
        }
        Ok(keys)
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateKey,
        key_id: Uuid,
    ) -> Result<Self, DbErr> {
        let project_row_id = ids::project_id_by_uuid(db, data.project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;

        let now = Utc::now();
        let active = key::ActiveModel {
            uuid: Set(key_id),
            project_id: Set(project_row_id),
            name: Set(data.name.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        Self::from_model(db, model).await
    }

    /// Deleting a key cascades through its translations to any task items
    /// that reference them.
    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let result = key::Entity::delete_many()
            .filter(key::Column::Uuid.eq(id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}
