use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::entities::user_account;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UserAccount {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateUserAccount {
    pub username: String,
    pub display_name: Option<String>,
}

impl UserAccount {
    fn from_model(model: user_account::Model) -> Self {
        Self {
            id: model.uuid,
            username: model.username,
            display_name: model.display_name,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = user_account::Entity::find()
            .filter(user_account::Column::Uuid.eq(id))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_username<C: ConnectionTrait>(
        db: &C,
        username: &str,
    ) -> Result<Option<Self>, DbErr> {
        let record = user_account::Entity::find()
            .filter(user_account::Column::Username.eq(username))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_all<C: ConnectionTrait>(db: &C) -> Result<Vec<Self>, DbErr> {
        let records = user_account::Entity::find()
            .order_by_desc(user_account::Column::Id)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateUserAccount,
        user_id: Uuid,
    ) -> Result<Self, DbErr> {
        let now = Utc::now();
        let active = user_account::ActiveModel {
            uuid: Set(user_id),
            username: Set(data.username.clone()),
            display_name: Set(data.display_name.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        Ok(Self::from_model(model))
    }
}
