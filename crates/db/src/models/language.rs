use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::{entities::language, models::ids};

/// A target language of a project. Languages are soft-deleted so finished
/// tasks that reference them keep resolving.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Language {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub tag: String,
    pub deleted_at: Option<DateTime<Utc>>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateLanguage {
    pub project_id: Uuid,
    pub name: String,
    pub tag: String,
}

/// The language row for `language_id`, only when it belongs to the given
/// project row and is not soft-deleted.
pub(crate) async fn live_row_in_project<C: ConnectionTrait>(
    db: &C,
    project_row_id: i64,
    language_id: Uuid,
) -> Result<Option<language::Model>, DbErr> {
    let record = language::Entity::find()
        .filter(language::Column::Uuid.eq(language_id))
        .one(db)
        .await?;
    Ok(record.filter(|lang| lang.project_id == project_row_id && lang.deleted_at.is_none()))
}

impl Language {
    async fn from_model<C: ConnectionTrait>(db: &C, model: language::Model) -> Result<Self, DbErr> {
        let project_id = ids::project_uuid_by_id(db, model.project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;

        Ok(Self {
            id: model.uuid,
            project_id,
            name: model.name,
            tag: model.tag,
            deleted_at: model.deleted_at.map(Into::into),
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = language::Entity::find()
            .filter(language::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    /// Live languages of a project, soft-deleted ones excluded.
    pub async fn find_by_project<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let Some(project_row_id) = ids::project_id_by_uuid(db, project_id).await? else {
            return Ok(Vec::new());
        };

        let records = language::Entity::find()
            .filter(language::Column::ProjectId.eq(project_row_id))
            .filter(language::Column::DeletedAt.is_null())
            .order_by_asc(language::Column::Tag)
            .all(db)
            .await?;

        let mut languages = Vec::with_capacity(records.len());
        for model in records {
            languages.push(Self::from_model(db, model).await?);
        }
        Ok(languages)
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateLanguage,
        language_id: Uuid,
    ) -> Result<Self, DbErr> {
        let project_row_id = ids::project_id_by_uuid(db, data.project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;

        let now = Utc::now();
        let active = language::ActiveModel {
            uuid: Set(language_id),
            project_id: Set(project_row_id),
            name: Set(data.name.clone()),
            tag: Set(data.tag.clone()),
            deleted_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        Self::from_model(db, model).await
    }

    /// True when the language exists, is live and belongs to `project_id`.
    pub async fn is_in_project<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        project_id: Uuid,
    ) -> Result<bool, DbErr> {
        let Some(project_row_id) = ids::project_id_by_uuid(db, project_id).await? else {
            return Ok(false);
        };

        let record = language::Entity::find()
            .filter(language::Column::Uuid.eq(id))
            .filter(language::Column::ProjectId.eq(project_row_id))
            .filter(language::Column::DeletedAt.is_null())
            .one(db)
            .await?;
        Ok(record.is_some())
    }

    /// Stamp `deleted_at`, keeping the row for tasks that reference it.
    /// Repeated deletes keep the original timestamp.
    pub async fn soft_delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Self, DbErr> {
        let record = language::Entity::find()
            .filter(language::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Language not found".to_string()))?;

        if record.deleted_at.is_some() {
            return Self::from_model(db, record).await;
        }

        let now = Utc::now();
        let mut active: language::ActiveModel = record.into();
        active.deleted_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());

        let updated = active.update(db).await?;
        Self::from_model(db, updated).await
    }
}
