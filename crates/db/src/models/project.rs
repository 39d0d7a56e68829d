use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
    TransactionSession, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::{
    entities::{project, task},
    events::{EVENT_PROJECT_DELETED, EVENT_TASK_DELETED, ProjectEventPayload, TaskEventPayload},
    models::{event_outbox::EventOutbox, ids, language},
};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Project not found")]
    ProjectNotFound,
    #[error("Language does not belong to the project")]
    LanguageNotFromProject,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub base_language_id: Option<Uuid>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateProject {
    pub name: String,
}

impl Project {
    async fn from_model<C: ConnectionTrait>(db: &C, model: project::Model) -> Result<Self, DbErr> {
        let base_language_id = match model.base_language_id {
            Some(id) => ids::language_uuid_by_id(db, id)
                .await?
                .ok_or(DbErr::RecordNotFound("Language not found".to_string()))
                .map(Some)?,
            None => None,
        };

        Ok(Self {
            id: model.uuid,
            name: model.name,
            base_language_id,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = project::Entity::find()
            .filter(project::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateProject,
        project_id: Uuid,
    ) -> Result<Self, DbErr> {
        let now = Utc::now();
        let active = project::ActiveModel {
            uuid: Set(project_id),
            name: Set(data.name.clone()),
            base_language_id: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        Self::from_model(db, model).await
    }

    pub async fn set_base_language<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        language_id: Uuid,
    ) -> Result<Self, ProjectError> {
        let record = project::Entity::find()
            .filter(project::Column::Uuid.eq(project_id))
            .one(db)
            .await?
            .ok_or(ProjectError::ProjectNotFound)?;

        let language_row = language::live_row_in_project(db, record.id, language_id)
            .await?
            .ok_or(ProjectError::LanguageNotFromProject)?;

        let mut active: project::ActiveModel = record.into();
        active.base_language_id = Set(Some(language_row.id));
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        Ok(Self::from_model(db, updated).await?)
    }

    /// Row FKs cascade through languages, keys, translations, members, tasks
    /// and task items; events for the removed tasks are enqueued alongside.
    pub async fn delete<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<u64, DbErr> {
        let tx = db.begin().await?;

        let project = project::Entity::find()
            .filter(project::Column::Uuid.eq(project_id))
            .one(&tx)
            .await?;

        let Some(project) = project else {
            tx.rollback().await?;
            return Ok(0);
        };

        let tasks = task::Entity::find()
            .filter(task::Column::ProjectId.eq(project.id))
            .all(&tx)
            .await?;

        let result = project::Entity::delete_many()
            .filter(project::Column::Uuid.eq(project_id))
            .exec(&tx)
            .await?;

        if result.rows_affected > 0 {
            for task_model in tasks {
                let payload = serde_json::to_value(TaskEventPayload {
                    project_id,
                    number: task_model.number,
                    actor_id: None,
                })
                .map_err(|err| DbErr::Custom(err.to_string()))?;
                EventOutbox::enqueue(&tx, EVENT_TASK_DELETED, "task", payload).await?;
            }
            let payload = serde_json::to_value(ProjectEventPayload { project_id })
                .map_err(|err| DbErr::Custom(err.to_string()))?;
            EventOutbox::enqueue(&tx, EVENT_PROJECT_DELETED, "project", payload).await?;
        }

        tx.commit().await?;
        Ok(result.rows_affected)
    }
}
