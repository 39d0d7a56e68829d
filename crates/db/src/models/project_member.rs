use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::{entities::project_member, models::ids, types::ProjectScope};

#[derive(Debug, Error)]
pub enum MemberError {
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Project not found")]
    ProjectNotFound,
    #[error("User not found")]
    UserNotFound,
}

/// A user's membership in a project, with the scopes granted to them.
#[derive(Debug, Clone, Serialize, TS)]
pub struct ProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub scopes: Vec<ProjectScope>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

impl ProjectMember {
    fn from_model(
        model: project_member::Model,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Self, MemberError> {
        let scopes: Vec<ProjectScope> = serde_json::from_value(model.scopes)?;
        Ok(Self {
            project_id,
            user_id,
            scopes,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }

    /// Grant `scopes` to `user_id` in `project_id`. An existing membership is
    /// overwritten, so this also revokes scopes absent from the new list.
    pub async fn add<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        user_id: Uuid,
        scopes: &[ProjectScope],
    ) -> Result<Self, MemberError> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(MemberError::ProjectNotFound)?;
        let user_row_id = ids::user_account_id_by_uuid(db, user_id)
            .await?
            .ok_or(MemberError::UserNotFound)?;

        let mut deduped: Vec<ProjectScope> = Vec::with_capacity(scopes.len());
        for scope in scopes {
            if !deduped.contains(scope) {
                deduped.push(*scope);
            }
        }
        let scopes_json = serde_json::to_value(&deduped)?;

        let existing = project_member::Entity::find()
            .filter(project_member::Column::ProjectId.eq(project_row_id))
            .filter(project_member::Column::UserId.eq(user_row_id))
            .one(db)
            .await?;

        let now = Utc::now();
        let model = match existing {
            Some(record) => {
                let mut active: project_member::ActiveModel = record.into();
                active.scopes = Set(scopes_json);
                active.updated_at = Set(now.into());
                active.update(db).await?
            }
            None => {
                project_member::ActiveModel {
                    project_id: Set(project_row_id),
                    user_id: Set(user_row_id),
                    scopes: Set(scopes_json),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                    ..Default::default()
                }
                .insert(db)
                .await?
            }
        };

        Self::from_model(model, project_id, user_id)
    }

    /// The scopes of a membership, or `None` when the user is not a member.
    pub async fn scopes_for<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Vec<ProjectScope>>, MemberError> {
        let Some(project_row_id) = ids::project_id_by_uuid(db, project_id).await? else {
            return Ok(None);
        };
        let Some(user_row_id) = ids::user_account_id_by_uuid(db, user_id).await? else {
            return Ok(None);
        };

        let record = project_member::Entity::find()
            .filter(project_member::Column::ProjectId.eq(project_row_id))
            .filter(project_member::Column::UserId.eq(user_row_id))
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(serde_json::from_value(model.scopes)?)),
            None => Ok(None),
        }
    }

    pub async fn has_access<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, MemberError> {
        Ok(Self::scopes_for(db, project_id, user_id).await?.is_some())
    }

    pub async fn remove<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, MemberError> {
        let Some(project_row_id) = ids::project_id_by_uuid(db, project_id).await? else {
            return Ok(0);
        };
        let Some(user_row_id) = ids::user_account_id_by_uuid(db, user_id).await? else {
            return Ok(0);
        };

        let result = project_member::Entity::delete_many()
            .filter(project_member::Column::ProjectId.eq(project_row_id))
            .filter(project_member::Column::UserId.eq(user_row_id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Row-level membership check for callers that already hold row ids.
    pub(crate) async fn is_member_row<C: ConnectionTrait>(
        db: &C,
        project_row_id: i64,
        user_row_id: i64,
    ) -> Result<bool, DbErr> {
        let record = project_member::Entity::find()
            .filter(project_member::Column::ProjectId.eq(project_row_id))
            .filter(project_member::Column::UserId.eq(user_row_id))
            .one(db)
            .await?;
        Ok(record.is_some())
    }
}
