use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect};
use uuid::Uuid;

use crate::entities::{key, language, project, translation, user_account};

pub async fn project_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    project::Entity::find()
        .select_only()
        .column(project::Column::Id)
        .filter(project::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn project_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    project::Entity::find()
        .select_only()
        .column(project::Column::Uuid)
        .filter(project::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn user_account_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    user_account::Entity::find()
        .select_only()
        .column(user_account::Column::Id)
        .filter(user_account::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn user_account_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    user_account::Entity::find()
        .select_only()
        .column(user_account::Column::Uuid)
        .filter(user_account::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn language_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    language::Entity::find()
        .select_only()
        .column(language::Column::Id)
        .filter(language::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn language_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    language::Entity::find()
        .select_only()
        .column(language::Column::Uuid)
        .filter(language::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn key_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    key::Entity::find()
        .select_only()
        .column(key::Column::Id)
        .filter(key::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn key_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    key::Entity::find()
        .select_only()
        .column(key::Column::Uuid)
        .filter(key::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn translation_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    translation::Entity::find()
        .select_only()
        .column(translation::Column::Id)
        .filter(translation::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn translation_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    translation::Entity::find()
        .select_only()
        .column(translation::Column::Uuid)
        .filter(translation::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

#[cfg(test)]
mod tests {
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    use crate::models::{
        language::{CreateLanguage, Language},
        project::{CreateProject, Project},
    };

    use super::*;

    async fn setup_db() -> sea_orm::DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn ids_roundtrip_and_uuid_resolution() {
        let db = setup_db().await;

        let project_id = Uuid::new_v4();
        let project = Project::create(
            &db,
            &CreateProject {
                name: "Test project".to_string(),
            },
            project_id,
        )
        .await
        .unwrap();
        assert_eq!(project.id, project_id);

        let project_row_id = project_id_by_uuid(&db, project_id)
            .await
            .unwrap()
            .expect("project row id");
        assert_eq!(
            project_uuid_by_id(&db, project_row_id).await.unwrap(),
            Some(project_id)
        );

        let language_id = Uuid::new_v4();
        let language = Language::create(
            &db,
            &CreateLanguage {
                project_id,
                name: "English".to_string(),
                tag: "en".to_string(),
            },
            language_id,
        )
        .await
        .unwrap();
        assert_eq!(language.id, language_id);
        assert_eq!(language.project_id, project_id);

        let language_row_id = language_id_by_uuid(&db, language_id)
            .await
            .unwrap()
            .expect("language row id");
        assert_eq!(
            language_uuid_by_id(&db, language_row_id).await.unwrap(),
            Some(language_id)
        );

        assert_eq!(project_id_by_uuid(&db, Uuid::new_v4()).await.unwrap(), None);
        assert_eq!(key_id_by_uuid(&db, Uuid::new_v4()).await.unwrap(), None);
    }
}
