use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::{
    entities::translation,
    models::ids,
    retry::is_unique_violation,
    types::TranslationState,
};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Translation {
    pub id: Uuid,
    pub key_id: Uuid,
    pub language_id: Uuid,
    pub text: Option<String>,
    pub state: TranslationState,
    pub outdated: bool,
    pub word_count: i32,
    pub character_count: i32,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

fn word_count(text: &str) -> i32 {
    text.split_whitespace().count() as i32
}

fn character_count(text: &str) -> i32 {
    text.chars().count() as i32
}

impl Translation {
    async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: translation::Model,
    ) -> Result<Self, DbErr> {
        let key_id = ids::key_uuid_by_id(db, model.key_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Key not found".to_string()))?;
        let language_id = ids::language_uuid_by_id(db, model.language_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Language not found".to_string()))?;

        Ok(Self {
            id: model.uuid,
            key_id,
            language_id,
            text: model.text,
            state: model.state,
            outdated: model.outdated,
            word_count: model.word_count,
            character_count: model.character_count,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = translation::Entity::find()
            .filter(translation::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    /// All translation rows of a key, in language row order. Rows are created
    /// lazily, so languages never written to have no entry here.
    pub async fn find_for_key<C: ConnectionTrait>(
        db: &C,
        key_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let Some(key_row_id) = ids::key_id_by_uuid(db, key_id).await? else {
            return Ok(Vec::new());
        };

        let records = translation::Entity::find()
            .filter(translation::Column::KeyId.eq(key_row_id))
            .order_by_asc(translation::Column::LanguageId)
            .all(db)
            .await?;

        let mut translations = Vec::with_capacity(records.len());
        for model in records {
            translations.push(Self::from_model(db, model).await?);
        }
        Ok(translations)
    }

    /// Fetch the row for `(key, language)`, inserting an empty untranslated
    /// one when it does not exist yet.
    pub async fn get_or_create<C: ConnectionTrait>(
        db: &C,
        key_id: Uuid,
        language_id: Uuid,
    ) -> Result<Self, DbErr> {
        let key_row_id = ids::key_id_by_uuid(db, key_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Key not found".to_string()))?;
        let language_row_id = ids::language_id_by_uuid(db, language_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Language not found".to_string()))?;

        let model = Self::get_or_create_row(db, key_row_id, language_row_id).await?;
        Self::from_model(db, model).await
    }

    /// Row-level variant for callers that already resolved row ids. A
    /// concurrent insert of the same pair loses the race on the unique index
    /// and falls back to reading the winner's row.
    pub(crate) async fn get_or_create_row<C: ConnectionTrait>(
        db: &C,
        key_row_id: i64,
        language_row_id: i64,
    ) -> Result<translation::Model, DbErr> {
        let existing = translation::Entity::find()
            .filter(translation::Column::KeyId.eq(key_row_id))
            .filter(translation::Column::LanguageId.eq(language_row_id))
            .one(db)
            .await?;
        if let Some(model) = existing {
            return Ok(model);
        }

        let now = Utc::now();
        let active = translation::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            key_id: Set(key_row_id),
            language_id: Set(language_row_id),
            text: Set(None),
            state: Set(TranslationState::Untranslated),
            outdated: Set(false),
            word_count: Set(0),
            character_count: Set(0),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        match active.insert(db).await {
            Ok(model) => Ok(model),
            Err(err) if is_unique_violation(&err) => translation::Entity::find()
                .filter(translation::Column::KeyId.eq(key_row_id))
                .filter(translation::Column::LanguageId.eq(language_row_id))
                .one(db)
                .await?
                .ok_or(err),
            Err(err) => Err(err),
        }
    }

    /// Set or clear the text, recomputing the stored word and character
    /// counts. Text edits move `untranslated` rows to `translated` and
    /// reviewed rows back to `translated`; clearing the text resets the row
    /// to `untranslated`. Disabled rows keep their state.
    pub async fn set_text<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        text: Option<&str>,
    ) -> Result<Self, DbErr> {
        let record = translation::Entity::find()
            .filter(translation::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Translation not found".to_string()))?;

        let text = text.filter(|t| !t.is_empty());
        let state = match (record.state, text) {
            (TranslationState::Disabled, _) => TranslationState::Disabled,
            (_, Some(_)) => TranslationState::Translated,
            (_, None) => TranslationState::Untranslated,
        };

        let mut active: translation::ActiveModel = record.into();
        active.word_count = Set(text.map(word_count).unwrap_or(0));
        active.character_count = Set(text.map(character_count).unwrap_or(0));
        active.text = Set(text.map(str::to_string));
        active.state = Set(state);
        active.outdated = Set(false);
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        Self::from_model(db, updated).await
    }

    pub async fn set_state<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        state: TranslationState,
    ) -> Result<Self, DbErr> {
        let record = translation::Entity::find()
            .filter(translation::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Translation not found".to_string()))?;

        let mut active: translation::ActiveModel = record.into();
        active.state = Set(state);
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        Self::from_model(db, updated).await
    }

    pub async fn set_outdated<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        outdated: bool,
    ) -> Result<Self, DbErr> {
        let record = translation::Entity::find()
            .filter(translation::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Translation not found".to_string()))?;

        let mut active: translation::ActiveModel = record.into();
        active.outdated = Set(outdated);
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        Self::from_model(db, updated).await
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    use super::*;
    use crate::models::{
        key::{CreateKey, Key},
        language::{CreateLanguage, Language},
        project::{CreateProject, Project},
    };

    async fn setup_db() -> sea_orm::DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn fixtures(db: &sea_orm::DatabaseConnection) -> (Uuid, Uuid) {
        let project_id = Uuid::new_v4();
        Project::create(
            db,
            &CreateProject {
                name: "Docs".to_string(),
            },
            project_id,
        )
        .await
        .unwrap();

        let language_id = Uuid::new_v4();
        Language::create(
            db,
            &CreateLanguage {
                project_id,
                name: "English".to_string(),
                tag: "en".to_string(),
            },
            language_id,
        )
        .await
        .unwrap();

        let key_id = Uuid::new_v4();
        Key::create(
            db,
            &CreateKey {
                project_id,
                name: "home.title".to_string(),
            },
            key_id,
        )
        .await
        .unwrap();

        (key_id, language_id)
    }

    #[test]
    fn counts_words_and_characters() {
        assert_eq!(word_count("Translation 2"), 2);
        assert_eq!(character_count("Translation 2"), 13);
        assert_eq!(word_count("  spaced   out  "), 2);
        assert_eq!(word_count("Překlad 1"), 2);
        assert_eq!(character_count("Překlad 1"), 9);
    }

    #[tokio::test]
    async fn get_or_create_is_lazy_and_stable() {
        let db = setup_db().await;
        let (key_id, language_id) = fixtures(&db).await;

        assert!(Translation::find_for_key(&db, key_id).await.unwrap().is_empty());

        let created = Translation::get_or_create(&db, key_id, language_id)
            .await
            .unwrap();
        assert_eq!(created.state, TranslationState::Untranslated);
        assert_eq!(created.text, None);
        assert_eq!(created.word_count, 0);

        let again = Translation::get_or_create(&db, key_id, language_id)
            .await
            .unwrap();
        assert_eq!(again.id, created.id);

        let listed = Translation::find_for_key(&db, key_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
    }

    #[tokio::test]
    async fn text_edits_flip_state_and_recount() {
        let db = setup_db().await;
        let (key_id, language_id) = fixtures(&db).await;

        let row = Translation::get_or_create(&db, key_id, language_id)
            .await
            .unwrap();

        let updated = Translation::set_text(&db, row.id, Some("Translation 2"))
            .await
            .unwrap();
        assert_eq!(updated.state, TranslationState::Translated);
        assert_eq!(updated.word_count, 2);
        assert_eq!(updated.character_count, 13);

        let reviewed = Translation::set_state(&db, row.id, TranslationState::Reviewed)
            .await
            .unwrap();
        assert_eq!(reviewed.state, TranslationState::Reviewed);

        // Editing a reviewed row sends it back to translated.
        let edited = Translation::set_text(&db, row.id, Some("Translation 3"))
            .await
            .unwrap();
        assert_eq!(edited.state, TranslationState::Translated);

        let cleared = Translation::set_text(&db, row.id, None).await.unwrap();
        assert_eq!(cleared.state, TranslationState::Untranslated);
        assert_eq!(cleared.text, None);
        assert_eq!(cleared.word_count, 0);
        assert_eq!(cleared.character_count, 0);
    }

    #[tokio::test]
    async fn outdated_flag_clears_on_edit() {
        let db = setup_db().await;
        let (key_id, language_id) = fixtures(&db).await;

        let row = Translation::get_or_create(&db, key_id, language_id)
            .await
            .unwrap();
        let flagged = Translation::set_outdated(&db, row.id, true).await.unwrap();
        assert!(flagged.outdated);

        let edited = Translation::set_text(&db, row.id, Some("Fresh text"))
            .await
            .unwrap();
        assert!(!edited.outdated);
    }
}
