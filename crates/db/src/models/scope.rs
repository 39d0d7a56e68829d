use std::collections::{HashMap, HashSet};

use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::{
    entities::{key, project, task, task_item, translation},
    models::{language, task::TaskError},
    types::{TaskState, TaskType, TranslationState},
};

/// Filters narrowing which candidate keys enter a task's scope. Fields are
/// OR-ed together; an unconfigured filter passes everything through.
#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct TranslationScopeFilters {
    pub filter_state: Option<Vec<TranslationState>>,
    pub filter_outdated: Option<bool>,
    pub filter_not_outdated: Option<bool>,
}

impl TranslationScopeFilters {
    fn is_empty(&self) -> bool {
        self.filter_state.as_ref().is_none_or(|states| states.is_empty())
            && self.filter_outdated != Some(true)
            && self.filter_not_outdated != Some(true)
    }

    /// Keys with no translation row evaluate against
    /// (`TranslationState::Untranslated`, outdated = false).
    fn passes(&self, state: TranslationState, outdated: bool) -> bool {
        if self.is_empty() {
            return true;
        }
        if let Some(states) = &self.filter_state
            && states.contains(&state)
        {
            return true;
        }
        if self.filter_outdated == Some(true) && outdated {
            return true;
        }
        if self.filter_not_outdated == Some(true) && !outdated {
            return true;
        }
        false
    }
}

/// Preview aggregation over a resolved candidate set. Word and character
/// sums come from the project base language.
#[derive(Debug, Clone, Serialize, TS)]
pub struct KeysScope {
    pub key_count: i64,
    pub word_count: i64,
    pub character_count: i64,
}

/// Resolved scope at row-id level, in first-seen candidate order.
pub(crate) struct ResolvedScope {
    pub key_row_ids: Vec<i64>,
    pub key_uuids: Vec<Uuid>,
}

/// Candidates that exist in the project, are not already covered by an
/// in-progress task of the same type in the same language, and pass the
/// filters. Order follows the first appearance of each candidate.
pub(crate) async fn resolve_rows<C: ConnectionTrait>(
    db: &C,
    project_row_id: i64,
    language_row_id: i64,
    task_type: TaskType,
    candidate_keys: &[Uuid],
    filters: &TranslationScopeFilters,
) -> Result<ResolvedScope, DbErr> {
    let mut seen = HashSet::new();
    let ordered: Vec<Uuid> = candidate_keys
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect();

    if ordered.is_empty() {
        return Ok(ResolvedScope {
            key_row_ids: Vec::new(),
            key_uuids: Vec::new(),
        });
    }

    let key_rows = key::Entity::find()
        .filter(key::Column::ProjectId.eq(project_row_id))
        .filter(key::Column::Uuid.is_in(ordered.iter().copied()))
        .all(db)
        .await?;
    let key_row_by_uuid: HashMap<Uuid, i64> =
        key_rows.iter().map(|row| (row.uuid, row.id)).collect();

    let translations = translation::Entity::find()
        .filter(translation::Column::LanguageId.eq(language_row_id))
        .filter(
            translation::Column::KeyId.is_in(key_rows.iter().map(|row| row.id)),
        )
        .all(db)
        .await?;
    let translation_by_key: HashMap<i64, &translation::Model> = translations
        .iter()
        .map(|model| (model.key_id, model))
        .collect();

    // A key is covered while an in-progress task of the same type holds an
    // item for its translation in this language. Tasks of other types or in
    // done/closed state never block.
    let blocking_task_ids: Vec<i64> = task::Entity::find()
        .select_only()
        .column(task::Column::Id)
        .filter(task::Column::State.eq(TaskState::InProgress))
        .filter(task::Column::TaskType.eq(task_type))
        .filter(task::Column::LanguageId.eq(language_row_id))
        .into_tuple()
        .all(db)
        .await?;

    let mut blocked: HashSet<i64> = HashSet::new();
    if !blocking_task_ids.is_empty() && !translations.is_empty() {
        let rows: Vec<i64> = task_item::Entity::find()
            .select_only()
            .column(task_item::Column::TranslationId)
            .filter(task_item::Column::TaskId.is_in(blocking_task_ids))
            .filter(
                task_item::Column::TranslationId
                    .is_in(translations.iter().map(|model| model.id)),
            )
            .into_tuple()
            .all(db)
            .await?;
        blocked.extend(rows);
    }

    let mut scope = ResolvedScope {
        key_row_ids: Vec::with_capacity(ordered.len()),
        key_uuids: Vec::with_capacity(ordered.len()),
    };
    for candidate in ordered {
        let Some(&key_row_id) = key_row_by_uuid.get(&candidate) else {
            continue;
        };
        let row = translation_by_key.get(&key_row_id);
        if let Some(model) = row
            && blocked.contains(&model.id)
        {
            continue;
        }
        let state = row.map(|model| model.state).unwrap_or_default();
        let outdated = row.map(|model| model.outdated).unwrap_or(false);
        if !filters.passes(state, outdated) {
            continue;
        }
        scope.key_row_ids.push(key_row_id);
        scope.key_uuids.push(candidate);
    }
    Ok(scope)
}

async fn validated_rows<C: ConnectionTrait>(
    db: &C,
    project_id: Uuid,
    language_id: Uuid,
) -> Result<(project::Model, i64), TaskError> {
    let project_row = project::Entity::find()
        .filter(project::Column::Uuid.eq(project_id))
        .one(db)
        .await?
        .ok_or(TaskError::ProjectNotFound)?;
    let language_row = language::live_row_in_project(db, project_row.id, language_id)
        .await?
        .ok_or(TaskError::LanguageNotFromProject)?;
    Ok((project_row, language_row.id))
}

/// Sum of base-language word/character counts over the given keys. Keys
/// without a base translation, or a project without a base language,
/// contribute zero.
pub(crate) async fn base_totals<C: ConnectionTrait>(
    db: &C,
    base_language_row_id: Option<i64>,
    key_row_ids: &[i64],
) -> Result<(i64, i64), DbErr> {
    let Some(base_id) = base_language_row_id else {
        return Ok((0, 0));
    };
    if key_row_ids.is_empty() {
        return Ok((0, 0));
    }

    let rows = translation::Entity::find()
        .filter(translation::Column::LanguageId.eq(base_id))
        .filter(translation::Column::KeyId.is_in(key_row_ids.iter().copied()))
        .all(db)
        .await?;
    Ok(rows.iter().fold((0, 0), |(words, chars), model| {
        (
            words + model.word_count as i64,
            chars + model.character_count as i64,
        )
    }))
}

/// Which of `candidate_keys` would a new task of this type and language
/// actually cover.
pub async fn resolve_keys_without_task<C: ConnectionTrait>(
    db: &C,
    project_id: Uuid,
    language_id: Uuid,
    task_type: TaskType,
    candidate_keys: &[Uuid],
    filters: &TranslationScopeFilters,
) -> Result<Vec<Uuid>, TaskError> {
    let (project_row, language_row_id) = validated_rows(db, project_id, language_id).await?;
    let scope = resolve_rows(
        db,
        project_row.id,
        language_row_id,
        task_type,
        candidate_keys,
        filters,
    )
    .await?;
    Ok(scope.key_uuids)
}

/// Preview the scope a create call would produce, without creating anything.
pub async fn calculate_scope<C: ConnectionTrait>(
    db: &C,
    project_id: Uuid,
    language_id: Uuid,
    task_type: TaskType,
    candidate_keys: &[Uuid],
    filters: &TranslationScopeFilters,
) -> Result<KeysScope, TaskError> {
    let (project_row, language_row_id) = validated_rows(db, project_id, language_id).await?;
    let scope = resolve_rows(
        db,
        project_row.id,
        language_row_id,
        task_type,
        candidate_keys,
        filters,
    )
    .await?;
    let (word_count, character_count) =
        base_totals(db, project_row.base_language_id, &scope.key_row_ids).await?;

    Ok(KeysScope {
        key_count: scope.key_uuids.len() as i64,
        word_count,
        character_count,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, Database, Set};
    use sea_orm_migration::MigratorTrait;

    use super::*;
    use crate::models::{
        ids,
        key::{CreateKey, Key},
        language::{CreateLanguage, Language},
        project::{CreateProject, Project},
        translation::Translation,
    };

    async fn setup_db() -> sea_orm::DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    struct Fixture {
        project_id: Uuid,
        language_id: Uuid,
        language_row_id: i64,
    }

    async fn fixture(db: &sea_orm::DatabaseConnection) -> Fixture {
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
                name: "Czech".to_string(),
                tag: "cs".to_string(),
            },
            language_id,
        )
        .await
        .unwrap();
        let language_row_id = ids::language_id_by_uuid(db, language_id)
            .await
            .unwrap()
            .unwrap();

        Fixture {
            project_id,
            language_id,
            language_row_id,
        }
    }

    async fn create_key(db: &sea_orm::DatabaseConnection, project_id: Uuid, name: &str) -> Uuid {
        let key_id = Uuid::new_v4();
        Key::create(
            db,
            &CreateKey {
                project_id,
                name: name.to_string(),
            },
            key_id,
        )
        .await
        .unwrap();
        key_id
    }

    /// Insert a bare task row with one item covering `translation_uuid`.
    async fn covering_task(
        db: &sea_orm::DatabaseConnection,
        fixture: &Fixture,
        task_type: TaskType,
        state: TaskState,
        number: i64,
        translation_uuid: Uuid,
    ) {
        let project_row_id = ids::project_id_by_uuid(db, fixture.project_id)
            .await
            .unwrap()
            .unwrap();
        let translation_row_id = ids::translation_id_by_uuid(db, translation_uuid)
            .await
            .unwrap()
            .unwrap();

        let now = Utc::now();
        let task_row = task::ActiveModel {
            project_id: Set(project_row_id),
            number: Set(number),
            name: Set(format!("Task {number}")),
            description: Set(None),
            task_type: Set(task_type),
            language_id: Set(fixture.language_row_id),
            due_date: Set(None),
            author_id: Set(None),
            state: Set(state),
            closed_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();

        task_item::ActiveModel {
            task_id: Set(task_row.id),
            translation_id: Set(translation_row_id),
            done: Set(false),
            done_by: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn in_progress_task_blocks_same_type_only() {
        let db = setup_db().await;
        let fx = fixture(&db).await;
        let key_id = create_key(&db, fx.project_id, "home.title").await;
        let translation = Translation::get_or_create(&db, key_id, fx.language_id)
            .await
            .unwrap();

        covering_task(
            &db,
            &fx,
            TaskType::Translate,
            TaskState::InProgress,
            1,
            translation.id,
        )
        .await;

        let filters = TranslationScopeFilters::default();
        let translate = resolve_keys_without_task(
            &db,
            fx.project_id,
            fx.language_id,
            TaskType::Translate,
            &[key_id],
            &filters,
        )
        .await
        .unwrap();
        assert!(translate.is_empty());

        let review = resolve_keys_without_task(
            &db,
            fx.project_id,
            fx.language_id,
            TaskType::Review,
            &[key_id],
            &filters,
        )
        .await
        .unwrap();
        assert_eq!(review, vec![key_id]);
    }

    #[tokio::test]
    async fn closed_tasks_do_not_block() {
        let db = setup_db().await;
        let fx = fixture(&db).await;
        let key_id = create_key(&db, fx.project_id, "home.title").await;
        let translation = Translation::get_or_create(&db, key_id, fx.language_id)
            .await
            .unwrap();

        covering_task(
            &db,
            &fx,
            TaskType::Translate,
            TaskState::Closed,
            1,
            translation.id,
        )
        .await;
        covering_task(
            &db,
            &fx,
            TaskType::Translate,
            TaskState::Done,
            2,
            translation.id,
        )
        .await;

        let resolved = resolve_keys_without_task(
            &db,
            fx.project_id,
            fx.language_id,
            TaskType::Translate,
            &[key_id],
            &TranslationScopeFilters::default(),
        )
        .await
        .unwrap();
        assert_eq!(resolved, vec![key_id]);
    }

    #[tokio::test]
    async fn filters_or_together_and_missing_rows_count_untranslated() {
        let db = setup_db().await;
        let fx = fixture(&db).await;

        let translated = create_key(&db, fx.project_id, "translated").await;
        let outdated = create_key(&db, fx.project_id, "outdated").await;
        let untouched = create_key(&db, fx.project_id, "untouched").await;

        let row = Translation::get_or_create(&db, translated, fx.language_id)
            .await
            .unwrap();
        Translation::set_text(&db, row.id, Some("Hotovo")).await.unwrap();

        let row = Translation::get_or_create(&db, outdated, fx.language_id)
            .await
            .unwrap();
        Translation::set_text(&db, row.id, Some("Starší text"))
            .await
            .unwrap();
        Translation::set_outdated(&db, row.id, true).await.unwrap();

        let candidates = [translated, outdated, untouched];

        // State filter alone.
        let resolved = resolve_keys_without_task(
            &db,
            fx.project_id,
            fx.language_id,
            TaskType::Translate,
            &candidates,
            &TranslationScopeFilters {
                filter_state: Some(vec![TranslationState::Untranslated]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(resolved, vec![untouched]);

        // Outdated OR state widens the set.
        let resolved = resolve_keys_without_task(
            &db,
            fx.project_id,
            fx.language_id,
            TaskType::Translate,
            &candidates,
            &TranslationScopeFilters {
                filter_state: Some(vec![TranslationState::Untranslated]),
                filter_outdated: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(resolved, vec![outdated, untouched]);

        // Unconfigured filters pass everything, in candidate order.
        let resolved = resolve_keys_without_task(
            &db,
            fx.project_id,
            fx.language_id,
            TaskType::Translate,
            &candidates,
            &TranslationScopeFilters::default(),
        )
        .await
        .unwrap();
        assert_eq!(resolved, vec![translated, outdated, untouched]);

        // A missing row is not outdated.
        let resolved = resolve_keys_without_task(
            &db,
            fx.project_id,
            fx.language_id,
            TaskType::Translate,
            &candidates,
            &TranslationScopeFilters {
                filter_not_outdated: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(resolved, vec![translated, untouched]);
    }

    #[tokio::test]
    async fn foreign_keys_are_dropped_and_duplicates_collapse() {
        let db = setup_db().await;
        let fx = fixture(&db).await;

        let other_project = Uuid::new_v4();
        Project::create(
            &db,
            &CreateProject {
                name: "Other".to_string(),
            },
            other_project,
        )
        .await
        .unwrap();
        let foreign_key = create_key(&db, other_project, "foreign").await;

        let first = create_key(&db, fx.project_id, "first").await;
        let second = create_key(&db, fx.project_id, "second").await;

        let resolved = resolve_keys_without_task(
            &db,
            fx.project_id,
            fx.language_id,
            TaskType::Translate,
            &[second, foreign_key, first, second, Uuid::new_v4()],
            &TranslationScopeFilters::default(),
        )
        .await
        .unwrap();
        assert_eq!(resolved, vec![second, first]);
    }

    #[tokio::test]
    async fn calculate_scope_sums_base_language_counts() {
        let db = setup_db().await;
        let fx = fixture(&db).await;

        let base_language = Uuid::new_v4();
        Language::create(
            &db,
            &CreateLanguage {
                project_id: fx.project_id,
                name: "English".to_string(),
                tag: "en".to_string(),
            },
            base_language,
        )
        .await
        .unwrap();
        Project::set_base_language(&db, fx.project_id, base_language)
            .await
            .unwrap();

        let with_base = create_key(&db, fx.project_id, "with-base").await;
        let without_base = create_key(&db, fx.project_id, "without-base").await;

        let row = Translation::get_or_create(&db, with_base, base_language)
            .await
            .unwrap();
        Translation::set_text(&db, row.id, Some("Translation 1"))
            .await
            .unwrap();

        let scope = calculate_scope(
            &db,
            fx.project_id,
            fx.language_id,
            TaskType::Translate,
            &[with_base, without_base],
            &TranslationScopeFilters::default(),
        )
        .await
        .unwrap();
        assert_eq!(scope.key_count, 2);
        assert_eq!(scope.word_count, 2);
        assert_eq!(scope.character_count, 13);
    }

    #[tokio::test]
    async fn soft_deleted_language_is_rejected() {
        let db = setup_db().await;
        let fx = fixture(&db).await;
        Language::soft_delete(&db, fx.language_id).await.unwrap();

        let err = resolve_keys_without_task(
            &db,
            fx.project_id,
            fx.language_id,
            TaskType::Translate,
            &[],
            &TranslationScopeFilters::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskError::LanguageNotFromProject));
    }
}
