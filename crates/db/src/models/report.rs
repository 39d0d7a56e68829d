use std::collections::{HashMap, HashSet};

use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect,
};
use serde::Serialize;
use ts_rs::TS;
use uuid::Uuid;

use crate::{
    entities::{language, project, task, task_assignee, task_item, translation, user_account},
    models::{
        ids,
        task::{Task, TaskError, TaskRef},
    },
    types::{TaskState, TaskType},
};

/// Aggregates for one task, derived at read time rather than stored on the
/// task row. Word and character figures are sums over the base-language
/// translations of the item keys; a key without a base translation
/// contributes zero.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ScopeCounts {
    pub total_items: i64,
    pub done_items: i64,
    pub base_word_count: i64,
    pub base_character_count: i64,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct TaskPerUserReport {
    pub user_id: Uuid,
    pub username: String,
    pub done_items: i64,
    pub base_word_count: i64,
    pub base_character_count: i64,
}

/// One in-progress task covering a translation, annotated for the editor
/// view.
#[derive(Debug, Clone, Serialize, TS)]
pub struct TranslationTask {
    pub number: i64,
    pub name: String,
    pub task_type: TaskType,
    pub done: bool,
    pub user_assigned: bool,
}

fn review_first(task_type: TaskType) -> u8 {
    match task_type {
        TaskType::Review => 0,
        TaskType::Translate => 1,
    }
}

/// Batched scope aggregation for a set of task rows. Every input task gets
/// an entry, zeroed when it has no items.
pub(crate) async fn scope_counts_for_tasks<C: ConnectionTrait>(
    db: &C,
    tasks: &[task::Model],
) -> Result<HashMap<i64, ScopeCounts>, DbErr> {
    let mut counts: HashMap<i64, ScopeCounts> = tasks
        .iter()
        .map(|record| (record.id, ScopeCounts::default()))
        .collect();
    if tasks.is_empty() {
        return Ok(counts);
    }

    let items = task_item::Entity::find()
        .filter(task_item::Column::TaskId.is_in(tasks.iter().map(|record| record.id)))
        .all(db)
        .await?;
    if items.is_empty() {
        return Ok(counts);
    }

    let key_by_translation: HashMap<i64, i64> = translation::Entity::find()
        .filter(translation::Column::Id.is_in(items.iter().map(|item| item.translation_id)))
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.id, row.key_id))
        .collect();

    let mut project_row_ids: Vec<i64> = tasks.iter().map(|record| record.project_id).collect();
    project_row_ids.sort_unstable();
    project_row_ids.dedup();
    let base_by_project: HashMap<i64, Option<i64>> = project::Entity::find()
        .filter(project::Column::Id.is_in(project_row_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.id, row.base_language_id))
        .collect();

    let base_language_ids: Vec<i64> = {
        let mut ids: Vec<i64> = base_by_project.values().copied().flatten().collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    };
    let base_counts: HashMap<(i64, i64), (i64, i64)> = if base_language_ids.is_empty() {
        HashMap::new()
    } else {
        translation::Entity::find()
            .filter(translation::Column::LanguageId.is_in(base_language_ids))
            .filter(translation::Column::KeyId.is_in(key_by_translation.values().copied()))
            .all(db)
            .await?
            .into_iter()
            .map(|row| {
                (
                    (row.key_id, row.language_id),
                    (i64::from(row.word_count), i64::from(row.character_count)),
                )
            })
            .collect()
    };

    let project_by_task: HashMap<i64, i64> = tasks
        .iter()
        .map(|record| (record.id, record.project_id))
        .collect();
    for item in items {
        let Some(entry) = counts.get_mut(&item.task_id) else {
            continue;
        };
        entry.total_items += 1;
        if item.done {
            entry.done_items += 1;
        }

        let base_language_id = project_by_task
            .get(&item.task_id)
            .and_then(|project_row_id| base_by_project.get(project_row_id))
            .copied()
            .flatten();
        if let Some(base_language_id) = base_language_id
            && let Some(key_row_id) = key_by_translation.get(&item.translation_id)
            && let Some(&(words, characters)) = base_counts.get(&(*key_row_id, base_language_id))
        {
            entry.base_word_count += words;
            entry.base_character_count += characters;
        }
    }

    Ok(counts)
}

/// Done items grouped by the user who marked them, with base-language
/// effort sums. Items whose author was cleared are skipped. Sorted by
/// username.
pub async fn per_user_report<C: ConnectionTrait>(
    db: &C,
    task_ref: &TaskRef,
) -> Result<Vec<TaskPerUserReport>, TaskError> {
    let record = Task::require_row(db, task_ref).await?;

    let items = task_item::Entity::find()
        .filter(task_item::Column::TaskId.eq(record.id))
        .filter(task_item::Column::Done.eq(true))
        .filter(task_item::Column::DoneBy.is_not_null())
        .all(db)
        .await?;
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let key_by_translation: HashMap<i64, i64> = translation::Entity::find()
        .filter(translation::Column::Id.is_in(items.iter().map(|item| item.translation_id)))
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.id, row.key_id))
        .collect();

    let base_language_id = project::Entity::find_by_id(record.project_id)
        .one(db)
        .await?
        .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?
        .base_language_id;
    let base_counts: HashMap<i64, (i64, i64)> = match base_language_id {
        Some(language_row_id) => translation::Entity::find()
            .filter(translation::Column::LanguageId.eq(language_row_id))
            .filter(translation::Column::KeyId.is_in(key_by_translation.values().copied()))
            .all(db)
            .await?
            .into_iter()
            .map(|row| {
                (
                    row.key_id,
                    (i64::from(row.word_count), i64::from(row.character_count)),
                )
            })
            .collect(),
        None => HashMap::new(),
    };

    let mut by_user: HashMap<i64, (i64, i64, i64)> = HashMap::new();
    for item in &items {
        let Some(user_row_id) = item.done_by else {
            continue;
        };
        let (words, characters) = key_by_translation
            .get(&item.translation_id)
            .and_then(|key_row_id| base_counts.get(key_row_id))
            .copied()
            .unwrap_or((0, 0));
        let entry = by_user.entry(user_row_id).or_default();
        entry.0 += 1;
        entry.1 += words;
        entry.2 += characters;
    }

    let users = user_account::Entity::find()
        .filter(user_account::Column::Id.is_in(by_user.keys().copied()))
        .all(db)
        .await?;
    let mut report: Vec<TaskPerUserReport> = users
        .into_iter()
        .filter_map(|user| {
            by_user
                .get(&user.id)
                .map(|&(done_items, base_word_count, base_character_count)| TaskPerUserReport {
                    user_id: user.uuid,
                    username: user.username,
                    done_items,
                    base_word_count,
                    base_character_count,
                })
        })
        .collect();
    report.sort_by(|a, b| a.username.cmp(&b.username));
    Ok(report)
}

/// The editor view: for each requested translation, the in-progress tasks
/// covering it, REVIEW before TRANSLATE, higher numbers first. Translations
/// that do not resolve are omitted; resolved ones without tasks map to an
/// empty list. Tasks of soft-deleted languages stay hidden.
pub async fn tasks_for_translations<C: ConnectionTrait>(
    db: &C,
    acting_user_id: Uuid,
    translation_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<TranslationTask>>, DbErr> {
    if translation_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let translation_rows = translation::Entity::find()
        .filter(translation::Column::Uuid.is_in(translation_ids.iter().copied()))
        .all(db)
        .await?;
    let mut views: HashMap<Uuid, Vec<TranslationTask>> = translation_rows
        .iter()
        .map(|row| (row.uuid, Vec::new()))
        .collect();
    if translation_rows.is_empty() {
        return Ok(views);
    }
    let uuid_by_row: HashMap<i64, Uuid> = translation_rows
        .iter()
        .map(|row| (row.id, row.uuid))
        .collect();

    let items = task_item::Entity::find()
        .filter(task_item::Column::TranslationId.is_in(uuid_by_row.keys().copied()))
        .all(db)
        .await?;
    if items.is_empty() {
        return Ok(views);
    }

    let live_language_ids: Vec<i64> = language::Entity::find()
        .select_only()
        .column(language::Column::Id)
        .filter(language::Column::DeletedAt.is_null())
        .into_tuple()
        .all(db)
        .await?;
    let task_rows = task::Entity::find()
        .filter(task::Column::Id.is_in(items.iter().map(|item| item.task_id)))
        .filter(task::Column::State.eq(TaskState::InProgress))
        .filter(task::Column::LanguageId.is_in(live_language_ids))
        .all(db)
        .await?;
    let task_by_row: HashMap<i64, &task::Model> =
        task_rows.iter().map(|row| (row.id, row)).collect();

    let assigned: HashSet<i64> = match ids::user_account_id_by_uuid(db, acting_user_id).await? {
        Some(user_row_id) => task_assignee::Entity::find()
            .select_only()
            .column(task_assignee::Column::TaskId)
            .filter(task_assignee::Column::TaskId.is_in(task_by_row.keys().copied()))
            .filter(task_assignee::Column::UserId.eq(user_row_id))
            .into_tuple()
            .all(db)
            .await?
            .into_iter()
            .collect(),
        None => HashSet::new(),
    };

    for item in &items {
        let Some(record) = task_by_row.get(&item.task_id) else {
            continue;
        };
        let Some(translation_uuid) = uuid_by_row.get(&item.translation_id) else {
            continue;
        };
        if let Some(list) = views.get_mut(translation_uuid) {
            list.push(TranslationTask {
                number: record.number,
                name: record.name.clone(),
                task_type: record.task_type,
                done: item.done,
                user_assigned: assigned.contains(&record.id),
            });
        }
    }
    for list in views.values_mut() {
        list.sort_by(|a, b| {
            review_first(a.task_type)
                .cmp(&review_first(b.task_type))
                .then(b.number.cmp(&a.number))
        });
    }
    Ok(views)
}

/// Types of in-progress tasks covering the translation on which the user is
/// an assignee. Deduplicated, REVIEW first. Feeds edit-time gating.
pub async fn assigned_task_types<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    translation_id: Uuid,
) -> Result<Vec<TaskType>, DbErr> {
    let Some(user_row_id) = ids::user_account_id_by_uuid(db, user_id).await? else {
        return Ok(Vec::new());
    };
    let Some(translation_row_id) = ids::translation_id_by_uuid(db, translation_id).await? else {
        return Ok(Vec::new());
    };

    let covering_task_ids: Vec<i64> = task_item::Entity::find()
        .select_only()
        .column(task_item::Column::TaskId)
        .filter(task_item::Column::TranslationId.eq(translation_row_id))
        .into_tuple()
        .all(db)
        .await?;
    if covering_task_ids.is_empty() {
        return Ok(Vec::new());
    }
    let assigned_task_ids: Vec<i64> = task_assignee::Entity::find()
        .select_only()
        .column(task_assignee::Column::TaskId)
        .filter(task_assignee::Column::TaskId.is_in(covering_task_ids))
        .filter(task_assignee::Column::UserId.eq(user_row_id))
        .into_tuple()
        .all(db)
        .await?;
    if assigned_task_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut types: Vec<TaskType> = task::Entity::find()
        .select_only()
        .column(task::Column::TaskType)
        .filter(task::Column::Id.is_in(assigned_task_ids))
        .filter(task::Column::State.eq(TaskState::InProgress))
        .into_tuple()
        .all(db)
        .await?;
    types.sort_by_key(|task_type| review_first(*task_type));
    types.dedup();
    Ok(types)
}

#[cfg(test)]
mod tests {
    use sea_orm::{Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;

    use super::*;
    use crate::{
        models::{
            key::{CreateKey, Key},
            language::{CreateLanguage, Language},
            project::{CreateProject, Project},
            project_member::ProjectMember,
            scope::TranslationScopeFilters,
            task::{CreateTask, TaskWithScope},
            task_item::TaskItem,
            translation::Translation,
            user_account::{CreateUserAccount, UserAccount},
        },
        types::ProjectScope,
    };

    async fn setup_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    struct Fixture {
        project_id: Uuid,
        target_language: Uuid,
        author: Uuid,
        assignee: Uuid,
        key_one: Uuid,
        key_two: Uuid,
        key_three: Uuid,
    }

    async fn fixture(db: &DatabaseConnection) -> Fixture {
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

        let base_language = Uuid::new_v4();
        let target_language = Uuid::new_v4();
        for (id, name, tag) in [
            (base_language, "English", "en"),
            (target_language, "Czech", "cs"),
        ] {
            Language::create(
                db,
                &CreateLanguage {
                    project_id,
                    name: name.to_string(),
                    tag: tag.to_string(),
                },
                id,
            )
            .await
            .unwrap();
        }
        Project::set_base_language(db, project_id, base_language)
            .await
            .unwrap();

        let author = Uuid::new_v4();
        let assignee = Uuid::new_v4();
        for (id, username) in [(author, "bruno"), (assignee, "anna")] {
            UserAccount::create(
                db,
                &CreateUserAccount {
                    username: username.to_string(),
                    display_name: None,
                },
                id,
            )
            .await
            .unwrap();
            ProjectMember::add(
                db,
                project_id,
                id,
                &[ProjectScope::TasksView, ProjectScope::TasksEdit],
            )
            .await
            .unwrap();
        }

        let key_one = Uuid::new_v4();
        let key_two = Uuid::new_v4();
        let key_three = Uuid::new_v4();
        for (id, name) in [
            (key_one, "home.title"),
            (key_two, "home.subtitle"),
            (key_three, "home.footnote"),
        ] {
            Key::create(
                db,
                &CreateKey {
                    project_id,
                    name: name.to_string(),
                },
                id,
            )
            .await
            .unwrap();
        }

        // key_three intentionally has no base text.
        for (key_id, text) in [(key_one, "Hello"), (key_two, "Good morning")] {
            let row = Translation::get_or_create(db, key_id, base_language)
                .await
                .unwrap();
            Translation::set_text(db, row.id, Some(text)).await.unwrap();
        }

        Fixture {
            project_id,
            target_language,
            author,
            assignee,
            key_one,
            key_two,
            key_three,
        }
    }

    async fn create_task(
        db: &DatabaseConnection,
        fx: &Fixture,
        name: &str,
        task_type: TaskType,
        keys: Vec<Uuid>,
    ) -> TaskWithScope {
        Task::create(
            db,
            fx.project_id,
            &CreateTask {
                name: name.to_string(),
                description: None,
                task_type,
                language_id: fx.target_language,
                due_date: None,
                assignees: vec![fx.assignee],
                keys,
            },
            &TranslationScopeFilters::default(),
            fx.author,
        )
        .await
        .unwrap()
    }

    async fn target_translation_id(db: &DatabaseConnection, fx: &Fixture, key_id: Uuid) -> Uuid {
        Translation::find_for_key(db, key_id)
            .await
            .unwrap()
            .into_iter()
            .find(|row| row.language_id == fx.target_language)
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn per_user_report_groups_done_items() {
        let db = setup_db().await;
        let fx = fixture(&db).await;

        let created = create_task(&db, &fx, "Translate homepage", TaskType::Translate, vec![
            fx.key_one, fx.key_two, fx.key_three,
        ])
        .await;
        let task_ref = created.task_ref();

        let empty = per_user_report(&db, &task_ref).await.unwrap();
        assert!(empty.is_empty());

        TaskItem::set_done(&db, &task_ref, fx.key_one, true, fx.author)
            .await
            .unwrap();
        TaskItem::set_done(&db, &task_ref, fx.key_three, true, fx.author)
            .await
            .unwrap();
        TaskItem::set_done(&db, &task_ref, fx.key_two, true, fx.assignee)
            .await
            .unwrap();

        let report = per_user_report(&db, &task_ref).await.unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].username, "anna");
        assert_eq!(report[0].user_id, fx.assignee);
        assert_eq!(report[0].done_items, 1);
        assert_eq!(report[0].base_word_count, 2);
        assert_eq!(report[0].base_character_count, 12);
        // key_three has no base translation and contributes zero effort.
        assert_eq!(report[1].username, "bruno");
        assert_eq!(report[1].done_items, 2);
        assert_eq!(report[1].base_word_count, 1);
        assert_eq!(report[1].base_character_count, 5);

        TaskItem::set_done(&db, &task_ref, fx.key_two, false, fx.assignee)
            .await
            .unwrap();
        let report = per_user_report(&db, &task_ref).await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].username, "bruno");

        let missing = per_user_report(&db, &TaskRef {
            project_id: fx.project_id,
            number: 99,
        })
        .await
        .unwrap_err();
        assert!(matches!(missing, TaskError::TaskNotFound));
    }

    #[tokio::test]
    async fn translation_views_cover_in_progress_tasks_only() {
        let db = setup_db().await;
        let fx = fixture(&db).await;

        let translate = create_task(&db, &fx, "Translate homepage", TaskType::Translate, vec![
            fx.key_one, fx.key_two,
        ])
        .await;
        let review =
            create_task(&db, &fx, "Review homepage", TaskType::Review, vec![fx.key_one]).await;

        let t_one = target_translation_id(&db, &fx, fx.key_one).await;
        let t_two = target_translation_id(&db, &fx, fx.key_two).await;
        let unknown = Uuid::new_v4();

        let views = tasks_for_translations(&db, fx.assignee, &[t_one, t_two, unknown])
            .await
            .unwrap();
        assert_eq!(views.len(), 2);
        assert!(!views.contains_key(&unknown));

        let one = &views[&t_one];
        assert_eq!(one.len(), 2);
        assert_eq!(one[0].number, review.number);
        assert_eq!(one[0].task_type, TaskType::Review);
        assert!(one[0].user_assigned);
        assert_eq!(one[1].number, translate.number);
        assert!(!one[0].done);

        let two = &views[&t_two];
        assert_eq!(two.len(), 1);
        assert_eq!(two[0].name, "Translate homepage");

        // A watcher who is not assigned sees the tasks unannotated.
        let views = tasks_for_translations(&db, fx.author, &[t_one]).await.unwrap();
        assert!(views[&t_one].iter().all(|view| !view.user_assigned));

        // Done tasks drop out; the item's done flag shows up before that.
        TaskItem::set_done(&db, &translate.task_ref(), fx.key_two, true, fx.assignee)
            .await
            .unwrap();
        let views = tasks_for_translations(&db, fx.assignee, &[t_two]).await.unwrap();
        assert!(views[&t_two][0].done);

        Task::finish(&db, &review.task_ref(), fx.author)
            .await
            .unwrap();
        let views = tasks_for_translations(&db, fx.assignee, &[t_one]).await.unwrap();
        assert_eq!(views[&t_one].len(), 1);
        assert_eq!(views[&t_one][0].task_type, TaskType::Translate);

        // Soft-deleting the language hides its tasks but keeps the entries.
        Language::soft_delete(&db, fx.target_language).await.unwrap();
        let views = tasks_for_translations(&db, fx.assignee, &[t_one, t_two])
            .await
            .unwrap();
        assert!(views[&t_one].is_empty());
        assert!(views[&t_two].is_empty());
    }

    #[tokio::test]
    async fn assigned_types_deduplicate_and_put_review_first() {
        let db = setup_db().await;
        let fx = fixture(&db).await;

        let first = create_task(&db, &fx, "Translate A", TaskType::Translate, vec![fx.key_one])
            .await;
        create_task(&db, &fx, "Review A", TaskType::Review, vec![fx.key_one]).await;

        // Membership editing does not re-run scope blocking, so a second
        // translate task can cover the same key.
        let second = create_task(&db, &fx, "Translate B", TaskType::Translate, vec![]).await;
        Task::update_items(
            &db,
            &second.task_ref(),
            &[fx.key_one],
            &[],
            fx.author,
        )
        .await
        .unwrap();

        let t_one = target_translation_id(&db, &fx, fx.key_one).await;

        let types = assigned_task_types(&db, fx.assignee, t_one).await.unwrap();
        assert_eq!(types, vec![TaskType::Review, TaskType::Translate]);

        let none = assigned_task_types(&db, fx.author, t_one).await.unwrap();
        assert!(none.is_empty());

        let unknown_user = assigned_task_types(&db, Uuid::new_v4(), t_one).await.unwrap();
        assert!(unknown_user.is_empty());

        // Finishing one translate task keeps the type alive through the
        // other; finishing both drops it.
        Task::finish(&db, &first.task_ref(), fx.author)
            .await
            .unwrap();
        let types = assigned_task_types(&db, fx.assignee, t_one).await.unwrap();
        assert_eq!(types, vec![TaskType::Review, TaskType::Translate]);
        Task::finish(&db, &second.task_ref(), fx.author)
            .await
            .unwrap();
        let types = assigned_task_types(&db, fx.assignee, t_one).await.unwrap();
        assert_eq!(types, vec![TaskType::Review]);
    }
}
