use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::sea_query::{Expr, ExprTrait, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionSession, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

pub use crate::types::{TaskState, TaskType};

use crate::{
    entities::{key, language, task, task_assignee, task_item, translation, user_account},
    events::{EVENT_TASK_CREATED, EVENT_TASK_DELETED, EVENT_TASK_UPDATED, TaskEventPayload},
    models::{
        event_outbox::EventOutbox,
        ids,
        language::live_row_in_project,
        project_member::ProjectMember,
        report,
        scope::{self, TranslationScopeFilters},
        translation::Translation,
    },
    retry::{is_busy, is_unique_violation},
};

/// Number allocation retries with a fresh transaction per attempt; the unique
/// index on (project_id, number) is the arbiter under contention.
const MAX_NUMBER_ATTEMPTS: u32 = 100;
const INITIAL_BACKOFF_MS: u64 = 50;
const MAX_BACKOFF_MS: u64 = 1_000;

const MAX_NAME_LENGTH: usize = 255;
const MAX_DESCRIPTION_LENGTH: usize = 2_000;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Project not found")]
    ProjectNotFound,
    #[error("Task not found")]
    TaskNotFound,
    #[error("Translation not found")]
    TranslationNotFound,
    #[error("Language does not belong to the project")]
    LanguageNotFromProject,
    #[error("User {0} has no access to the project")]
    UserHasNoProjectAccess(Uuid),
    #[error("{0}")]
    InvalidInput(String),
}

/// A task's external identity. Tasks carry no uuid of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
pub struct TaskRef {
    pub project_id: Uuid,
    pub number: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Task {
    pub project_id: Uuid,
    pub number: i64,
    pub name: String,
    pub description: Option<String>,
    pub task_type: TaskType,
    pub language_id: Uuid,
    pub due_date: Option<DateTime<Utc>>,
    pub author: Option<Uuid>,
    pub state: TaskState,
    pub closed_at: Option<DateTime<Utc>>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

/// A task decorated with assignees and aggregate scope figures. Word and
/// character counts always come from the project base language.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct TaskWithScope {
    #[serde(flatten)]
    #[ts(flatten)]
    pub task: Task,
    pub assignees: Vec<Uuid>,
    pub total_items: i64,
    pub done_items: i64,
    pub base_word_count: i64,
    pub base_character_count: i64,
}

impl std::ops::Deref for TaskWithScope {
    type Target = Task;
    fn deref(&self) -> &Self::Target {
        &self.task
    }
}

impl std::ops::DerefMut for TaskWithScope {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.task
    }
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateTask {
    pub name: String,
    pub description: Option<String>,
    pub task_type: TaskType,
    pub language_id: Uuid,
    /// Epoch milliseconds.
    pub due_date: Option<i64>,
    pub assignees: Vec<Uuid>,
    pub keys: Vec<Uuid>,
}

/// Patch payload; `None` fields keep their current values. A negative
/// `due_date` clears the stored date.
#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateTask {
    pub name: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<i64>,
    pub assignees: Option<Vec<Uuid>>,
    pub state: Option<TaskState>,
}

/// Listing filters; fields are AND-ed together, values within a field are
/// an IN set.
#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct TaskFilters {
    pub filter_state: Option<Vec<TaskState>>,
    pub filter_not_state: Option<Vec<TaskState>>,
    pub filter_type: Option<Vec<TaskType>>,
    pub filter_language: Option<Vec<Uuid>>,
    pub filter_assignee: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

struct CreateAttempt<'a> {
    project_row_id: i64,
    project_id: Uuid,
    language_row_id: i64,
    author_row_id: i64,
    due_date: Option<DateTime<Utc>>,
    assignee_row_ids: &'a [i64],
    key_row_ids: &'a [i64],
    data: &'a CreateTask,
    actor_id: Uuid,
}

fn task_payload(
    project_id: Uuid,
    number: i64,
    actor_id: Option<Uuid>,
) -> Result<serde_json::Value, DbErr> {
    serde_json::to_value(TaskEventPayload {
        project_id,
        number,
        actor_id,
    })
    .map_err(|err| DbErr::Custom(err.to_string()))
}

fn validate_name(name: &str) -> Result<(), TaskError> {
    if name.trim().is_empty() {
        return Err(TaskError::InvalidInput(
            "Task name must not be blank".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(TaskError::InvalidInput(format!(
            "Task name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), TaskError> {
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(TaskError::InvalidInput(format!(
            "Task description must be at most {MAX_DESCRIPTION_LENGTH} characters"
        )));
    }
    Ok(())
}

fn due_date_from_millis(millis: i64) -> Result<DateTime<Utc>, TaskError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| TaskError::InvalidInput(format!("Invalid due date timestamp: {millis}")))
}

impl Task {
    pub fn task_ref(&self) -> TaskRef {
        TaskRef {
            project_id: self.project_id,
            number: self.number,
        }
    }

    async fn from_model<C: ConnectionTrait>(db: &C, model: task::Model) -> Result<Self, DbErr> {
        let project_id = ids::project_uuid_by_id(db, model.project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        let language_id = ids::language_uuid_by_id(db, model.language_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Language not found".to_string()))?;
        let author = match model.author_id {
            Some(id) => ids::user_account_uuid_by_id(db, id)
                .await?
                .ok_or(DbErr::RecordNotFound("User not found".to_string()))
                .map(Some)?,
            None => None,
        };

        Ok(Self {
            project_id,
            number: model.number,
            name: model.name,
            description: model.description,
            task_type: model.task_type,
            language_id,
            due_date: model.due_date.map(Into::into),
            author,
            state: model.state,
            closed_at: model.closed_at.map(Into::into),
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }

    pub(crate) async fn find_row<C: ConnectionTrait>(
        db: &C,
        task_ref: &TaskRef,
    ) -> Result<Option<task::Model>, DbErr> {
        let Some(project_row_id) = ids::project_id_by_uuid(db, task_ref.project_id).await? else {
            return Ok(None);
        };

        task::Entity::find()
            .filter(task::Column::ProjectId.eq(project_row_id))
            .filter(task::Column::Number.eq(task_ref.number))
            .one(db)
            .await
    }

    pub(crate) async fn require_row<C: ConnectionTrait>(
        db: &C,
        task_ref: &TaskRef,
    ) -> Result<task::Model, TaskError> {
        Self::find_row(db, task_ref)
            .await?
            .ok_or(TaskError::TaskNotFound)
    }

    async fn validated_assignee_rows<C: ConnectionTrait>(
        db: &C,
        project_row_id: i64,
        assignees: &[Uuid],
    ) -> Result<Vec<i64>, TaskError> {
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(assignees.len());
        for user_id in assignees.iter().copied().filter(|id| seen.insert(*id)) {
            let user_row_id = ids::user_account_id_by_uuid(db, user_id)
                .await?
                .ok_or(TaskError::UserHasNoProjectAccess(user_id))?;
            if !ProjectMember::is_member_row(db, project_row_id, user_row_id).await? {
                return Err(TaskError::UserHasNoProjectAccess(user_id));
            }
            rows.push(user_row_id);
        }
        Ok(rows)
    }

    async fn next_number<C: ConnectionTrait>(db: &C, project_row_id: i64) -> Result<i64, DbErr> {
        let top: Option<i64> = task::Entity::find()
            .select_only()
            .column(task::Column::Number)
            .filter(task::Column::ProjectId.eq(project_row_id))
            .order_by_desc(task::Column::Number)
            .into_tuple()
            .one(db)
            .await?;
        Ok(top.unwrap_or(0) + 1)
    }

    async fn insert_attempt<C: ConnectionTrait>(
        tx: &C,
        attempt: &CreateAttempt<'_>,
    ) -> Result<i64, TaskError> {
        let number = Self::next_number(tx, attempt.project_row_id).await?;

        let now = Utc::now();
        let task_row = task::ActiveModel {
            project_id: Set(attempt.project_row_id),
            number: Set(number),
            name: Set(attempt.data.name.clone()),
            description: Set(attempt.data.description.clone()),
            task_type: Set(attempt.data.task_type),
            language_id: Set(attempt.language_row_id),
            due_date: Set(attempt.due_date.map(Into::into)),
            author_id: Set(Some(attempt.author_row_id)),
            state: Set(TaskState::InProgress),
            closed_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        }
        .insert(tx)
        .await?;

        for user_row_id in attempt.assignee_row_ids {
            task_assignee::ActiveModel {
                task_id: Set(task_row.id),
                user_id: Set(*user_row_id),
                ..Default::default()
            }
            .insert(tx)
            .await?;
        }

        for key_row_id in attempt.key_row_ids {
            let translation_row =
                Translation::get_or_create_row(tx, *key_row_id, attempt.language_row_id).await?;
            task_item::ActiveModel {
                task_id: Set(task_row.id),
                translation_id: Set(translation_row.id),
                done: Set(false),
                done_by: Set(None),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
                ..Default::default()
            }
            .insert(tx)
            .await?;
        }

        let payload = task_payload(attempt.project_id, number, Some(attempt.actor_id))?;
        EventOutbox::enqueue(tx, EVENT_TASK_CREATED, "task", payload).await?;
        Ok(number)
    }

    /// Create a task: validate, resolve the scope, then insert the task row,
    /// assignee links, item links and the outbox event in one transaction.
    /// The transaction is retried from scratch when the allocated number
    /// collides or the store reports busy.
    pub async fn create<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        project_id: Uuid,
        data: &CreateTask,
        filters: &TranslationScopeFilters,
        acting_user_id: Uuid,
    ) -> Result<TaskWithScope, TaskError> {
        validate_name(&data.name)?;
        if let Some(description) = data.description.as_deref() {
            validate_description(description)?;
        }

        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(TaskError::ProjectNotFound)?;
        let language_row = live_row_in_project(db, project_row_id, data.language_id)
            .await?
            .ok_or(TaskError::LanguageNotFromProject)?;
        let author_row_id = ids::user_account_id_by_uuid(db, acting_user_id)
            .await?
            .ok_or(TaskError::UserHasNoProjectAccess(acting_user_id))?;
        let assignee_row_ids =
            Self::validated_assignee_rows(db, project_row_id, &data.assignees).await?;
        let due_date = data.due_date.map(due_date_from_millis).transpose()?;
        let resolved = scope::resolve_rows(
            db,
            project_row_id,
            language_row.id,
            data.task_type,
            &data.keys,
            filters,
        )
        .await?;

        let attempt = CreateAttempt {
            project_row_id,
            project_id,
            language_row_id: language_row.id,
            author_row_id,
            due_date,
            assignee_row_ids: &assignee_row_ids,
            key_row_ids: &resolved.key_row_ids,
            data,
            actor_id: acting_user_id,
        };

        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut last_err = None;
        for attempt_no in 1..=MAX_NUMBER_ATTEMPTS {
            let tx = db.begin().await?;
            match Self::insert_attempt(&tx, &attempt).await {
                Ok(number) => {
                    tx.commit().await?;
                    return Self::get(db, &TaskRef { project_id, number }).await;
                }
                Err(TaskError::Database(err)) if is_unique_violation(&err) => {
                    tx.rollback().await?;
                    tracing::debug!(
                        "task number contention in project {project_id}, attempt {attempt_no}: {err}"
                    );
                    last_err = Some(err);
                }
                Err(TaskError::Database(err)) if is_busy(&err) => {
                    tx.rollback().await?;
                    tracing::debug!(
                        "store busy creating task in project {project_id}, attempt {attempt_no}: {err}"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = Ord::min(backoff_ms * 2, MAX_BACKOFF_MS);
                    last_err = Some(err);
                }
                Err(err) => {
                    tx.rollback().await?;
                    return Err(err);
                }
            }
        }

        tracing::warn!(
            "task creation in project {project_id} exhausted {MAX_NUMBER_ATTEMPTS} attempts"
        );
        Err(TaskError::Database(last_err.unwrap_or_else(|| {
            DbErr::Custom("Task number allocation ran out of attempts".to_string())
        })))
    }

    /// Sequential creates sharing one filter set; the first failure aborts
    /// and already-created tasks stay.
    pub async fn create_many<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        project_id: Uuid,
        items: &[CreateTask],
        filters: &TranslationScopeFilters,
        acting_user_id: Uuid,
    ) -> Result<Vec<TaskWithScope>, TaskError> {
        let mut created = Vec::with_capacity(items.len());
        for data in items {
            created.push(Self::create(db, project_id, data, filters, acting_user_id).await?);
        }
        Ok(created)
    }

    /// Decorate task rows with assignees and scope counts, preserving the
    /// input order. Counts are prefetched in batches, one query set for the
    /// whole page.
    pub(crate) async fn with_scope_many<C: ConnectionTrait>(
        db: &C,
        models: Vec<task::Model>,
    ) -> Result<Vec<TaskWithScope>, DbErr> {
        if models.is_empty() {
            return Ok(Vec::new());
        }

        let counts = report::scope_counts_for_tasks(db, &models).await?;

        let assignee_rows = task_assignee::Entity::find()
            .filter(task_assignee::Column::TaskId.is_in(models.iter().map(|model| model.id)))
            .order_by_asc(task_assignee::Column::Id)
            .all(db)
            .await?;
        let mut user_row_ids: Vec<i64> = assignee_rows.iter().map(|row| row.user_id).collect();
        user_row_ids.sort_unstable();
        user_row_ids.dedup();
        let user_uuid_by_row: HashMap<i64, Uuid> = if user_row_ids.is_empty() {
            HashMap::new()
        } else {
            user_account::Entity::find()
                .filter(user_account::Column::Id.is_in(user_row_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|user| (user.id, user.uuid))
                .collect()
        };
        let mut assignees_by_task: HashMap<i64, Vec<Uuid>> = HashMap::new();
        for row in assignee_rows {
            if let Some(&user_uuid) = user_uuid_by_row.get(&row.user_id) {
                assignees_by_task
                    .entry(row.task_id)
                    .or_default()
                    .push(user_uuid);
            }
        }

        let mut tasks = Vec::with_capacity(models.len());
        for model in models {
            let row_id = model.id;
            let task = Self::from_model(db, model).await?;
            let scope = counts.get(&row_id).copied().unwrap_or_default();
            tasks.push(TaskWithScope {
                task,
                assignees: assignees_by_task.remove(&row_id).unwrap_or_default(),
                total_items: scope.total_items,
                done_items: scope.done_items,
                base_word_count: scope.base_word_count,
                base_character_count: scope.base_character_count,
            });
        }
        Ok(tasks)
    }

    async fn with_scope_one<C: ConnectionTrait>(
        db: &C,
        model: task::Model,
    ) -> Result<TaskWithScope, DbErr> {
        let mut decorated = Self::with_scope_many(db, vec![model]).await?;
        decorated
            .pop()
            .ok_or_else(|| DbErr::Custom("Scope decoration dropped the task".to_string()))
    }

    /// Fetch by composite identity. Resolves even when the task's language
    /// has been soft-deleted.
    pub async fn get<C: ConnectionTrait>(
        db: &C,
        task_ref: &TaskRef,
    ) -> Result<TaskWithScope, TaskError> {
        let record = Self::require_row(db, task_ref).await?;
        Ok(Self::with_scope_one(db, record).await?)
    }

    async fn apply_filters<C: ConnectionTrait>(
        db: &C,
        mut query: Select<task::Entity>,
        filters: &TaskFilters,
    ) -> Result<Select<task::Entity>, DbErr> {
        if let Some(states) = &filters.filter_state
            && !states.is_empty()
        {
            query = query.filter(task::Column::State.is_in(states.iter().copied()));
        }
        if let Some(states) = &filters.filter_not_state
            && !states.is_empty()
        {
            query = query.filter(task::Column::State.is_not_in(states.iter().copied()));
        }
        if let Some(types) = &filters.filter_type
            && !types.is_empty()
        {
            query = query.filter(task::Column::TaskType.is_in(types.iter().copied()));
        }
        if let Some(languages) = &filters.filter_language
            && !languages.is_empty()
        {
            let mut rows = Vec::with_capacity(languages.len());
            for language_id in languages {
                if let Some(row_id) = ids::language_id_by_uuid(db, *language_id).await? {
                    rows.push(row_id);
                }
            }
            query = query.filter(task::Column::LanguageId.is_in(rows));
        }
        if let Some(users) = &filters.filter_assignee
            && !users.is_empty()
        {
            let mut rows = Vec::with_capacity(users.len());
            for user_id in users {
                if let Some(row_id) = ids::user_account_id_by_uuid(db, *user_id).await? {
                    rows.push(row_id);
                }
            }
            query = query.filter(
                task::Column::Id.in_subquery(
                    Query::select()
                        .column(task_assignee::Column::TaskId)
                        .from(task_assignee::Entity)
                        .and_where(Expr::col(task_assignee::Column::UserId).is_in(rows))
                        .to_owned(),
                ),
            );
        }
        Ok(query)
    }

    fn apply_search(query: Select<task::Entity>, search: Option<&str>) -> Select<task::Entity> {
        match search.map(str::trim).filter(|term| !term.is_empty()) {
            Some(term) => query.filter(task::Column::Name.contains(term)),
            None => query,
        }
    }

    /// Listings hide tasks whose language was soft-deleted; direct `get`
    /// still resolves them.
    fn only_live_languages(query: Select<task::Entity>) -> Select<task::Entity> {
        query.filter(
            task::Column::LanguageId.in_subquery(
                Query::select()
                    .column(language::Column::Id)
                    .from(language::Entity)
                    .and_where(Expr::col(language::Column::DeletedAt).is_null())
                    .to_owned(),
            ),
        )
    }

    async fn fetch_page<C: ConnectionTrait>(
        db: &C,
        query: Select<task::Entity>,
        page: u64,
        page_size: u64,
    ) -> Result<Page<TaskWithScope>, TaskError> {
        let page_size = Ord::max(page_size, 1);
        let paginator = query.paginate(db, page_size);
        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page).await?;
        let items = Self::with_scope_many(db, models).await?;
        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    pub async fn list<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        filters: &TaskFilters,
        search: Option<&str>,
        page: u64,
        page_size: u64,
    ) -> Result<Page<TaskWithScope>, TaskError> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(TaskError::ProjectNotFound)?;

        let query = task::Entity::find()
            .filter(task::Column::ProjectId.eq(project_row_id))
            .order_by_desc(task::Column::Number);
        let query = Self::apply_filters(db, query, filters).await?;
        let query = Self::apply_search(query, search);
        let query = Self::only_live_languages(query);

        Self::fetch_page(db, query, page, page_size).await
    }

    /// Tasks across all projects where the user is an assignee, newest
    /// first.
    pub async fn list_for_user<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
        filters: &TaskFilters,
        search: Option<&str>,
        page: u64,
        page_size: u64,
    ) -> Result<Page<TaskWithScope>, TaskError> {
        let Some(user_row_id) = ids::user_account_id_by_uuid(db, user_id).await? else {
            return Ok(Page {
                items: Vec::new(),
                total: 0,
                page,
                page_size: Ord::max(page_size, 1),
            });
        };

        let query = task::Entity::find()
            .filter(
                task::Column::Id.in_subquery(
                    Query::select()
                        .column(task_assignee::Column::TaskId)
                        .from(task_assignee::Entity)
                        .and_where(Expr::col(task_assignee::Column::UserId).eq(user_row_id))
                        .to_owned(),
                ),
            )
            .order_by_desc(task::Column::Id);
        let query = Self::apply_filters(db, query, filters).await?;
        let query = Self::apply_search(query, search);
        let query = Self::only_live_languages(query);

        Self::fetch_page(db, query, page, page_size).await
    }

    /// Patch the task. Replacing assignees revalidates their access. A state
    /// change leaving `inprogress` stamps `closed_at`; returning to
    /// `inprogress` keeps the old stamp.
    pub async fn update<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        task_ref: &TaskRef,
        data: &UpdateTask,
        acting_user_id: Uuid,
    ) -> Result<TaskWithScope, TaskError> {
        if let Some(name) = data.name.as_deref() {
            validate_name(name)?;
        }
        if let Some(description) = data.description.as_deref() {
            validate_description(description)?;
        }

        let tx = db.begin().await?;
        let record = Self::require_row(&tx, task_ref).await?;

        if let Some(assignees) = &data.assignees {
            let assignee_row_ids =
                Self::validated_assignee_rows(&tx, record.project_id, assignees).await?;
            task_assignee::Entity::delete_many()
                .filter(task_assignee::Column::TaskId.eq(record.id))
                .exec(&tx)
                .await?;
            for user_row_id in assignee_row_ids {
                task_assignee::ActiveModel {
                    task_id: Set(record.id),
                    user_id: Set(user_row_id),
                    ..Default::default()
                }
                .insert(&tx)
                .await?;
            }
        }

        let previous_state = record.state;
        let mut active: task::ActiveModel = record.into();
        if let Some(name) = data.name.clone() {
            active.name = Set(name);
        }
        if data.description.is_some() {
            active.description = Set(data.description.clone());
        }
        if let Some(millis) = data.due_date {
            active.due_date = if millis < 0 {
                Set(None)
            } else {
                Set(Some(due_date_from_millis(millis)?.into()))
            };
        }
        if let Some(state) = data.state {
            if previous_state == TaskState::InProgress && state != TaskState::InProgress {
                active.closed_at = Set(Some(Utc::now().into()));
            }
            active.state = Set(state);
        }
        active.updated_at = Set(Utc::now().into());
        active.update(&tx).await?;

        let payload = task_payload(task_ref.project_id, task_ref.number, Some(acting_user_id))?;
        EventOutbox::enqueue(&tx, EVENT_TASK_UPDATED, "task", payload).await?;
        tx.commit().await?;

        Self::get(db, task_ref).await
    }

    pub async fn finish<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        task_ref: &TaskRef,
        acting_user_id: Uuid,
    ) -> Result<TaskWithScope, TaskError> {
        Self::update(
            db,
            task_ref,
            &UpdateTask {
                state: Some(TaskState::Done),
                ..Default::default()
            },
            acting_user_id,
        )
        .await
    }

    pub async fn delete<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        task_ref: &TaskRef,
        acting_user_id: Uuid,
    ) -> Result<(), TaskError> {
        let tx = db.begin().await?;
        let record = Self::require_row(&tx, task_ref).await?;

        // Links before the parent row.
        task_item::Entity::delete_many()
            .filter(task_item::Column::TaskId.eq(record.id))
            .exec(&tx)
            .await?;
        task_assignee::Entity::delete_many()
            .filter(task_assignee::Column::TaskId.eq(record.id))
            .exec(&tx)
            .await?;
        task::Entity::delete_by_id(record.id).exec(&tx).await?;

        let payload = task_payload(task_ref.project_id, task_ref.number, Some(acting_user_id))?;
        EventOutbox::enqueue(&tx, EVENT_TASK_DELETED, "task", payload).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Edit item membership. Adds are restricted to the task's project,
    /// materialize missing translations and skip already-linked items;
    /// removals skip keys that are not linked.
    pub async fn update_items<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        task_ref: &TaskRef,
        add_keys: &[Uuid],
        remove_keys: &[Uuid],
        acting_user_id: Uuid,
    ) -> Result<TaskWithScope, TaskError> {
        let tx = db.begin().await?;
        let record = Self::require_row(&tx, task_ref).await?;

        let mut removed = 0;
        if !remove_keys.is_empty() {
            let key_row_ids: Vec<i64> = key::Entity::find()
                .select_only()
                .column(key::Column::Id)
                .filter(key::Column::ProjectId.eq(record.project_id))
                .filter(key::Column::Uuid.is_in(remove_keys.iter().copied()))
                .into_tuple()
                .all(&tx)
                .await?;
            if !key_row_ids.is_empty() {
                let translation_row_ids: Vec<i64> = translation::Entity::find()
                    .select_only()
                    .column(translation::Column::Id)
                    .filter(translation::Column::LanguageId.eq(record.language_id))
                    .filter(translation::Column::KeyId.is_in(key_row_ids))
                    .into_tuple()
                    .all(&tx)
                    .await?;
                if !translation_row_ids.is_empty() {
                    removed = task_item::Entity::delete_many()
                        .filter(task_item::Column::TaskId.eq(record.id))
                        .filter(task_item::Column::TranslationId.is_in(translation_row_ids))
                        .exec(&tx)
                        .await?
                        .rows_affected;
                }
            }
        }

        let mut added = 0;
        if !add_keys.is_empty() {
            let key_rows = key::Entity::find()
                .filter(key::Column::ProjectId.eq(record.project_id))
                .filter(key::Column::Uuid.is_in(add_keys.iter().copied()))
                .all(&tx)
                .await?;
            let key_row_by_uuid: HashMap<Uuid, i64> =
                key_rows.iter().map(|row| (row.uuid, row.id)).collect();
            let linked: HashSet<i64> = task_item::Entity::find()
                .select_only()
                .column(task_item::Column::TranslationId)
                .filter(task_item::Column::TaskId.eq(record.id))
                .into_tuple()
                .all(&tx)
                .await?
                .into_iter()
                .collect();

            let now = Utc::now();
            let mut seen = HashSet::new();
            for key_id in add_keys.iter().copied().filter(|id| seen.insert(*id)) {
                let Some(&key_row_id) = key_row_by_uuid.get(&key_id) else {
                    continue;
                };
                let translation_row =
                    Translation::get_or_create_row(&tx, key_row_id, record.language_id).await?;
                if linked.contains(&translation_row.id) {
                    continue;
                }
                task_item::ActiveModel {
                    task_id: Set(record.id),
                    translation_id: Set(translation_row.id),
                    done: Set(false),
                    done_by: Set(None),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                    ..Default::default()
                }
                .insert(&tx)
                .await?;
                added += 1;
            }
        }

        if added > 0 || removed > 0 {
            let payload =
                task_payload(task_ref.project_id, task_ref.number, Some(acting_user_id))?;
            EventOutbox::enqueue(&tx, EVENT_TASK_UPDATED, "task", payload).await?;
        }
        tx.commit().await?;

        Self::get(db, task_ref).await
    }

    /// Key uuids of the task's items, in item insertion order.
    pub async fn item_keys<C: ConnectionTrait>(
        db: &C,
        task_ref: &TaskRef,
    ) -> Result<Vec<Uuid>, TaskError> {
        let record = Self::require_row(db, task_ref).await?;

        let items = task_item::Entity::find()
            .filter(task_item::Column::TaskId.eq(record.id))
            .order_by_asc(task_item::Column::Id)
            .all(db)
            .await?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let translation_rows = translation::Entity::find()
            .filter(translation::Column::Id.is_in(items.iter().map(|item| item.translation_id)))
            .all(db)
            .await?;
        let key_row_by_translation: HashMap<i64, i64> = translation_rows
            .iter()
            .map(|row| (row.id, row.key_id))
            .collect();

        let key_rows = key::Entity::find()
            .filter(key::Column::Id.is_in(translation_rows.iter().map(|row| row.key_id)))
            .all(db)
            .await?;
        let key_uuid_by_row: HashMap<i64, Uuid> =
            key_rows.iter().map(|row| (row.id, row.uuid)).collect();

        let mut keys = Vec::with_capacity(items.len());
        for item in &items {
            if let Some(key_row_id) = key_row_by_translation.get(&item.translation_id)
                && let Some(&key_uuid) = key_uuid_by_row.get(key_row_id)
            {
                keys.push(key_uuid);
            }
        }
        Ok(keys)
    }
}
