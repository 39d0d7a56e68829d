use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionSession, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::{
    entities::{key, task_item, translation, user_account},
    events::{EVENT_TASK_COMPLETED, TaskEventPayload},
    models::{
        event_outbox::EventOutbox,
        ids,
        task::{Task, TaskError, TaskRef},
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct TaskItem {
    pub key_id: Uuid,
    pub done: bool,
    pub done_by: Option<Uuid>,
}

/// Result of a completion toggle. `task_finished` fires only on the
/// false→true edge that made every item of the task done; the task's own
/// state is left for the caller to change.
#[derive(Debug, Clone, Copy, Serialize, TS)]
pub struct TaskItemDoneOutcome {
    pub done: bool,
    pub task_finished: bool,
}

impl TaskItem {
    /// Toggle one item, identified by its key within the task's language.
    /// Marking done stamps `done_by` with the acting user, re-marking
    /// refreshes it, un-marking clears it.
    pub async fn set_done<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        task_ref: &TaskRef,
        key_id: Uuid,
        done: bool,
        acting_user_id: Uuid,
    ) -> Result<TaskItemDoneOutcome, TaskError> {
        let tx = db.begin().await?;
        let record = Task::require_row(&tx, task_ref).await?;

        let key_row_id = ids::key_id_by_uuid(&tx, key_id)
            .await?
            .ok_or(TaskError::TranslationNotFound)?;
        let translation_row = translation::Entity::find()
            .filter(translation::Column::KeyId.eq(key_row_id))
            .filter(translation::Column::LanguageId.eq(record.language_id))
            .one(&tx)
            .await?
            .ok_or(TaskError::TranslationNotFound)?;
        let item = task_item::Entity::find()
            .filter(task_item::Column::TaskId.eq(record.id))
            .filter(task_item::Column::TranslationId.eq(translation_row.id))
            .one(&tx)
            .await?
            .ok_or(TaskError::TaskNotFound)?;

        let was_done = item.done;
        let done_by = if done {
            let user_row_id = ids::user_account_id_by_uuid(&tx, acting_user_id)
                .await?
                .ok_or(TaskError::UserHasNoProjectAccess(acting_user_id))?;
            Some(user_row_id)
        } else {
            None
        };

        let mut active: task_item::ActiveModel = item.into();
        active.done = Set(done);
        active.done_by = Set(done_by);
        active.updated_at = Set(Utc::now().into());
        active.update(&tx).await?;

        let mut task_finished = false;
        if done && !was_done {
            let total = task_item::Entity::find()
                .filter(task_item::Column::TaskId.eq(record.id))
                .count(&tx)
                .await?;
            let done_count = task_item::Entity::find()
                .filter(task_item::Column::TaskId.eq(record.id))
                .filter(task_item::Column::Done.eq(true))
                .count(&tx)
                .await?;
            task_finished = done_count == total;
        }
        if task_finished {
            let payload = serde_json::to_value(TaskEventPayload {
                project_id: task_ref.project_id,
                number: task_ref.number,
                actor_id: Some(acting_user_id),
            })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
            EventOutbox::enqueue(&tx, EVENT_TASK_COMPLETED, "task", payload).await?;
        }
        tx.commit().await?;

        Ok(TaskItemDoneOutcome {
            done,
            task_finished,
        })
    }

    /// Items of a task in insertion order, resolved to key uuids.
    pub async fn find_for_task<C: ConnectionTrait>(
        db: &C,
        task_ref: &TaskRef,
    ) -> Result<Vec<TaskItem>, TaskError> {
        let record = Task::require_row(db, task_ref).await?;

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
        let key_by_translation: HashMap<i64, i64> = translation_rows
            .iter()
            .map(|row| (row.id, row.key_id))
            .collect();
        let key_uuid_by_row: HashMap<i64, Uuid> = key::Entity::find()
            .filter(key::Column::Id.is_in(translation_rows.iter().map(|row| row.key_id)))
            .all(db)
            .await?
            .into_iter()
            .map(|row| (row.id, row.uuid))
            .collect();

        let mut author_row_ids: Vec<i64> = items.iter().filter_map(|item| item.done_by).collect();
        author_row_ids.sort_unstable();
        author_row_ids.dedup();
        let author_uuid_by_row: HashMap<i64, Uuid> = if author_row_ids.is_empty() {
            HashMap::new()
        } else {
            user_account::Entity::find()
                .filter(user_account::Column::Id.is_in(author_row_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|user| (user.id, user.uuid))
                .collect()
        };

        let mut resolved = Vec::with_capacity(items.len());
        for item in &items {
            let Some(key_uuid) = key_by_translation
                .get(&item.translation_id)
                .and_then(|key_row_id| key_uuid_by_row.get(key_row_id))
            else {
                continue;
            };
            resolved.push(TaskItem {
                key_id: *key_uuid,
                done: item.done,
                done_by: item
                    .done_by
                    .and_then(|row_id| author_uuid_by_row.get(&row_id).copied()),
            });
        }
        Ok(resolved)
    }
}
