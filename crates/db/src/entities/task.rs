use sea_orm::entity::prelude::*;

use crate::types::{TaskState, TaskType};

/// No uuid column: a task's external identity is (project uuid, number).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub project_id: i64,
    pub number: i64,
    pub name: String,
    pub description: Option<String>,
    pub task_type: TaskType,
    pub language_id: i64,
    pub due_date: Option<DateTimeUtc>,
    pub author_id: Option<i64>,
    pub state: TaskState,
    pub closed_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
