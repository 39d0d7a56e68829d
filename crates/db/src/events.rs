use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EVENT_TASK_CREATED: &str = "task.created";
pub const EVENT_TASK_UPDATED: &str = "task.updated";
pub const EVENT_TASK_DELETED: &str = "task.deleted";
pub const EVENT_TASK_COMPLETED: &str = "task.completed";

pub const EVENT_PROJECT_DELETED: &str = "project.deleted";

/// Tasks have no uuid of their own; events carry the composite identity.
/// `actor_id` is the acting user for direct mutations and `None` for
/// cascade-driven ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEventPayload {
    pub project_id: Uuid,
    pub number: i64,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEventPayload {
    pub project_id: Uuid,
}
