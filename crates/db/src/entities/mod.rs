pub mod event_outbox;
pub mod key;
pub mod language;
pub mod project;
pub mod project_member;
pub mod task;
pub mod task_assignee;
pub mod task_item;
pub mod translation;
pub mod user_account;
