#![allow(clippy::useless_conversion)]

pub mod event_outbox;
pub mod ids;
pub mod key;
pub mod language;
pub mod project;
pub mod project_member;
pub mod report;
pub mod scope;
pub mod task;
pub mod task_item;
pub mod translation;
pub mod user_account;
