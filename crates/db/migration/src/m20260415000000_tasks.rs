use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

use crate::m20260301000000_baseline::Translations;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Tasks::Table)
                    .col(pk_id_col(manager, Tasks::Id))
                    .col(fk_id_col(manager, Tasks::ProjectId))
                    .col(fk_id_col(manager, Tasks::Number))
                    .col(ColumnDef::new(Tasks::Name).string().not_null())
                    .col(ColumnDef::new(Tasks::Description).text())
                    .col(
                        ColumnDef::new(Tasks::TaskType)
                            .string_len(32)
                            .not_null()
                            .default(Expr::val("translate")),
                    )
                    .col(fk_id_col(manager, Tasks::LanguageId))
                    .col(ColumnDef::new(Tasks::DueDate).timestamp())
                    .col(fk_id_nullable_col(manager, Tasks::AuthorId))
                    .col(
                        ColumnDef::new(Tasks::State)
                            .string_len(32)
                            .not_null()
                            .default(Expr::val("inprogress")),
                    )
                    .col(ColumnDef::new(Tasks::ClosedAt).timestamp())
                    .col(timestamp_col(Tasks::CreatedAt))
                    .col(timestamp_col(Tasks::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_project_id")
                            .from(Tasks::Table, Tasks::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_language_id")
                            .from(Tasks::Table, Tasks::LanguageId)
                            .to(Languages::Table, Languages::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_author_id")
                            .from(Tasks::Table, Tasks::AuthorId)
                            .to(UserAccounts::Table, UserAccounts::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Arbiter for number allocation: one number per project, ever.
        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_tasks_project_number")
                    .table(Tasks::Table)
                    .col(Tasks::ProjectId)
                    .col(Tasks::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_tasks_language_id")
                    .table(Tasks::Table)
                    .col(Tasks::LanguageId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(TaskAssignees::Table)
                    .col(pk_id_col(manager, TaskAssignees::Id))
                    .col(fk_id_col(manager, TaskAssignees::TaskId))
                    .col(fk_id_col(manager, TaskAssignees::UserId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_assignees_task_id")
                            .from(TaskAssignees::Table, TaskAssignees::TaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_assignees_user_id")
                            .from(TaskAssignees::Table, TaskAssignees::UserId)
                            .to(UserAccounts::Table, UserAccounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_task_assignees_task_user")
                    .table(TaskAssignees::Table)
                    .col(TaskAssignees::TaskId)
                    .col(TaskAssignees::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_task_assignees_user_id")
                    .table(TaskAssignees::Table)
                    .col(TaskAssignees::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(TaskItems::Table)
                    .col(pk_id_col(manager, TaskItems::Id))
                    .col(fk_id_col(manager, TaskItems::TaskId))
                    .col(fk_id_col(manager, TaskItems::TranslationId))
                    .col(
                        ColumnDef::new(TaskItems::Done)
                            .boolean()
                            .not_null()
                            .default(Expr::val(false)),
                    )
                    .col(fk_id_nullable_col(manager, TaskItems::DoneBy))
                    .col(timestamp_col(TaskItems::CreatedAt))
                    .col(timestamp_col(TaskItems::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_items_task_id")
                            .from(TaskItems::Table, TaskItems::TaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_items_translation_id")
                            .from(TaskItems::Table, TaskItems::TranslationId)
                            .to(Translations::Table, Translations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_items_done_by")
                            .from(TaskItems::Table, TaskItems::DoneBy)
                            .to(UserAccounts::Table, UserAccounts::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_task_items_task_translation")
                    .table(TaskItems::Table)
                    .col(TaskItems::TaskId)
                    .col(TaskItems::TranslationId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_task_items_translation_id")
                    .table(TaskItems::Table)
                    .col(TaskItems::TranslationId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TaskAssignees::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tasks::Table).to_owned())
            .await?;
        Ok(())
    }
}

fn pk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.not_null().auto_increment().primary_key().to_owned()
}

fn fk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.not_null().to_owned()
}

fn fk_id_nullable_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.to_owned()
}

fn timestamp_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[derive(Iden)]
enum Tasks {
    Table,
    Id,
    ProjectId,
    Number,
    Name,
    Description,
    TaskType,
    LanguageId,
    DueDate,
    AuthorId,
    State,
    ClosedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum TaskAssignees {
    Table,
    Id,
    TaskId,
    UserId,
}

#[derive(Iden)]
enum TaskItems {
    Table,
    Id,
    TaskId,
    TranslationId,
    Done,
    DoneBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Projects {
    Table,
    Id,
}

#[derive(Iden)]
enum Languages {
    Table,
    Id,
}

#[derive(Iden)]
enum UserAccounts {
    Table,
    Id,
}
