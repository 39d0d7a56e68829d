use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Projects::Table)
                    .col(pk_id_col(manager, Projects::Id))
                    .col(uuid_col(Projects::Uuid))
                    .col(ColumnDef::new(Projects::Name).string().not_null())
                    // No FK here: languages are created below and reference
                    // projects, which would cycle the constraints.
                    .col(fk_id_nullable_col(manager, Projects::BaseLanguageId))
                    .col(timestamp_col(Projects::CreatedAt))
                    .col(timestamp_col(Projects::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_projects_uuid")
                    .table(Projects::Table)
                    .col(Projects::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(UserAccounts::Table)
                    .col(pk_id_col(manager, UserAccounts::Id))
                    .col(uuid_col(UserAccounts::Uuid))
                    .col(ColumnDef::new(UserAccounts::Username).string().not_null())
                    .col(ColumnDef::new(UserAccounts::DisplayName).string())
                    .col(timestamp_col(UserAccounts::CreatedAt))
                    .col(timestamp_col(UserAccounts::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_user_accounts_uuid")
                    .table(UserAccounts::Table)
                    .col(UserAccounts::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_user_accounts_username")
                    .table(UserAccounts::Table)
                    .col(UserAccounts::Username)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Languages::Table)
                    .col(pk_id_col(manager, Languages::Id))
                    .col(uuid_col(Languages::Uuid))
                    .col(fk_id_col(manager, Languages::ProjectId))
                    .col(ColumnDef::new(Languages::Name).string().not_null())
                    .col(ColumnDef::new(Languages::Tag).string().not_null())
                    .col(ColumnDef::new(Languages::DeletedAt).timestamp())
                    .col(timestamp_col(Languages::CreatedAt))
                    .col(timestamp_col(Languages::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_languages_project_id")
                            .from(Languages::Table, Languages::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_languages_uuid")
                    .table(Languages::Table)
                    .col(Languages::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_languages_project_id")
                    .table(Languages::Table)
                    .col(Languages::ProjectId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(ProjectMembers::Table)
                    .col(pk_id_col(manager, ProjectMembers::Id))
                    .col(fk_id_col(manager, ProjectMembers::ProjectId))
                    .col(fk_id_col(manager, ProjectMembers::UserId))
                    .col(ColumnDef::new(ProjectMembers::Scopes).json().not_null())
                    .col(timestamp_col(ProjectMembers::CreatedAt))
                    .col(timestamp_col(ProjectMembers::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_members_project_id")
                            .from(ProjectMembers::Table, ProjectMembers::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_members_user_id")
                            .from(ProjectMembers::Table, ProjectMembers::UserId)
                            .to(UserAccounts::Table, UserAccounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_project_members_project_user")
                    .table(ProjectMembers::Table)
                    .col(ProjectMembers::ProjectId)
                    .col(ProjectMembers::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_project_members_user_id")
                    .table(ProjectMembers::Table)
                    .col(ProjectMembers::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Keys::Table)
                    .col(pk_id_col(manager, Keys::Id))
                    .col(uuid_col(Keys::Uuid))
                    .col(fk_id_col(manager, Keys::ProjectId))
                    .col(ColumnDef::new(Keys::Name).string().not_null())
                    .col(timestamp_col(Keys::CreatedAt))
                    .col(timestamp_col(Keys::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_keys_project_id")
                            .from(Keys::Table, Keys::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_keys_uuid")
                    .table(Keys::Table)
                    .col(Keys::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_keys_project_name")
                    .table(Keys::Table)
                    .col(Keys::ProjectId)
                    .col(Keys::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Translations::Table)
                    .col(pk_id_col(manager, Translations::Id))
                    .col(uuid_col(Translations::Uuid))
                    .col(fk_id_col(manager, Translations::KeyId))
                    .col(fk_id_col(manager, Translations::LanguageId))
                    .col(ColumnDef::new(Translations::Text).text())
                    .col(
                        ColumnDef::new(Translations::State)
                            .string_len(32)
                            .not_null()
                            .default(Expr::val("untranslated")),
                    )
                    .col(
                        ColumnDef::new(Translations::Outdated)
                            .boolean()
                            .not_null()
                            .default(Expr::val(false)),
                    )
                    .col(
                        ColumnDef::new(Translations::WordCount)
                            .integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(
                        ColumnDef::new(Translations::CharacterCount)
                            .integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(timestamp_col(Translations::CreatedAt))
                    .col(timestamp_col(Translations::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_translations_key_id")
                            .from(Translations::Table, Translations::KeyId)
                            .to(Keys::Table, Keys::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_translations_language_id")
                            .from(Translations::Table, Translations::LanguageId)
                            .to(Languages::Table, Languages::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_translations_uuid")
                    .table(Translations::Table)
                    .col(Translations::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_translations_key_language")
                    .table(Translations::Table)
                    .col(Translations::KeyId)
                    .col(Translations::LanguageId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_translations_language_id")
                    .table(Translations::Table)
                    .col(Translations::LanguageId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Translations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Keys::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProjectMembers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Languages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserAccounts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
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

fn uuid_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col).uuid().not_null().to_owned()
}

fn timestamp_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[derive(Iden)]
enum Projects {
    Table,
    Id,
    Uuid,
    Name,
    BaseLanguageId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum UserAccounts {
    Table,
    Id,
    Uuid,
    Username,
    DisplayName,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Languages {
    Table,
    Id,
    Uuid,
    ProjectId,
    Name,
    Tag,
    DeletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ProjectMembers {
    Table,
    Id,
    ProjectId,
    UserId,
    Scopes,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Keys {
    Table,
    Id,
    Uuid,
    ProjectId,
    Name,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub(crate) enum Translations {
    Table,
    Id,
    Uuid,
    KeyId,
    LanguageId,
    Text,
    State,
    Outdated,
    WordCount,
    CharacterCount,
    CreatedAt,
    UpdatedAt,
}
