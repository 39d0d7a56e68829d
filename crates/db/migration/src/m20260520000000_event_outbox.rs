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
                    .table(EventOutbox::Table)
                    .col(pk_id_col(manager, EventOutbox::Id))
                    .col(uuid_col(EventOutbox::Uuid))
                    .col(ColumnDef::new(EventOutbox::EventType).string().not_null())
                    .col(ColumnDef::new(EventOutbox::EntityType).string().not_null())
                    .col(ColumnDef::new(EventOutbox::Payload).json().not_null())
                    .col(timestamp_col(EventOutbox::CreatedAt))
                    .col(ColumnDef::new(EventOutbox::PublishedAt).timestamp())
                    .col(
                        ColumnDef::new(EventOutbox::Attempts)
                            .integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(ColumnDef::new(EventOutbox::LastError).text())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_event_outbox_uuid")
                    .table(EventOutbox::Table)
                    .col(EventOutbox::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_event_outbox_published_at")
                    .table(EventOutbox::Table)
                    .col(EventOutbox::PublishedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventOutbox::Table).to_owned())
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
enum EventOutbox {
    Table,
    Id,
    Uuid,
    EventType,
    EntityType,
    Payload,
    CreatedAt,
    PublishedAt,
    Attempts,
    LastError,
}
