use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr,
};
use sea_orm_migration::MigratorTrait;

pub mod entities;
pub mod events;
pub mod models;
mod retry;
pub mod types;

#[derive(Clone)]
pub struct DBService {
    pub conn: DatabaseConnection,
}

impl DBService {
    /// Connects and applies pending migrations. SQLite databases are
    /// switched to WAL journaling; the sqlx driver defaults already give a
    /// 5s busy timeout and enforced foreign keys. The pragma is a no-op for
    /// in-memory databases.
    pub async fn new(database_url: &str) -> Result<DBService, DbErr> {
        let mut options = ConnectOptions::new(database_url.to_string());
        options.max_connections(5).sqlx_logging(false);
        let conn = Database::connect(options).await?;
        if conn.get_database_backend() == DbBackend::Sqlite {
            conn.execute_unprepared("PRAGMA journal_mode = WAL;").await?;
        }
        db_migration::Migrator::up(&conn, None).await?;
        Ok(DBService { conn })
    }
}
