use sea_orm::{DbErr, SqlErr};

/// True when the statement lost to a unique index, e.g. two writers racing
/// for the same per-project task number.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// SQLite reports lock contention as SQLITE_BUSY/SQLITE_LOCKED (codes 5/6);
/// by the time sea-orm surfaces them only the message is portable.
pub(crate) fn is_busy(err: &DbErr) -> bool {
    let message = err.to_string();
    message.contains("database is locked")
        || message.contains("database is busy")
        || message.contains("database table is locked")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, Database, Set};
    use sea_orm_migration::MigratorTrait;
    use uuid::Uuid;

    use super::*;
    use crate::entities::project;

    #[test]
    fn busy_detection_matches_lock_messages() {
        assert!(is_busy(&DbErr::Custom(
            "error returned from database: database is locked".to_string()
        )));
        assert!(!is_busy(&DbErr::Custom("syntax error".to_string())));
    }

    #[tokio::test]
    async fn unique_violation_is_classified() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();

        let uuid = Uuid::new_v4();
        for attempt in 0..2 {
            let active = project::ActiveModel {
                uuid: Set(uuid),
                name: Set(format!("dup {attempt}")),
                base_language_id: Set(None),
                created_at: Set(Utc::now().into()),
                updated_at: Set(Utc::now().into()),
                ..Default::default()
            };
            let result = active.insert(&db).await;
            if attempt == 0 {
                assert!(result.is_ok());
            } else {
                let err = result.unwrap_err();
                assert!(is_unique_violation(&err));
                assert!(!is_busy(&err));
            }
        }
    }
}
