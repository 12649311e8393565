use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use crate::migrations;

pub type DbPool = sqlx::SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
}

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

/// Every pooled connection gets foreign keys, WAL, and a busy timeout so that
/// two writers on the same file wait instead of failing immediately.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

/// Connects and brings the schema up to date in one step.
pub async fn connect_and_migrate(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, ConnectError> {
    let pool = connect_with_settings(database_url, max_connections, timeout_secs)
        .await
        .map_err(ConnectError::Connect)?;
    migrations::run_pending(&pool).await.map_err(ConnectError::Migrate)?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{connect_and_migrate, connect_with_settings};

    #[tokio::test]
    async fn pragmas_are_applied_per_connection() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        let foreign_keys = sqlx::query("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("pragma")
            .get::<i64, _>(0);
        assert_eq!(foreign_keys, 1);
    }

    #[tokio::test]
    async fn connect_and_migrate_leaves_schema_ready() {
        let pool = connect_and_migrate("sqlite::memory:", 1, 5).await.expect("connect");
        let count = sqlx::query("SELECT COUNT(*) FROM requests")
            .fetch_one(&pool)
            .await
            .expect("requests table exists")
            .get::<i64, _>(0);
        assert_eq!(count, 0);
    }
}
