use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

/// Opens the pool, creating the database file on first use.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = connect_options(database_url)?;

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
}

fn connect_options(database_url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    // `:memory:` is accepted by config validation but is not a URL sqlx parses on its own.
    let url = if database_url.trim() == ":memory:" { "sqlite::memory:" } else { database_url };
    let options: SqliteConnectOptions = url.parse()?;
    Ok(options.create_if_missing(true))
}

#[cfg(test)]
mod tests {
    use sqlx::Row;
    use tempfile::TempDir;

    use super::connect_with_settings;

    #[tokio::test]
    async fn bare_memory_alias_is_accepted() {
        let pool = connect_with_settings(":memory:", 1, 5).await.expect("connect");

        let value = sqlx::query("SELECT 1 AS one")
            .fetch_one(&pool)
            .await
            .expect("select")
            .get::<i64, _>("one");

        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn file_database_is_created_when_missing() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("fresh.db");

        let url = format!("sqlite://{}", path.display());
        let pool = connect_with_settings(&url, 1, 5).await.expect("connect");
        pool.close().await;

        assert!(path.exists());
    }
}
