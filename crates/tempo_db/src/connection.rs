//! Database connection management.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::error::DbResult;

/// Connection to the task database.
///
/// One SQLite file holds all task metadata and event mappings. SQLite's
/// single-writer discipline is the serialization point for concurrent
/// pipeline runs.
#[derive(Debug, Clone)]
pub struct TaskDb {
    pool: SqlitePool,
}

impl TaskDb {
    /// Open or create the task database at the given path.
    ///
    /// Creates the file and parent directory if missing, runs pending
    /// migrations, and configures SQLite for WAL-mode operation.
    pub async fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Opening task database: {}", path.to_string_lossy());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("synchronous", "NORMAL") // Safe with WAL
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(5) // SQLite is single-writer, but readers can parallelize
            .connect_with(options)
            .await?;

        debug!("Database connection established");

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Open an in-memory database (for testing).
    pub async fn open_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(1) // In-memory must be single connection to share state
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
        debug!("Running database migrations");
        sqlx::migrate!("./migrations").run(pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get database statistics.
    pub async fn stats(&self) -> DbResult<DbStats> {
        let tasks: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await?;

        let events: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM event_map")
            .fetch_one(&self.pool)
            .await?;

        Ok(DbStats {
            task_count: tasks.0 as u64,
            event_count: events.0 as u64,
        })
    }
}

/// Database statistics.
#[derive(Debug, Clone)]
pub struct DbStats {
    pub task_count: u64,
    pub event_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = TaskDb::open_in_memory().await.unwrap();
        db.health_check().await.unwrap();

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.task_count, 0);
        assert_eq!(stats.event_count, 0);
    }
}
