use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub mod error;
pub mod init;
pub mod schema;

pub use error::{DatabaseError, Result};

// Re-export initialization functions for convenience
pub use init::{initialize_database, DatabaseConfig};

/// Default size of the connection pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Database connection pool
#[derive(Debug)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection, creating the file if it does not exist
    pub async fn new(database_path: &Path) -> Result<Self> {
        Self::with_max_connections(database_path, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Create a new database connection with an explicit pool size
    pub async fn with_max_connections(database_path: &Path, max_connections: u32) -> Result<Self> {
        // Ensure the data directory exists
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Connecting to database at: {}", database_path.display());

        // WAL lets the rule loader read while a metadata transaction is open.
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        debug!(
            "Database connection established (max_connections={})",
            max_connections
        );

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Get a clone of the connection pool
    pub fn get_pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    /// Create the rule and metadata tables if they are missing
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");
        for statement in schema::STATEMENTS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DatabaseError::TableCreation(e.to_string()))?;
        }
        info!("Database migrations completed");
        Ok(())
    }

    /// Check if a table exists
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let query = r#"
            SELECT COUNT(*) as count
            FROM sqlite_master
            WHERE type='table' AND name=?
        "#;

        let result: (i32,) = sqlx::query_as(query)
            .bind(table_name)
            .fetch_one(&self.pool)
            .await?;

        Ok(result.0 > 0)
    }

    /// Execute raw SQL (for table creation, etc.)
    pub async fn execute_raw(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_db(dir: &TempDir) -> Database {
        Database::new(&dir.path().join("test.db")).await.unwrap()
    }

    #[tokio::test]
    async fn test_database_connection() {
        let dir = TempDir::new().unwrap();
        let db = create_test_db(&dir).await;
        assert!(db.pool().acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("data").join("rbac.db");
        let db = Database::new(&path).await.unwrap();
        assert!(db.pool().acquire().await.is_ok());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_table_exists() {
        let dir = TempDir::new().unwrap();
        let db = create_test_db(&dir).await;

        db.execute_raw("CREATE TABLE test_table (id INTEGER PRIMARY KEY)")
            .await
            .unwrap();

        assert!(db.table_exists("test_table").await.unwrap());
        assert!(!db.table_exists("non_existent_table").await.unwrap());
    }

    #[tokio::test]
    async fn test_migrate_creates_tables_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let db = create_test_db(&dir).await;

        db.migrate().await.unwrap();
        db.migrate().await.unwrap();

        for table in ["rbac_rules", "role_metadata", "policy_metadata"] {
            assert!(db.table_exists(table).await.unwrap(), "missing {}", table);
        }
    }
}
