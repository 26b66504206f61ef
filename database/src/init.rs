use crate::{Database, Result, DEFAULT_MAX_CONNECTIONS};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Database initialization configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database file
    pub database_path: PathBuf,
    /// Size of the connection pool
    pub max_connections: u32,
    /// Whether to create tables on initialization
    pub create_tables: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data").join("rbac.db"),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            create_tables: true,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database configuration with default paths
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new database configuration with a specific database path
    pub fn new_with_path(database_path: PathBuf) -> Self {
        Self {
            database_path,
            ..Self::default()
        }
    }

    /// Set a custom database path
    pub fn with_database_path(mut self, path: PathBuf) -> Self {
        self.database_path = path;
        self
    }

    /// Set the connection pool size
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Set whether to create tables on initialization
    pub fn with_create_tables(mut self, create: bool) -> Self {
        self.create_tables = create;
        self
    }
}

/// Initialize the database with the given configuration
pub async fn initialize_database(config: DatabaseConfig) -> Result<Arc<Database>> {
    info!(
        "Initializing database at {:?} (max_connections={})",
        config.database_path, config.max_connections
    );

    let db = Database::with_max_connections(&config.database_path, config.max_connections).await?;
    let db = Arc::new(db);

    if config.create_tables {
        db.migrate().await?;
    }

    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_database_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = DatabaseConfig::new().with_database_path(db_path.clone());
        let db = initialize_database(config).await.unwrap();

        assert!(db_path.exists());
        assert!(db.table_exists("role_metadata").await.unwrap());
        assert!(db.get_pool().acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_initialization_without_tables() {
        let temp_dir = TempDir::new().unwrap();
        let config = DatabaseConfig::new_with_path(temp_dir.path().join("bare.db"))
            .with_create_tables(false)
            .with_max_connections(1);

        let db = initialize_database(config).await.unwrap();
        assert!(!db.table_exists("rbac_rules").await.unwrap());
    }

    #[test]
    fn test_default_config() {
        let config = DatabaseConfig::default();
        assert!(config.database_path.ends_with("rbac.db"));
        assert!(config.create_tables);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
    }
}
