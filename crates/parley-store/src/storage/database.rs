//! SQLite database operations
//!
//! Provides connection pool management and database initialization for
//! parley-store.

use crate::storage::migrations;
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default maximum connections in the pool
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default identifier floor for engine-assigned user and group ids.
///
/// The first assigned id is one above the floor, keeping production ids
/// clear of fixture and seed data in the low range.
pub const DEFAULT_ID_FLOOR: i64 = 9_999_999;

/// Tables whose id sequences are seeded to the configured floor on open.
const FLOORED_SEQUENCES: [&str; 2] = ["users", "chat_groups"];

/// Database configuration options
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Whether to run migrations automatically
    pub auto_migrate: bool,
    /// Identifier floor seeded into the user and group id sequences on open;
    /// a one-time bootstrap parameter, not a runtime invariant
    pub id_floor: i64,
    /// Journal mode (default: WAL for better concurrency)
    pub journal_mode: SqliteJournalMode,
    /// Synchronous mode (default: NORMAL for balance of safety/performance)
    pub synchronous: SqliteSynchronous,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            auto_migrate: true,
            id_floor: DEFAULT_ID_FLOOR,
            journal_mode: SqliteJournalMode::Wal,
            synchronous: SqliteSynchronous::Normal,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database config with the specified path
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a config for an in-memory database (useful for testing)
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            ..Default::default()
        }
    }

    /// Set the maximum number of connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the identifier floor for engine-assigned ids
    pub fn id_floor(mut self, floor: i64) -> Self {
        self.id_floor = floor;
        self
    }

    /// Disable automatic migrations
    pub fn no_migrate(mut self) -> Self {
        self.auto_migrate = false;
        self
    }
}

/// Get the default database path
pub fn default_database_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("parley").join("parley.db")
    } else {
        PathBuf::from("parley.db")
    }
}

/// Database connection pool wrapper
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    config: DatabaseConfig,
}

impl Database {
    /// Create a new database connection with the given configuration
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        // Ensure the directory exists
        if let Some(parent) = config.path.parent() {
            if !parent.exists() && config.path.to_string_lossy() != ":memory:" {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory: {parent:?}"))?;
            }
        }

        let connection_str = if config.path.to_string_lossy() == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", config.path.display())
        };

        // Cascade deletion of dependent rows relies on foreign keys being
        // enforced on every connection.
        let connect_options = SqliteConnectOptions::from_str(&connection_str)?
            .journal_mode(config.journal_mode)
            .synchronous(config.synchronous)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("Failed to connect to database: {:?}", config.path))?;

        let db = Self {
            pool,
            config: config.clone(),
        };

        // Run migrations if auto_migrate is enabled, then seed id floors
        // (the sequences only exist once the schema does)
        if config.auto_migrate {
            db.migrate().await?;
            db.seed_id_floor().await?;
        }

        Ok(db)
    }

    /// Create a database connection with default configuration
    pub async fn with_defaults() -> Result<Self> {
        Self::new(DatabaseConfig::default()).await
    }

    /// Create an in-memory database (useful for testing)
    pub async fn in_memory() -> Result<Self> {
        Self::new(DatabaseConfig::in_memory()).await
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get the database configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool)
            .await
            .context("Failed to run database migrations")
    }

    /// Check migration status
    pub async fn migration_status(&self) -> Result<migrations::MigrationStatus> {
        migrations::migration_status(&self.pool)
            .await
            .context("Failed to check migration status")
    }

    /// Seed the user and group id sequences up to the configured floor.
    ///
    /// Only ever raises the sequences; reopening a database that has already
    /// assigned ids above the floor is a no-op.
    pub async fn seed_id_floor(&self) -> Result<()> {
        if self.config.id_floor <= 0 {
            return Ok(());
        }

        for table in FLOORED_SEQUENCES {
            sqlx::query(
                "INSERT INTO sqlite_sequence (name, seq)
                 SELECT ?1, ?2
                 WHERE NOT EXISTS (SELECT 1 FROM sqlite_sequence WHERE name = ?1)",
            )
            .bind(table)
            .bind(self.config.id_floor)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to seed id sequence for {table}"))?;

            sqlx::query("UPDATE sqlite_sequence SET seq = MAX(seq, ?2) WHERE name = ?1")
                .bind(table)
                .bind(self.config.id_floor)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to raise id sequence for {table}"))?;
        }

        tracing::debug!(floor = self.config.id_floor, "Seeded identifier floor");
        Ok(())
    }

    /// Check if database is healthy
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.config.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::in_memory()
            .await
            .expect("Failed to create in-memory database");

        // Health check should pass
        db.health_check().await.expect("Health check failed");

        // Migrations should have run
        let status = db
            .migration_status()
            .await
            .expect("Failed to get migration status");
        assert!(!status.needs_migration);
    }

    #[tokio::test]
    async fn test_database_config_builder() {
        let config = DatabaseConfig::with_path("/tmp/test.db")
            .max_connections(10)
            .id_floor(500)
            .no_migrate();

        assert_eq!(config.path, PathBuf::from("/tmp/test.db"));
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.id_floor, 500);
        assert!(!config.auto_migrate);
    }

    #[tokio::test]
    async fn test_id_floor_applies_to_users_and_groups() {
        let db = Database::in_memory().await.unwrap();

        let result = sqlx::query("INSERT INTO users (username, password_hash) VALUES (?, ?)")
            .bind("floor-check")
            .bind("hash")
            .execute(db.pool())
            .await
            .unwrap();
        assert_eq!(result.last_insert_rowid(), DEFAULT_ID_FLOOR + 1);

        let result = sqlx::query("INSERT INTO chat_groups (name, creator_id) VALUES (?, ?)")
            .bind("floor-check")
            .bind(DEFAULT_ID_FLOOR + 1)
            .execute(db.pool())
            .await
            .unwrap();
        assert_eq!(result.last_insert_rowid(), DEFAULT_ID_FLOOR + 1);
    }

    #[tokio::test]
    async fn test_seed_id_floor_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.seed_id_floor().await.unwrap();
        db.seed_id_floor().await.unwrap();

        let result = sqlx::query("INSERT INTO users (username, password_hash) VALUES (?, ?)")
            .bind("idempotent")
            .bind("hash")
            .execute(db.pool())
            .await
            .unwrap();
        assert_eq!(result.last_insert_rowid(), DEFAULT_ID_FLOOR + 1);
    }

    #[tokio::test]
    async fn test_on_disk_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.db");

        let db = Database::new(DatabaseConfig::with_path(&path)).await.unwrap();
        db.health_check().await.unwrap();
        db.close().await;

        assert!(path.exists());
    }
}
