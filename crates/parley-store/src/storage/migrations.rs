//! Database migrations
//!
//! This module manages SQLite schema migrations for parley-store.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Initial schema
///
/// The freshness markers on users are written only by the change notifier
/// (see the `notify` module), inside the same transaction as the graph
/// mutation they reflect. Friendships are stored as one undirected row per
/// pair, canonically ordered with the lower id first; both query directions
/// resolve to the same row.
const MIGRATION_V1: &str = r#"
    -- Registered accounts
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        bio TEXT,
        avatar_url TEXT,
        friends_updated_at INTEGER NOT NULL DEFAULT 0,
        groups_updated_at INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    -- Symmetric friendship edges, one row per unordered pair
    CREATE TABLE IF NOT EXISTS friendships (
        user_lo INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        user_hi INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (user_lo, user_hi),
        CHECK (user_lo < user_hi)
    );

    CREATE INDEX IF NOT EXISTS idx_friendships_user_hi ON friendships(user_hi);

    -- Group records; deleting the creator cascades to the group
    CREATE TABLE IF NOT EXISTS chat_groups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        creator_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        description TEXT,
        avatar_url TEXT,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    -- Membership edges; a user belongs to a group at most once
    CREATE TABLE IF NOT EXISTS group_members (
        group_id INTEGER NOT NULL REFERENCES chat_groups(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        joined_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (group_id, user_id)
    );

    CREATE INDEX IF NOT EXISTS idx_group_members_user ON group_members(user_id);

    -- Append-only direct message log; sent_at is the sender-supplied unix
    -- timestamp in seconds, ids break ordering ties
    CREATE TABLE IF NOT EXISTS direct_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sender_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        recipient_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        kind TEXT NOT NULL CHECK (kind IN ('text', 'image', 'file', 'video', 'audio')),
        body TEXT NOT NULL,
        sent_at INTEGER NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_direct_messages_pair
        ON direct_messages(sender_id, recipient_id, sent_at, id);
    CREATE INDEX IF NOT EXISTS idx_direct_messages_recipient
        ON direct_messages(recipient_id, sent_at);

    -- Append-only group message log
    CREATE TABLE IF NOT EXISTS group_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        group_id INTEGER NOT NULL REFERENCES chat_groups(id) ON DELETE CASCADE,
        sender_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        kind TEXT NOT NULL CHECK (kind IN ('text', 'image', 'file', 'video', 'audio')),
        body TEXT NOT NULL,
        sent_at INTEGER NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_group_messages_group
        ON group_messages(group_id, sent_at, id);
    CREATE INDEX IF NOT EXISTS idx_group_messages_sender
        ON group_messages(sender_id, group_id, sent_at);

    -- Offline delivery queue; each record references exactly one of the two
    -- message logs, enforced at the storage layer
    CREATE TABLE IF NOT EXISTS deliveries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        recipient_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        is_group INTEGER NOT NULL DEFAULT 0,
        direct_message_id INTEGER REFERENCES direct_messages(id) ON DELETE CASCADE,
        group_message_id INTEGER REFERENCES group_messages(id) ON DELETE CASCADE,
        delivered INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        CHECK (
            (is_group = 0 AND direct_message_id IS NOT NULL AND group_message_id IS NULL)
            OR
            (is_group = 1 AND group_message_id IS NOT NULL AND direct_message_id IS NULL)
        )
    );

    CREATE INDEX IF NOT EXISTS idx_deliveries_pending
        ON deliveries(recipient_id, delivered);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    // Ensure migrations table exists
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    // MAX over an empty table yields a NULL row, not zero rows
    let row: (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;

    Ok(row.0.unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Initial schema");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check if the database needs migrations
pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    let current_version = get_current_version(pool).await?;
    Ok(current_version < CURRENT_VERSION)
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;

        // Should start with no migrations
        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, 0);
        assert!(status.needs_migration);

        // Run migrations
        run_migrations(&pool).await.unwrap();

        // Should be at current version
        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
        assert!(!status.needs_migration);
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = create_test_pool().await;

        // Run migrations twice
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        // Should still be at current version
        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_tables_created() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        // Check that tables exist by querying them
        let tables = vec![
            "users",
            "friendships",
            "chat_groups",
            "group_members",
            "direct_messages",
            "group_messages",
            "deliveries",
        ];

        for table in tables {
            let result: (i32,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&pool)
                .await
                .unwrap_or_else(|_| panic!("Table {table} should exist"));
            assert_eq!(result.0, 0, "Table {table} should be empty");
        }
    }

    #[tokio::test]
    async fn test_delivery_check_constraint() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        // A delivery row referencing neither or both message logs must be
        // rejected by the schema, before any application-level validation
        // runs.
        let neither = sqlx::query(
            "INSERT INTO deliveries (recipient_id, is_group, direct_message_id, group_message_id)
             VALUES (1, 0, NULL, NULL)",
        )
        .execute(&pool)
        .await;
        assert!(neither.is_err());

        let both = sqlx::query(
            "INSERT INTO deliveries (recipient_id, is_group, direct_message_id, group_message_id)
             VALUES (1, 0, 1, 1)",
        )
        .execute(&pool)
        .await;
        assert!(both.is_err());
    }
}
