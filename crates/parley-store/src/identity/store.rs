//! User account storage

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::UserId;
use crate::error::{Error, Result};

use super::types::{ProfilePatch, User};

const SELECT_USER: &str = "SELECT id, username, password_hash, bio, avatar_url, \
     friends_updated_at, groups_updated_at, created_at \
     FROM users WHERE id = ?";

/// Store for registering and maintaining user accounts
#[derive(Debug, Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    /// Create a new user store with the given database pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a new account, returning its engine-assigned id
    pub async fn register(&self, username: &str, password_hash: &str) -> Result<UserId> {
        let result = sqlx::query("INSERT INTO users (username, password_hash) VALUES (?, ?)")
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        let id = result.last_insert_rowid();
        debug!(user = id, username, "User registered");
        Ok(id)
    }

    /// Get a user by id
    pub async fn get(&self, id: UserId) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(SELECT_USER)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Apply a partial profile update
    ///
    /// Fields left unset in the patch keep their stored value. The freshness
    /// markers are never touched here.
    pub async fn update_profile(&self, id: UserId, patch: ProfilePatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let result = sqlx::query(
            "UPDATE users SET
                username = COALESCE(?1, username),
                bio = COALESCE(?2, bio),
                avatar_url = COALESCE(?3, avatar_url)
             WHERE id = ?4",
        )
        .bind(&patch.username)
        .bind(&patch.bio)
        .bind(&patch.avatar_url)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound(id));
        }

        debug!(user = id, "Profile updated");
        Ok(())
    }

    /// Replace the stored credential hash
    pub async fn update_password(&self, id: UserId, password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound(id));
        }
        Ok(())
    }

    /// Fetch the stored credential hash
    pub async fn password_hash(&self, id: UserId) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT password_hash FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(hash,)| hash))
    }

    /// Delete an account
    ///
    /// Foreign keys cascade: incident friendship edges, memberships, sent and
    /// received messages, and delivery records referencing those messages are
    /// all removed with the user.
    pub async fn delete(&self, id: UserId) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound(id));
        }

        debug!(user = id, "User deleted");
        Ok(())
    }
}

/// Fail with `UserNotFound` unless the user row exists.
///
/// Takes a bare connection so graph and message mutations can validate
/// endpoints inside their own transaction.
pub(crate) async fn ensure_user(conn: &mut SqliteConnection, id: UserId) -> Result<()> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(_) => Ok(()),
        None => Err(Error::UserNotFound(id)),
    }
}
