//! Change notification - per-user freshness markers
//!
//! The relational model's AFTER INSERT/DELETE trigger behavior,
//! re-architected as an explicit application-level step: every graph
//! mutation calls a stamping function here inside its own transaction, so
//! the edge change and the marker update commit or roll back together. No
//! engine callbacks, no background polling.
//!
//! Clients poll [`freshness`] and re-fetch their friend or group list only
//! when the corresponding marker advances past the last value they saw.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::UserId;
use crate::error::{Error, Result};

// The marker moves to max(now, current + 1): strictly ahead of its previous
// value even when two mutations land in the same clock millisecond, and
// never backwards under clock skew.
const STAMP_FRIENDS: &str =
    "UPDATE users SET friends_updated_at = MAX(?1, friends_updated_at + 1) WHERE id = ?2";
const STAMP_GROUPS: &str =
    "UPDATE users SET groups_updated_at = MAX(?1, groups_updated_at + 1) WHERE id = ?2";

/// Per-user freshness markers, unix millisecond stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub friends_updated_at: i64,
    pub groups_updated_at: i64,
}

/// Advance `friends_updated_at` for `user` within the caller's transaction.
pub async fn stamp_friends(conn: &mut SqliteConnection, user: UserId) -> Result<()> {
    stamp(conn, STAMP_FRIENDS, user).await
}

/// Advance `groups_updated_at` for `user` within the caller's transaction.
pub async fn stamp_groups(conn: &mut SqliteConnection, user: UserId) -> Result<()> {
    stamp(conn, STAMP_GROUPS, user).await
}

async fn stamp(conn: &mut SqliteConnection, sql: &str, user: UserId) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    let result = sqlx::query(sql)
        .bind(now)
        .bind(user)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::UserNotFound(user));
    }
    Ok(())
}

/// Read both freshness markers for a user.
pub async fn freshness(pool: &SqlitePool, user: UserId) -> Result<Freshness> {
    let row: Option<(i64, i64)> =
        sqlx::query_as("SELECT friends_updated_at, groups_updated_at FROM users WHERE id = ?")
            .bind(user)
            .fetch_optional(pool)
            .await?;

    row.map(|(friends_updated_at, groups_updated_at)| Freshness {
        friends_updated_at,
        groups_updated_at,
    })
    .ok_or(Error::UserNotFound(user))
}
