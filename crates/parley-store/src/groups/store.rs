//! Group record storage

use std::collections::BTreeSet;

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identity::store::ensure_user;
use crate::notify;
use crate::{GroupId, UserId};

use super::types::Group;

/// Store for creating and maintaining group records
#[derive(Debug, Clone)]
pub struct GroupStore {
    pool: SqlitePool,
}

impl GroupStore {
    /// Create a new group store with the given database pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a group and enroll its initial roster
    ///
    /// The creator always becomes a member; duplicate or creator entries in
    /// `members` are dropped. Every enrolled user's `groups_updated_at`
    /// marker advances in the same transaction as the enrollment.
    pub async fn create(
        &self,
        creator: UserId,
        name: &str,
        description: Option<&str>,
        members: &[UserId],
    ) -> Result<GroupId> {
        let mut tx = self.pool.begin().await?;
        ensure_user(&mut tx, creator).await?;

        let result =
            sqlx::query("INSERT INTO chat_groups (name, creator_id, description) VALUES (?, ?, ?)")
                .bind(name)
                .bind(creator)
                .bind(description)
                .execute(&mut *tx)
                .await?;
        let group = result.last_insert_rowid();

        let roster: BTreeSet<UserId> = std::iter::once(creator)
            .chain(members.iter().copied())
            .collect();

        for user in &roster {
            if *user != creator {
                ensure_user(&mut tx, *user).await?;
            }
            sqlx::query("INSERT INTO group_members (group_id, user_id) VALUES (?, ?)")
                .bind(group)
                .bind(user)
                .execute(&mut *tx)
                .await?;
            notify::stamp_groups(&mut tx, *user).await?;
        }

        tx.commit().await?;

        debug!(group, creator, roster = roster.len(), "Group created");
        Ok(group)
    }

    /// Get a group by id
    pub async fn get(&self, id: GroupId) -> Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT id, name, creator_id, description, avatar_url, created_at
             FROM chat_groups WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    /// Delete a group
    ///
    /// Cascades to memberships, the group's message log, and delivery
    /// records referencing those messages.
    pub async fn delete(&self, id: GroupId) -> Result<()> {
        let result = sqlx::query("DELETE FROM chat_groups WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::GroupNotFound(id));
        }

        debug!(group = id, "Group deleted");
        Ok(())
    }
}

/// Fail with `GroupNotFound` unless the group row exists.
pub(crate) async fn ensure_group(conn: &mut SqliteConnection, id: GroupId) -> Result<()> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM chat_groups WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(_) => Ok(()),
        None => Err(Error::GroupNotFound(id)),
    }
}
