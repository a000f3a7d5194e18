//! Friendship and group membership storage

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{Error, Result, is_unique_violation};
use crate::groups::store::ensure_group;
use crate::groups::types::GroupSummary;
use crate::identity::store::ensure_user;
use crate::identity::types::UserSummary;
use crate::notify;
use crate::{GroupId, UserId};

/// Store for the social graph: symmetric friendship edges and group
/// membership edges
#[derive(Debug, Clone)]
pub struct SocialStore {
    pool: SqlitePool,
}

impl SocialStore {
    /// Create a new social graph store with the given database pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a friendship edge between two users
    ///
    /// The edge is undirected: one row per pair, stored canonically with the
    /// lower id first, so a duplicate insert in either orientation hits the
    /// same primary key. Racing inserts serialize on that key; the loser
    /// observes `AlreadyFriends`. Both endpoints' `friends_updated_at`
    /// markers advance in the same transaction.
    pub async fn add_friend(&self, a: UserId, b: UserId) -> Result<()> {
        if a == b {
            return Err(Error::SelfFriendship(a));
        }
        let (lo, hi) = canonical(a, b);

        let mut tx = self.pool.begin().await?;
        ensure_user(&mut tx, a).await?;
        ensure_user(&mut tx, b).await?;

        let inserted = sqlx::query("INSERT INTO friendships (user_lo, user_hi) VALUES (?, ?)")
            .bind(lo)
            .bind(hi)
            .execute(&mut *tx)
            .await;
        match inserted {
            Err(err) if is_unique_violation(&err) => return Err(Error::AlreadyFriends(a, b)),
            other => {
                other?;
            }
        }

        notify::stamp_friends(&mut tx, a).await?;
        notify::stamp_friends(&mut tx, b).await?;
        tx.commit().await?;

        debug!(user_a = a, user_b = b, "Friendship created");
        Ok(())
    }

    /// Remove the friendship edge between two users
    ///
    /// Removing an absent edge fails with `FriendshipNotFound`; silent no-op
    /// success would let a missed stamp go unnoticed.
    pub async fn remove_friend(&self, a: UserId, b: UserId) -> Result<()> {
        let (lo, hi) = canonical(a, b);

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM friendships WHERE user_lo = ? AND user_hi = ?")
            .bind(lo)
            .bind(hi)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::FriendshipNotFound(a, b));
        }

        notify::stamp_friends(&mut tx, a).await?;
        notify::stamp_friends(&mut tx, b).await?;
        tx.commit().await?;

        debug!(user_a = a, user_b = b, "Friendship removed");
        Ok(())
    }

    /// Whether a friendship edge exists between two users
    pub async fn are_friends(&self, a: UserId, b: UserId) -> Result<bool> {
        let (lo, hi) = canonical(a, b);
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM friendships WHERE user_lo = ? AND user_hi = ?")
                .bind(lo)
                .bind(hi)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// List a user's friends
    ///
    /// The canonical single-row storage makes this orientation-independent by
    /// construction: whichever side of the pair the caller is on, the same
    /// row matches.
    pub async fn list_friends(&self, user: UserId) -> Result<Vec<UserSummary>> {
        let friends = sqlx::query_as::<_, UserSummary>(
            "SELECT u.id, u.username, u.avatar_url
             FROM friendships f
             JOIN users u ON u.id = CASE WHEN f.user_lo = ?1 THEN f.user_hi ELSE f.user_lo END
             WHERE ?1 IN (f.user_lo, f.user_hi)
             ORDER BY u.id",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(friends)
    }

    /// Enroll a user in a group
    ///
    /// Stamps only the joining user's `groups_updated_at`, in the same
    /// transaction as the membership insert.
    pub async fn join_group(&self, group: GroupId, user: UserId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        ensure_group(&mut tx, group).await?;
        ensure_user(&mut tx, user).await?;

        let inserted = sqlx::query("INSERT INTO group_members (group_id, user_id) VALUES (?, ?)")
            .bind(group)
            .bind(user)
            .execute(&mut *tx)
            .await;
        match inserted {
            Err(err) if is_unique_violation(&err) => return Err(Error::AlreadyMember(group, user)),
            other => {
                other?;
            }
        }

        notify::stamp_groups(&mut tx, user).await?;
        tx.commit().await?;

        debug!(group, user, "User joined group");
        Ok(())
    }

    /// Remove a user from a group
    pub async fn leave_group(&self, group: GroupId, user: UserId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group)
            .bind(user)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::MembershipNotFound(group, user));
        }

        notify::stamp_groups(&mut tx, user).await?;
        tx.commit().await?;

        debug!(group, user, "User left group");
        Ok(())
    }

    /// List the members of a group
    pub async fn members(&self, group: GroupId) -> Result<Vec<UserSummary>> {
        ensure_group_on_pool(&self.pool, group).await?;

        let members = sqlx::query_as::<_, UserSummary>(
            "SELECT u.id, u.username, u.avatar_url
             FROM group_members gm
             JOIN users u ON u.id = gm.user_id
             WHERE gm.group_id = ?
             ORDER BY u.id",
        )
        .bind(group)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    /// List the groups a user belongs to
    pub async fn list_groups(&self, user: UserId) -> Result<Vec<GroupSummary>> {
        let groups = sqlx::query_as::<_, GroupSummary>(
            "SELECT g.id, g.name
             FROM group_members gm
             JOIN chat_groups g ON g.id = gm.group_id
             WHERE gm.user_id = ?
             ORDER BY g.id",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(groups)
    }
}

fn canonical(a: UserId, b: UserId) -> (UserId, UserId) {
    if a < b { (a, b) } else { (b, a) }
}

async fn ensure_group_on_pool(pool: &SqlitePool, group: GroupId) -> Result<()> {
    let mut conn = pool.acquire().await?;
    ensure_group(&mut conn, group).await
}

/// Whether the user holds a membership edge for the group.
pub(crate) async fn is_member(
    conn: &mut SqliteConnection,
    group: GroupId,
    user: UserId,
) -> Result<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group)
            .bind(user)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row.is_some())
}
