//! Append-only message log storage

use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::delivery::queue::enqueue_in;
use crate::delivery::types::MessageRef;
use crate::error::{Error, Result};
use crate::groups::store::ensure_group;
use crate::identity::store::ensure_user;
use crate::presence::Presence;
use crate::social::store::is_member;
use crate::{GroupId, MessageId, UserId};

use super::types::{DirectMessage, GroupMessage, MessageKind};

/// Store for the direct and group message logs
#[derive(Debug, Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    /// Create a new message store with the given database pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a direct message, returning its id
    ///
    /// `sent_at` is the sender-supplied unix timestamp in seconds; ordering
    /// across senders with skewed clocks is an application policy, not
    /// enforced here. Enqueueing a delivery record for an offline recipient
    /// is deliberately left to the caller (via
    /// [`DeliveryQueue::enqueue`](crate::delivery::DeliveryQueue::enqueue)),
    /// so presence-detection policy stays outside the store.
    pub async fn send_direct(
        &self,
        sender: UserId,
        recipient: UserId,
        kind: MessageKind,
        body: &str,
        sent_at: i64,
    ) -> Result<MessageId> {
        let mut tx = self.pool.begin().await?;
        ensure_user(&mut tx, sender).await?;
        ensure_user(&mut tx, recipient).await?;

        let result = sqlx::query(
            "INSERT INTO direct_messages (sender_id, recipient_id, kind, body, sent_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(sender)
        .bind(recipient)
        .bind(kind.as_str())
        .bind(body)
        .bind(sent_at)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();
        tx.commit().await?;

        debug!(message = id, sender, recipient, "Direct message appended");
        Ok(id)
    }

    /// Append a group message and fan out delivery records
    ///
    /// Fails with `NotAMember` when the sender does not belong to the group.
    /// One delivery record is enqueued for every *other* current member the
    /// presence predicate reports as offline; the append and the fan-out
    /// commit atomically. A member leaving concurrently may still receive
    /// one final record, an accepted race.
    pub async fn send_group(
        &self,
        sender: UserId,
        group: GroupId,
        kind: MessageKind,
        body: &str,
        sent_at: i64,
        presence: &dyn Presence,
    ) -> Result<MessageId> {
        let mut tx = self.pool.begin().await?;
        ensure_user(&mut tx, sender).await?;
        ensure_group(&mut tx, group).await?;
        if !is_member(&mut tx, group, sender).await? {
            return Err(Error::NotAMember(group, sender));
        }

        let result = sqlx::query(
            "INSERT INTO group_messages (group_id, sender_id, kind, body, sent_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(group)
        .bind(sender)
        .bind(kind.as_str())
        .bind(body)
        .bind(sent_at)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        let members: Vec<(UserId,)> =
            sqlx::query_as("SELECT user_id FROM group_members WHERE group_id = ? AND user_id != ?")
                .bind(group)
                .bind(sender)
                .fetch_all(&mut *tx)
                .await?;

        let mut fanout = 0;
        for (member,) in members {
            if !presence.is_connected(member) {
                enqueue_in(&mut tx, member, MessageRef::Group(id)).await?;
                fanout += 1;
            }
        }

        tx.commit().await?;

        debug!(message = id, group, sender, fanout, "Group message appended");
        Ok(id)
    }

    /// Page through the conversation between two users
    ///
    /// Strictly ordered by `(sent_at, id)` ascending; the id breaks ties
    /// between sends sharing a timestamp, so cursors are stable.
    pub async fn direct_history(
        &self,
        a: UserId,
        b: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DirectMessage>> {
        let rows: Vec<DirectMessageRow> = sqlx::query_as(
            "SELECT id, sender_id, recipient_id, kind, body, sent_at, created_at
             FROM direct_messages
             WHERE (sender_id = ?1 AND recipient_id = ?2)
                OR (sender_id = ?2 AND recipient_id = ?1)
             ORDER BY sent_at, id
             LIMIT ?3 OFFSET ?4",
        )
        .bind(a)
        .bind(b)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DirectMessageRow::into_message).collect()
    }

    /// Fetch the conversation between two users strictly after a timestamp
    ///
    /// The synchronization counterpart of [`direct_history`]: a client that
    /// remembers the last `sent_at` it saw pulls only what it missed. Records
    /// sharing `since` exactly are excluded, so callers resume from their
    /// last-seen value without re-reading it.
    ///
    /// [`direct_history`]: MessageStore::direct_history
    pub async fn direct_history_after(
        &self,
        a: UserId,
        b: UserId,
        since: i64,
    ) -> Result<Vec<DirectMessage>> {
        let rows: Vec<DirectMessageRow> = sqlx::query_as(
            "SELECT id, sender_id, recipient_id, kind, body, sent_at, created_at
             FROM direct_messages
             WHERE ((sender_id = ?1 AND recipient_id = ?2)
                 OR (sender_id = ?2 AND recipient_id = ?1))
               AND sent_at > ?3
             ORDER BY sent_at, id",
        )
        .bind(a)
        .bind(b)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DirectMessageRow::into_message).collect()
    }

    /// Fetch a group's messages strictly after a timestamp
    pub async fn group_history_after(
        &self,
        group: GroupId,
        since: i64,
    ) -> Result<Vec<GroupMessage>> {
        let rows: Vec<GroupMessageRow> = sqlx::query_as(
            "SELECT id, group_id, sender_id, kind, body, sent_at, created_at
             FROM group_messages
             WHERE group_id = ? AND sent_at > ?
             ORDER BY sent_at, id",
        )
        .bind(group)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GroupMessageRow::into_message).collect()
    }

    /// Latest `sent_at` in the conversation between two users
    ///
    /// `None` when the pair has never exchanged a message. Clients compare
    /// this against their last-seen value to decide whether to sync at all.
    pub async fn latest_direct_timestamp(&self, a: UserId, b: UserId) -> Result<Option<i64>> {
        let (latest,): (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(sent_at) FROM direct_messages
             WHERE (sender_id = ?1 AND recipient_id = ?2)
                OR (sender_id = ?2 AND recipient_id = ?1)",
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.pool)
        .await?;
        Ok(latest)
    }

    /// Latest `sent_at` in a group's message log, `None` when it is empty
    pub async fn latest_group_timestamp(&self, group: GroupId) -> Result<Option<i64>> {
        let (latest,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(sent_at) FROM group_messages WHERE group_id = ?")
                .bind(group)
                .fetch_one(&self.pool)
                .await?;
        Ok(latest)
    }

    /// Page through a group's message log, ordered by `(sent_at, id)`
    pub async fn group_history(
        &self,
        group: GroupId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GroupMessage>> {
        let rows: Vec<GroupMessageRow> = sqlx::query_as(
            "SELECT id, group_id, sender_id, kind, body, sent_at, created_at
             FROM group_messages
             WHERE group_id = ?
             ORDER BY sent_at, id
             LIMIT ? OFFSET ?",
        )
        .bind(group)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GroupMessageRow::into_message).collect()
    }
}

#[derive(FromRow)]
struct DirectMessageRow {
    id: MessageId,
    sender_id: UserId,
    recipient_id: UserId,
    kind: String,
    body: String,
    sent_at: i64,
    created_at: chrono::NaiveDateTime,
}

impl DirectMessageRow {
    fn into_message(self) -> Result<DirectMessage> {
        Ok(DirectMessage {
            id: self.id,
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            kind: parse_kind(&self.kind)?,
            body: self.body,
            sent_at: self.sent_at,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct GroupMessageRow {
    id: MessageId,
    group_id: GroupId,
    sender_id: UserId,
    kind: String,
    body: String,
    sent_at: i64,
    created_at: chrono::NaiveDateTime,
}

impl GroupMessageRow {
    fn into_message(self) -> Result<GroupMessage> {
        Ok(GroupMessage {
            id: self.id,
            group_id: self.group_id,
            sender_id: self.sender_id,
            kind: parse_kind(&self.kind)?,
            body: self.body,
            sent_at: self.sent_at,
            created_at: self.created_at,
        })
    }
}

// The schema CHECK keeps unknown kinds out; hitting this means the row is
// corrupt, surfaced as a decode failure rather than a panic.
fn parse_kind(s: &str) -> Result<MessageKind> {
    MessageKind::parse(s)
        .ok_or_else(|| Error::Database(sqlx::Error::Decode(format!("unknown message kind '{s}'").into())))
}
