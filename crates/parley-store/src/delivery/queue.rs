//! Delivery queue storage

use async_stream::try_stream;
use futures_core::Stream;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{self, Error, Result};
use crate::identity::store::ensure_user;
use crate::{DeliveryId, UserId};

use super::types::{DeliveryRecord, MessageRef};

/// Rows fetched per round trip while draining a queue.
const DRAIN_BATCH: i64 = 256;

/// Store for pending delivery records
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    pool: SqlitePool,
}

impl DeliveryQueue {
    /// Create a new delivery queue with the given database pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Enqueue a delivery record for an offline recipient
    ///
    /// Fails with `MessageNotFound` when the referenced message does not
    /// exist. The same message may be enqueued for a recipient more than
    /// once; the queue does not dedupe.
    pub async fn enqueue(&self, recipient: UserId, message: MessageRef) -> Result<DeliveryId> {
        let mut tx = self.pool.begin().await?;
        ensure_user(&mut tx, recipient).await?;
        let id = enqueue_in(&mut tx, recipient, message).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Stream a recipient's undelivered records, oldest first
    ///
    /// Ordered by the referenced message's `(sent_at, id)` with the record
    /// id as the final tiebreaker. The stream fetches lazily in batches and
    /// uses a keyset cursor, so records acknowledged mid-drain are simply
    /// not revisited; records enqueued behind the cursor mid-drain are
    /// picked up by the next drain.
    pub fn pending_for(
        &self,
        recipient: UserId,
    ) -> impl Stream<Item = Result<DeliveryRecord>> + '_ {
        try_stream! {
            let mut cursor: (i64, i64, i64) = (i64::MIN, i64::MIN, i64::MIN);
            loop {
                let rows: Vec<SqliteRow> = sqlx::query(
                    "SELECT d.id, d.recipient_id, d.is_group,
                            d.direct_message_id, d.group_message_id, d.delivered,
                            COALESCE(m.sent_at, gm.sent_at) AS sent_at,
                            COALESCE(m.id, gm.id) AS message_id,
                            d.created_at
                     FROM deliveries d
                     LEFT JOIN direct_messages m ON d.direct_message_id = m.id
                     LEFT JOIN group_messages gm ON d.group_message_id = gm.id
                     WHERE d.recipient_id = ?1 AND d.delivered = 0
                       AND (COALESCE(m.sent_at, gm.sent_at), COALESCE(m.id, gm.id), d.id)
                           > (?2, ?3, ?4)
                     ORDER BY COALESCE(m.sent_at, gm.sent_at), COALESCE(m.id, gm.id), d.id
                     LIMIT ?5",
                )
                .bind(recipient)
                .bind(cursor.0)
                .bind(cursor.1)
                .bind(cursor.2)
                .bind(DRAIN_BATCH)
                .fetch_all(&self.pool)
                .await?;

                let done = (rows.len() as i64) < DRAIN_BATCH;
                for row in rows {
                    let record = record_from_row(&row)?;
                    cursor = (record.sent_at, record.message.id(), record.id);
                    yield record;
                }
                if done {
                    break;
                }
            }
        }
    }

    /// Number of undelivered records waiting for a recipient
    pub async fn pending_count(&self, recipient: UserId) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM deliveries WHERE recipient_id = ? AND delivered = 0",
        )
        .bind(recipient)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Mark one delivery record as delivered
    ///
    /// The latch is one-way: acknowledging an already-delivered record
    /// fails with `AlreadyDelivered`, an unknown id with
    /// `DeliveryNotFound`.
    pub async fn acknowledge(&self, id: DeliveryId) -> Result<()> {
        let result = sqlx::query("UPDATE deliveries SET delivered = 1 WHERE id = ? AND delivered = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            let row: Option<(bool,)> = sqlx::query_as("SELECT delivered FROM deliveries WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            return match row {
                None => Err(Error::DeliveryNotFound(id)),
                Some(_) => Err(Error::AlreadyDelivered(id)),
            };
        }

        debug!(delivery = id, "Delivery acknowledged");
        Ok(())
    }
}

/// Insert a delivery record inside an open transaction.
///
/// Shared between [`DeliveryQueue::enqueue`] and the group-send fan-out so
/// a message append and its records commit together. A foreign key
/// violation means the referenced message row does not exist.
pub(crate) async fn enqueue_in(
    conn: &mut SqliteConnection,
    recipient: UserId,
    message: MessageRef,
) -> Result<DeliveryId> {
    let (is_group, direct, group) = message.columns();
    let result = sqlx::query(
        "INSERT INTO deliveries (recipient_id, is_group, direct_message_id, group_message_id)
         VALUES (?, ?, ?, ?)",
    )
    .bind(recipient)
    .bind(is_group)
    .bind(direct)
    .bind(group)
    .execute(&mut *conn)
    .await
    .map_err(|err| {
        if error::is_foreign_key_violation(&err) {
            Error::MessageNotFound(message.id())
        } else {
            Error::Database(err)
        }
    })?;

    let id = result.last_insert_rowid();
    debug!(delivery = id, recipient, message = message.id(), "Delivery enqueued");
    Ok(id)
}

fn record_from_row(row: &SqliteRow) -> Result<DeliveryRecord> {
    let message = MessageRef::from_columns(
        row.try_get("is_group")?,
        row.try_get("direct_message_id")?,
        row.try_get("group_message_id")?,
    )?;
    Ok(DeliveryRecord {
        id: row.try_get("id")?,
        recipient_id: row.try_get("recipient_id")?,
        message,
        delivered: row.try_get("delivered")?,
        sent_at: row.try_get("sent_at")?,
        created_at: row.try_get("created_at")?,
    })
}
