//! Delivery queue entity types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{DeliveryId, MessageId, UserId};

/// Pointer into exactly one of the two message logs.
///
/// Stored as an `(is_group, direct_message_id, group_message_id)` column
/// triple; a schema CHECK keeps exactly one id column populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "log", content = "id", rename_all = "snake_case")]
pub enum MessageRef {
    Direct(MessageId),
    Group(MessageId),
}

impl MessageRef {
    /// The id of the referenced message, whichever log it lives in.
    pub fn id(&self) -> MessageId {
        match *self {
            Self::Direct(id) | Self::Group(id) => id,
        }
    }

    pub(crate) fn columns(&self) -> (bool, Option<MessageId>, Option<MessageId>) {
        match *self {
            Self::Direct(id) => (false, Some(id), None),
            Self::Group(id) => (true, None, Some(id)),
        }
    }

    pub(crate) fn from_columns(
        is_group: bool,
        direct: Option<MessageId>,
        group: Option<MessageId>,
    ) -> Result<Self> {
        match (is_group, direct, group) {
            (false, Some(id), None) => Ok(Self::Direct(id)),
            (true, None, Some(id)) => Ok(Self::Group(id)),
            _ => Err(Error::InvalidMessageRef),
        }
    }
}

/// One pending or acknowledged entry in a recipient's delivery queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: DeliveryId,
    pub recipient_id: UserId,
    pub message: MessageRef,
    pub delivered: bool,
    /// Sender-supplied timestamp of the referenced message, joined in for
    /// drain ordering.
    pub sent_at: i64,
    pub created_at: NaiveDateTime,
}
