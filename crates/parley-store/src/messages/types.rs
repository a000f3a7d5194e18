//! Message entity types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{GroupId, MessageId, UserId};

/// Payload classification carried on every message row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    File,
    Video,
    Audio,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// Parse from the stored column value; the schema CHECK keeps unknown
    /// values out, so `None` here means a corrupt row.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// One entry in the direct message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub kind: MessageKind,
    /// Text payload or an opaque reference for non-text kinds.
    pub body: String,
    /// Sender-supplied unix timestamp in seconds.
    pub sent_at: i64,
    pub created_at: NaiveDateTime,
}

/// One entry in the group message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessage {
    pub id: MessageId,
    pub group_id: GroupId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub body: String,
    pub sent_at: i64,
    pub created_at: NaiveDateTime,
}
