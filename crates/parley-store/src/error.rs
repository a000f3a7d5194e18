//! Error types for parley-store

use thiserror::Error;

use crate::{DeliveryId, GroupId, MessageId, UserId};

/// Result type alias using the store's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Storage-layer error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("group {0} not found")]
    GroupNotFound(GroupId),

    #[error("no friendship between users {0} and {1}")]
    FriendshipNotFound(UserId, UserId),

    #[error("user {1} is not a member of group {0}")]
    MembershipNotFound(GroupId, UserId),

    #[error("delivery record {0} not found")]
    DeliveryNotFound(DeliveryId),

    #[error("message {0} not found")]
    MessageNotFound(MessageId),

    #[error("users {0} and {1} are already friends")]
    AlreadyFriends(UserId, UserId),

    #[error("user {1} already belongs to group {0}")]
    AlreadyMember(GroupId, UserId),

    #[error("user {0} cannot befriend themselves")]
    SelfFriendship(UserId),

    #[error("delivery record must reference exactly one of a direct or group message")]
    InvalidMessageRef,

    #[error("user {1} is not a member of group {0} and cannot post there")]
    NotAMember(GroupId, UserId),

    #[error("delivery record {0} was already acknowledged")]
    AlreadyDelivered(DeliveryId),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Coarse error classification, stable across variant changes.
///
/// Callers branching on failure mode (retry, surface to client, log as a
/// defect) should match on this instead of individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced entity is absent.
    NotFound,
    /// A uniqueness constraint on an edge or membership was violated.
    AlreadyExists,
    /// The request itself is malformed (self-edge, invalid message reference).
    InvalidArgument,
    /// The sender is not authorized for the target group.
    PermissionDenied,
    /// A state transition was attempted twice (double acknowledgment).
    Conflict,
    /// The storage engine failed; reads may be retried, writes must not be
    /// blindly retried without a deduplication key.
    Storage,
}

impl Error {
    /// Classify this error into the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UserNotFound(_)
            | Self::GroupNotFound(_)
            | Self::FriendshipNotFound(..)
            | Self::MembershipNotFound(..)
            | Self::DeliveryNotFound(_)
            | Self::MessageNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyFriends(..) | Self::AlreadyMember(..) => ErrorKind::AlreadyExists,
            Self::SelfFriendship(_) | Self::InvalidMessageRef => ErrorKind::InvalidArgument,
            Self::NotAMember(..) => ErrorKind::PermissionDenied,
            Self::AlreadyDelivered(_) => ErrorKind::Conflict,
            Self::Database(_) => ErrorKind::Storage,
        }
    }
}

/// True when the engine reported a uniqueness violation.
///
/// Duplicate edges are detected here rather than by check-then-insert, so
/// two racing inserts serialize on the primary key and the loser fails.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// True when the engine reported a foreign-key violation.
pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}
