//! Group entity types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{GroupId, UserId};

/// Group row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Deleting the creator cascades to the group and its messages.
    pub creator_id: UserId,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Compact group projection for a user's group list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct GroupSummary {
    pub id: GroupId,
    pub name: String,
}
