//! User entity types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::UserId;

/// Registered account row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    /// Millisecond stamp, advanced whenever this user's friend list changes.
    pub friends_updated_at: i64,
    /// Millisecond stamp, advanced whenever this user's group list changes.
    pub groups_updated_at: i64,
    pub created_at: NaiveDateTime,
}

/// Compact user projection for friend lists and group rosters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Partial profile update; fields left as `None` are unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.bio.is_none() && self.avatar_url.is_none()
    }
}
