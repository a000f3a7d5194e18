//! Parley storage core
//!
//! This crate provides the relational storage layer for the Parley chat
//! service, including:
//! - Identity (user accounts and profile data)
//! - Social graph (friendships and group memberships)
//! - Groups (group records and roster enrollment)
//! - Message logs (append-only direct and group messages)
//! - Offline delivery queue (pending hand-offs to disconnected recipients)
//! - Change notification (per-user freshness markers for cheap polling)
//!
//! Everything runs against a single SQLite pool; mutations that touch more
//! than one row execute in one transaction so graph edges and their freshness
//! stamps commit or roll back together.

pub mod config;
pub mod delivery;
pub mod error;
pub mod groups;
pub mod identity;
pub mod messages;
pub mod notify;
pub mod presence;
pub mod social;
pub mod storage;

pub use error::{Error, ErrorKind, Result};

/// Engine-assigned user identifier.
pub type UserId = i64;
/// Engine-assigned group identifier.
pub type GroupId = i64;
/// Engine-assigned message identifier, monotonic within its log.
pub type MessageId = i64;
/// Engine-assigned delivery record identifier.
pub type DeliveryId = i64;

/// All domain stores bundled over one shared connection pool.
#[derive(Debug, Clone)]
pub struct ChatStore {
    database: storage::Database,
    users: identity::UserStore,
    social: social::SocialStore,
    groups: groups::GroupStore,
    messages: messages::MessageStore,
    delivery: delivery::DeliveryQueue,
}

impl ChatStore {
    /// Open (and migrate) the database at the configured path.
    pub async fn open(config: storage::DatabaseConfig) -> anyhow::Result<Self> {
        Ok(Self::from_database(storage::Database::new(config).await?))
    }

    /// Open an in-memory store, useful for testing.
    pub async fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::from_database(storage::Database::in_memory().await?))
    }

    /// Build the store bundle from an already-initialized database.
    pub fn from_database(database: storage::Database) -> Self {
        let pool = database.pool().clone();
        Self {
            users: identity::UserStore::new(pool.clone()),
            social: social::SocialStore::new(pool.clone()),
            groups: groups::GroupStore::new(pool.clone()),
            messages: messages::MessageStore::new(pool.clone()),
            delivery: delivery::DeliveryQueue::new(pool),
            database,
        }
    }

    pub fn database(&self) -> &storage::Database {
        &self.database
    }

    pub fn users(&self) -> &identity::UserStore {
        &self.users
    }

    pub fn social(&self) -> &social::SocialStore {
        &self.social
    }

    pub fn groups(&self) -> &groups::GroupStore {
        &self.groups
    }

    pub fn messages(&self) -> &messages::MessageStore {
        &self.messages
    }

    pub fn delivery(&self) -> &delivery::DeliveryQueue {
        &self.delivery
    }
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ChatStore;
    pub use crate::config::StoreConfig;
    pub use crate::delivery::{DeliveryQueue, DeliveryRecord, MessageRef};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::groups::GroupStore;
    pub use crate::identity::UserStore;
    pub use crate::messages::{MessageKind, MessageStore};
    pub use crate::notify::Freshness;
    pub use crate::presence::{ConnectedSet, Presence};
    pub use crate::social::SocialStore;
    pub use crate::storage::{Database, DatabaseConfig};
    pub use crate::{DeliveryId, GroupId, MessageId, UserId};
}
