//! Identity store - user accounts and profile data
//!
//! Freshness markers on a user (`friends_updated_at`, `groups_updated_at`)
//! are owned by this store's rows but written only by the change notifier
//! (see [`crate::notify`]); profile operations never touch them.

pub mod store;
pub mod types;

pub use store::UserStore;
pub use types::{ProfilePatch, User, UserSummary};
