//! Message stores - append-only direct and group message logs
//!
//! Messages are immutable once created; they are never updated and are
//! deleted only via cascade from a sender, recipient, or group deletion.
//! Pagination is totally ordered by `(sent_at, id)` so cursors are stable
//! when two sends share a timestamp.

pub mod store;
pub mod types;

pub use store::MessageStore;
pub use types::{DirectMessage, GroupMessage, MessageKind};
