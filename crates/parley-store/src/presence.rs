//! Presence seam - is a recipient connected at send time?
//!
//! Presence is owned by the session layer, not the store. The store only
//! consults an injected predicate to decide which recipients need an offline
//! delivery record, so connection-tracking policy stays outside the core.

use std::collections::HashSet;

use crate::UserId;

/// Injected predicate answering "is this user connected right now".
pub trait Presence: Send + Sync {
    fn is_connected(&self, user: UserId) -> bool;
}

impl<F> Presence for F
where
    F: Fn(UserId) -> bool + Send + Sync,
{
    fn is_connected(&self, user: UserId) -> bool {
        self(user)
    }
}

/// Fixed set of connected users; convenient for tests and simple session
/// maps.
#[derive(Debug, Clone, Default)]
pub struct ConnectedSet(HashSet<UserId>);

impl ConnectedSet {
    pub fn new(users: impl IntoIterator<Item = UserId>) -> Self {
        Self(users.into_iter().collect())
    }

    /// An empty set: every recipient is offline.
    pub fn nobody() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, user: UserId) {
        self.0.insert(user);
    }

    pub fn disconnect(&mut self, user: UserId) {
        self.0.remove(&user);
    }
}

impl Presence for ConnectedSet {
    fn is_connected(&self, user: UserId) -> bool {
        self.0.contains(&user)
    }
}
