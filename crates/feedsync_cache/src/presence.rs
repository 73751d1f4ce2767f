//! The set of currently-online users.

use feedsync_protocol::EntityId;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Online-user set, fully replaced on every authoritative snapshot.
///
/// Snapshots are periodic; a partial merge could leave stale entries
/// indefinitely, so there is deliberately no incremental update path.
#[derive(Debug, Default)]
pub struct PresenceSet {
    online: RwLock<HashSet<EntityId>>,
}

impl PresenceSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole set. Returns whether the membership changed.
    pub fn replace_all(&self, users: Vec<EntityId>) -> bool {
        let next: HashSet<EntityId> = users.into_iter().collect();
        let mut online = self.online.write();
        if *online == next {
            return false;
        }
        *online = next;
        true
    }

    /// Returns true if `user` is online.
    pub fn contains(&self, user: &EntityId) -> bool {
        self.online.read().contains(user)
    }

    /// Returns a snapshot of the online set.
    pub fn snapshot(&self) -> HashSet<EntityId> {
        self.online.read().clone()
    }

    /// Number of online users.
    pub fn len(&self) -> usize {
        self.online.read().len()
    }

    /// Whether nobody is online.
    pub fn is_empty(&self) -> bool {
        self.online.read().is_empty()
    }

    /// Clears the set (logout).
    pub fn clear(&self) {
        self.online.write().clear();
    }
}
