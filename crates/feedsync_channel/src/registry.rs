//! Refcounted room subscriptions.

use crate::credentials::CredentialStore;
use crate::manager::ConnectionManager;
use crate::transport::ChannelTransport;
use feedsync_protocol::RoomKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Derives the minimal room set from the views and entities the client
/// currently cares about.
///
/// `acquire` joins a room only on the 0→1 refcount transition and the
/// matching release leaves only on 1→0, so any number of concurrent views
/// watching the same room collapse to a single network-level subscription.
pub struct SubscriptionRegistry<T: ChannelTransport, C: CredentialStore> {
    manager: Arc<ConnectionManager<T, C>>,
    counts: Mutex<HashMap<RoomKey, usize>>,
}

impl<T: ChannelTransport, C: CredentialStore> SubscriptionRegistry<T, C> {
    /// Creates a registry driving `manager`.
    pub fn new(manager: Arc<ConnectionManager<T, C>>) -> Self {
        Self {
            manager,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires an interest in `room`, joining it on the 0→1 transition.
    ///
    /// Join failures are diagnostics, not errors: the room stays tracked
    /// and is replayed on the next reconnect.
    pub fn acquire(self: &Arc<Self>, room: RoomKey) -> RoomHandle<T, C> {
        let is_first = {
            let mut counts = self.counts.lock();
            let count = counts.entry(room.clone()).or_insert(0);
            *count += 1;
            *count == 1
        };
        if is_first {
            if let Err(e) = self.manager.join_room(&room) {
                warn!(room = %room, error = %e, "room join failed; will rejoin on reconnect");
            }
        }
        RoomHandle {
            registry: Arc::clone(self),
            room,
        }
    }

    /// Current refcount for `room`.
    pub fn refcount(&self, room: &RoomKey) -> usize {
        self.counts.lock().get(room).copied().unwrap_or(0)
    }

    fn release(&self, room: &RoomKey) {
        let is_last = {
            let mut counts = self.counts.lock();
            match counts.get_mut(room) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    counts.remove(room);
                    true
                }
                None => false,
            }
        };
        if is_last {
            if let Err(e) = self.manager.leave_room(room) {
                warn!(room = %room, error = %e, "room leave failed");
            }
        }
    }
}

/// A held interest in one room. Dropping the handle releases it; dropping
/// the last handle leaves the room.
pub struct RoomHandle<T: ChannelTransport, C: CredentialStore> {
    registry: Arc<SubscriptionRegistry<T, C>>,
    room: RoomKey,
}

impl<T: ChannelTransport, C: CredentialStore> RoomHandle<T, C> {
    /// The room this handle holds.
    pub fn room(&self) -> &RoomKey {
        &self.room
    }
}

impl<T: ChannelTransport, C: CredentialStore> Drop for RoomHandle<T, C> {
    fn drop(&mut self) {
        self.registry.release(&self.room);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::ReconnectConfig;
    use crate::credentials::StaticCredentials;
    use crate::transport::MockChannel;

    fn setup() -> (
        Arc<ConnectionManager<MockChannel, StaticCredentials>>,
        Arc<SubscriptionRegistry<MockChannel, StaticCredentials>>,
    ) {
        let manager = Arc::new(ConnectionManager::new(
            MockChannel::new(),
            StaticCredentials::with_token("tok"),
            ReconnectConfig::new().without_jitter(),
        ));
        manager.connect().unwrap();
        let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&manager)));
        (manager, registry)
    }

    #[test]
    fn n_acquires_one_join_one_leave() {
        let (manager, registry) = setup();
        let room = RoomKey::GlobalFeed;

        let handles: Vec<_> = (0..5).map(|_| registry.acquire(room.clone())).collect();
        assert_eq!(registry.refcount(&room), 5);
        assert_eq!(manager.transport().count_calls("join(feed:global)"), 1);

        drop(handles);
        assert_eq!(registry.refcount(&room), 0);
        assert_eq!(manager.transport().count_calls("leave(feed:global)"), 1);
    }

    #[test]
    fn distinct_rooms_join_independently() {
        let (manager, registry) = setup();
        let _feed = registry.acquire(RoomKey::GlobalFeed);
        let _presence = registry.acquire(RoomKey::Presence);

        assert_eq!(manager.transport().count_calls("join(feed:global)"), 1);
        assert_eq!(manager.transport().count_calls("join(presence)"), 1);
    }

    #[test]
    fn interleaved_acquire_release() {
        let (manager, registry) = setup();
        let room = RoomKey::Presence;

        let a = registry.acquire(room.clone());
        let b = registry.acquire(room.clone());
        drop(a);
        assert_eq!(manager.transport().count_calls("leave(presence)"), 0);

        drop(b);
        assert_eq!(manager.transport().count_calls("leave(presence)"), 1);

        // A fresh acquire after full release joins again.
        let _c = registry.acquire(room.clone());
        assert_eq!(manager.transport().count_calls("join(presence)"), 2);
    }

    #[test]
    fn acquire_while_disconnected_still_tracks() {
        let manager = Arc::new(ConnectionManager::new(
            MockChannel::new(),
            StaticCredentials::with_token("tok"),
            ReconnectConfig::new().without_jitter(),
        ));
        let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&manager)));

        let _handle = registry.acquire(RoomKey::GlobalFeed);
        assert_eq!(manager.transport().count_calls("join(feed:global)"), 0);

        manager.connect().unwrap();
        assert_eq!(manager.transport().count_calls("join(feed:global)"), 1);
    }
}
