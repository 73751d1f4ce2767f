//! Scoped change notification for the rendering layer.
//!
//! The bridge distributes cache-change notifications to subscribed views.
//! Each subscriber names a selector; a change is delivered only to the
//! subscribers whose selector it matches — never broadcast globally.

use crate::query::QueryDescriptor;
use feedsync_protocol::{CounterKind, EntityRef};
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// Names the cache region a view depends on.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// One entity.
    Entity(EntityRef),
    /// One list view.
    Query(QueryDescriptor),
    /// One server-owned counter.
    Counter(CounterKind),
    /// The online-presence set.
    Presence,
}

/// A cache region that changed.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheChange {
    /// The entity's snapshot changed (written, reverted, or removed).
    Entity(EntityRef),
    /// The list's id sequence changed or it was invalidated.
    Query(QueryDescriptor),
    /// The counter's value changed or went stale.
    Counter(CounterKind),
    /// The presence set was replaced.
    Presence,
}

impl Selector {
    /// Returns true if this selector covers `change`.
    pub fn matches(&self, change: &CacheChange) -> bool {
        match (self, change) {
            (Selector::Entity(a), CacheChange::Entity(b)) => a == b,
            (Selector::Query(a), CacheChange::Query(b)) => a == b,
            (Selector::Counter(a), CacheChange::Counter(b)) => a == b,
            (Selector::Presence, CacheChange::Presence) => true,
            _ => false,
        }
    }
}

/// Distributes scoped change notifications to subscribers.
///
/// Dropping the receiver unsubscribes: disconnected subscribers are pruned
/// on the next matching emit.
#[derive(Debug, Default)]
pub struct ObserverBridge {
    subscribers: RwLock<Vec<(Selector, Sender<CacheChange>)>>,
}

impl ObserverBridge {
    /// Creates a bridge with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to changes covered by `selector`.
    pub fn subscribe(&self, selector: Selector) -> Receiver<CacheChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push((selector, tx));
        rx
    }

    /// Emits a change to exactly the subscribers whose selector matches.
    pub fn notify(&self, change: CacheChange) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|(selector, tx)| {
            if selector.matches(&change) {
                tx.send(change.clone()).is_ok()
            } else {
                true
            }
        });
    }

    /// Emits several changes.
    pub fn notify_all(&self, changes: impl IntoIterator<Item = CacheChange>) {
        for change in changes {
            self.notify(change);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_protocol::EntityKind;

    fn p1() -> EntityRef {
        EntityRef::new(EntityKind::Post, "p1")
    }

    fn p2() -> EntityRef {
        EntityRef::new(EntityKind::Post, "p2")
    }

    #[test]
    fn notification_is_scoped() {
        let bridge = ObserverBridge::new();
        let rx1 = bridge.subscribe(Selector::Entity(p1()));
        let rx2 = bridge.subscribe(Selector::Entity(p2()));

        bridge.notify(CacheChange::Entity(p1()));

        assert_eq!(rx1.try_recv().unwrap(), CacheChange::Entity(p1()));
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_is_pruned() {
        let bridge = ObserverBridge::new();
        let rx = bridge.subscribe(Selector::Entity(p1()));
        assert_eq!(bridge.subscriber_count(), 1);

        drop(rx);
        bridge.notify(CacheChange::Entity(p1()));
        assert_eq!(bridge.subscriber_count(), 0);
    }

    #[test]
    fn presence_selector() {
        let bridge = ObserverBridge::new();
        let rx = bridge.subscribe(Selector::Presence);
        bridge.notify(CacheChange::Presence);
        bridge.notify(CacheChange::Entity(p1()));
        assert_eq!(rx.try_recv().unwrap(), CacheChange::Presence);
        assert!(rx.try_recv().is_err());
    }
}
