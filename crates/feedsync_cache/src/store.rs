//! The bundled cache handle shared by the engine and dispatcher.

use crate::entity::{EntityCache, EntityRecord};
use crate::observe::{CacheChange, ObserverBridge, Selector};
use crate::presence::PresenceSet;
use crate::query::{QueryCache, QueryDescriptor, QueryPattern, QueryState};
use feedsync_protocol::{CounterKind, EntityDoc, EntityId, EntityRef, MutationId};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::mpsc::Receiver;

/// The local mirror of a server-owned counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterValue {
    /// The last value the server replaced wholesale.
    Known(u64),
    /// The server told us to refetch; the mirror must not be served.
    Stale,
}

/// The single shared mutable resource of the sync layer.
///
/// Bundles the entity cache, query cache, presence set, counter mirrors, and
/// the observer bridge. Composite operations perform the cache write and the
/// scoped notification within one synchronous call, so no partial state is
/// ever observable and the reconciliation rules need no further locking.
#[derive(Debug, Default)]
pub struct CacheStore {
    entities: EntityCache,
    queries: QueryCache,
    presence: PresenceSet,
    counters: RwLock<HashMap<CounterKind, CounterValue>>,
    observers: ObserverBridge,
}

impl CacheStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The entity cache.
    pub fn entities(&self) -> &EntityCache {
        &self.entities
    }

    /// The query cache.
    pub fn queries(&self) -> &QueryCache {
        &self.queries
    }

    /// The presence set.
    pub fn presence(&self) -> &PresenceSet {
        &self.presence
    }

    /// Subscribes a view to a cache region.
    pub fn subscribe(&self, selector: Selector) -> Receiver<CacheChange> {
        self.observers.subscribe(selector)
    }

    /// Number of live view subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.observers.subscriber_count()
    }

    /// Writes an authoritative document and notifies the entity's observers
    /// plus every list currently holding the id. Returns whether the write
    /// applied (false ⇒ stale/duplicate, nothing notified).
    pub fn apply_authoritative(&self, doc: EntityDoc) -> bool {
        let target = doc.entity_ref();
        if !self.entities.write_authoritative(doc) {
            return false;
        }
        self.notify_entity(&target);
        true
    }

    /// Applies an optimistic payload and notifies.
    pub fn apply_optimistic(&self, target: &EntityRef, data: Value, mutation: MutationId) {
        self.entities.write_optimistic(target, data, mutation);
        self.notify_entity(target);
    }

    /// Rolls an entity back to its pre-mutation snapshot and notifies.
    pub fn rollback(&self, target: &EntityRef, pre_image: Option<EntityRecord>) {
        self.entities.restore(target, pre_image);
        self.notify_entity(target);
    }

    /// Deletes an entity: removes the record, scrubs the id from every
    /// cached list, and notifies the entity plus each affected list.
    pub fn apply_delete(&self, target: &EntityRef) {
        let removed = self.entities.remove(target);
        let affected = self.queries.remove_id(&target.id);
        if removed.is_some() || !affected.is_empty() {
            self.observers.notify(CacheChange::Entity(target.clone()));
            self.observers
                .notify_all(affected.into_iter().map(CacheChange::Query));
        }
    }

    /// Rolls back an optimistic delete: restores the record and reinserts
    /// the id into the lists it was scrubbed from, at its old positions.
    pub fn rollback_delete(
        &self,
        target: &EntityRef,
        pre_image: Option<EntityRecord>,
        positions: &[(QueryDescriptor, usize)],
    ) {
        self.entities.restore(target, pre_image);
        self.observers.notify(CacheChange::Entity(target.clone()));
        for (descriptor, position) in positions {
            if self
                .queries
                .insert_at(descriptor, *position, target.id.clone())
            {
                self.observers
                    .notify(CacheChange::Query(descriptor.clone()));
            }
        }
    }

    /// Confirms an optimistic create: drops the placeholder record, writes
    /// the real document, and swaps the placeholder id for the real one in
    /// every cached list (replace, never duplicate).
    pub fn confirm_create(&self, placeholder: &EntityRef, doc: EntityDoc) {
        let real_id = doc.id.clone();
        self.entities.remove(placeholder);
        self.apply_authoritative(doc);
        let affected = self.queries.replace_id(&placeholder.id, &real_id);
        self.observers.notify(CacheChange::Entity(placeholder.clone()));
        self.observers
            .notify_all(affected.into_iter().map(CacheChange::Query));
    }

    /// Stores a fetched page of list state and notifies the list's observers.
    pub fn put_query(&self, descriptor: QueryDescriptor, state: QueryState) {
        self.queries.put(descriptor.clone(), state);
        self.observers.notify(CacheChange::Query(descriptor));
    }

    /// Inserts an id at the head of a cached list (optimistic create) and
    /// notifies if the list changed.
    pub fn insert_query_head(&self, descriptor: &QueryDescriptor, id: EntityId) {
        if self.queries.insert_head(descriptor, id) {
            self.observers
                .notify(CacheChange::Query(descriptor.clone()));
        }
    }

    /// Marks matching lists stale and notifies exactly those lists.
    pub fn invalidate(&self, pattern: &QueryPattern) -> Vec<QueryDescriptor> {
        let invalidated = self.queries.invalidate(pattern);
        self.observers
            .notify_all(invalidated.iter().cloned().map(CacheChange::Query));
        invalidated
    }

    /// Replaces a counter mirror wholesale.
    pub fn set_counter(&self, counter: CounterKind, value: u64) {
        self.counters
            .write()
            .insert(counter.clone(), CounterValue::Known(value));
        self.observers.notify(CacheChange::Counter(counter));
    }

    /// Marks a counter mirror stale pending refetch.
    pub fn mark_counter_stale(&self, counter: CounterKind) {
        self.counters
            .write()
            .insert(counter.clone(), CounterValue::Stale);
        self.observers.notify(CacheChange::Counter(counter));
    }

    /// Reads a counter mirror.
    pub fn counter(&self, counter: &CounterKind) -> Option<CounterValue> {
        self.counters.read().get(counter).copied()
    }

    /// Replaces the presence set wholesale; notifies only on actual change.
    pub fn replace_presence(&self, online: Vec<EntityId>) {
        if self.presence.replace_all(online) {
            self.observers.notify(CacheChange::Presence);
        }
    }

    /// Clears session-scoped state on logout.
    pub fn clear_session(&self) {
        self.presence.clear();
        self.counters.write().clear();
        self.observers.notify(CacheChange::Presence);
    }

    fn notify_entity(&self, target: &EntityRef) {
        self.observers.notify(CacheChange::Entity(target.clone()));
        let holding = self.queries.containing(&target.id);
        self.observers
            .notify_all(holding.into_iter().map(CacheChange::Query));
    }
}
