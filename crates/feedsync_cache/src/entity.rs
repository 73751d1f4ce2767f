//! The keyed entity store.

use feedsync_protocol::{EntityDoc, EntityRef, MutationId, Version};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Where the cached snapshot of an entity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Confirmed by the server (HTTP echo or push event).
    Authoritative,
    /// Locally applied, awaiting confirmation.
    Optimistic,
}

/// One cached entity snapshot plus its sync metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    /// The entity document. `doc.version` is the last *authoritative*
    /// version seen; optimistic writes replace `doc.data` but never advance
    /// the version.
    pub doc: EntityDoc,
    /// Snapshot origin.
    pub origin: Origin,
    /// The in-flight mutation that produced an optimistic snapshot, if any.
    pub pending_mutation: Option<MutationId>,
}

impl EntityRecord {
    /// Creates an authoritative record from a server document.
    pub fn authoritative(doc: EntityDoc) -> Self {
        Self {
            doc,
            origin: Origin::Authoritative,
            pending_mutation: None,
        }
    }
}

/// The keyed store mapping `(kind, id)` to entity snapshots.
///
/// A leaf component: no dependencies, no notification. Scoped notification
/// is layered on by [`crate::CacheStore`].
#[derive(Debug, Default)]
pub struct EntityCache {
    records: RwLock<HashMap<EntityRef, EntityRecord>>,
}

impl EntityCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the record for `target`, if cached.
    pub fn get(&self, target: &EntityRef) -> Option<EntityRecord> {
        self.records.read().get(target).cloned()
    }

    /// Returns the pending mutation id for `target`, if any.
    pub fn pending_mutation(&self, target: &EntityRef) -> Option<MutationId> {
        self.records
            .read()
            .get(target)
            .and_then(|r| r.pending_mutation)
    }

    /// Writes an authoritative document.
    ///
    /// Applies only if `doc.version` is strictly newer than the cached
    /// version; a stale or duplicate document is a no-op. An applied write
    /// always clears pending-mutation state. Returns whether it applied.
    pub fn write_authoritative(&self, doc: EntityDoc) -> bool {
        let target = doc.entity_ref();
        let mut records = self.records.write();
        if let Some(existing) = records.get(&target) {
            if !doc.version.newer_than(existing.doc.version) {
                debug!(entity = %target, cached = %existing.doc.version, incoming = %doc.version,
                       "dropping stale authoritative write");
                return false;
            }
        }
        records.insert(target, EntityRecord::authoritative(doc));
        true
    }

    /// Applies an optimistic payload for `target` under `mutation`.
    ///
    /// Keeps the last authoritative version; an entity never seen before
    /// (optimistic create) starts at [`Version::ZERO`] so any later
    /// authoritative document wins.
    pub fn write_optimistic(&self, target: &EntityRef, data: Value, mutation: MutationId) {
        let mut records = self.records.write();
        match records.get_mut(target) {
            Some(record) => {
                record.doc.data = data;
                record.origin = Origin::Optimistic;
                record.pending_mutation = Some(mutation);
            }
            None => {
                records.insert(
                    target.clone(),
                    EntityRecord {
                        doc: EntityDoc::new(
                            target.kind,
                            target.id.clone(),
                            Version::ZERO,
                            data,
                        ),
                        origin: Origin::Optimistic,
                        pending_mutation: Some(mutation),
                    },
                );
            }
        }
    }

    /// Restores `target` to a pre-mutation snapshot (rollback).
    ///
    /// `pre_image: None` means the entity did not exist before the mutation
    /// and is removed outright.
    pub fn restore(&self, target: &EntityRef, pre_image: Option<EntityRecord>) {
        let mut records = self.records.write();
        match pre_image {
            Some(record) => {
                records.insert(target.clone(), record);
            }
            None => {
                records.remove(target);
            }
        }
    }

    /// Removes `target`, returning the removed record.
    pub fn remove(&self, target: &EntityRef) -> Option<EntityRecord> {
        self.records.write().remove(target)
    }

    /// Clears pending-mutation state on `target` without touching payload.
    pub fn clear_pending(&self, target: &EntityRef) {
        if let Some(record) = self.records.write().get_mut(target) {
            record.pending_mutation = None;
        }
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
