//! The query cache: ordered id lists per list view.

use feedsync_protocol::{EntityId, EntityKind};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Sort order of a list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Newest first.
    Newest,
    /// Highest-ranked first.
    Top,
}

/// A relationship the session user has with other entities, used as a list
/// filter dimension ("communities I own", "users I follow").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationScope {
    /// Communities owned by the session user.
    OwnedCommunities,
    /// Users the session user follows.
    Following,
    /// Pending community invitations.
    Invitations,
}

/// Filter parameters of a list view. All dimensions optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryFilter {
    /// Restrict to one community.
    pub community: Option<EntityId>,
    /// Restrict to one author.
    pub author: Option<EntityId>,
    /// Restrict by relationship to the session user.
    pub relation: Option<RelationScope>,
}

impl QueryFilter {
    /// The unfiltered view.
    pub fn any() -> Self {
        Self::default()
    }

    /// Restricts to a community.
    pub fn in_community(community: impl Into<EntityId>) -> Self {
        Self {
            community: Some(community.into()),
            ..Self::default()
        }
    }

    /// Restricts by relationship scope.
    pub fn by_relation(relation: RelationScope) -> Self {
        Self {
            relation: Some(relation),
            ..Self::default()
        }
    }
}

/// The identity of a cached list view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryDescriptor {
    /// Entity kind the list contains.
    pub kind: EntityKind,
    /// Filter parameters.
    pub filter: QueryFilter,
    /// Sort order.
    pub sort: SortOrder,
}

impl QueryDescriptor {
    /// Creates a descriptor.
    pub fn new(kind: EntityKind, filter: QueryFilter, sort: SortOrder) -> Self {
        Self { kind, filter, sort }
    }
}

/// The cached state of one list view: ids plus pagination, never payloads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    /// Ordered entity ids.
    pub ids: Vec<EntityId>,
    /// Opaque cursor for the next page.
    pub cursor: Option<String>,
    /// Whether more pages exist.
    pub has_more: bool,
    /// Stale lists must be refetched before their ids are served.
    pub stale: bool,
}

impl QueryState {
    /// Creates a fresh (non-stale) state.
    pub fn new(ids: Vec<EntityId>, cursor: Option<String>, has_more: bool) -> Self {
        Self {
            ids,
            cursor,
            has_more,
            stale: false,
        }
    }
}

/// A pattern over query descriptors, used for invalidation scoping.
/// `None` dimensions match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPattern {
    /// Match this entity kind.
    pub kind: Option<EntityKind>,
    /// Match this relationship scope.
    pub relation: Option<RelationScope>,
    /// Match this community filter.
    pub community: Option<EntityId>,
}

impl QueryPattern {
    /// Matches every descriptor with the given relationship scope.
    pub fn relation(relation: RelationScope) -> Self {
        Self {
            relation: Some(relation),
            ..Self::default()
        }
    }

    /// Matches every descriptor of the given kind.
    pub fn kind(kind: EntityKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Returns true if `descriptor` falls under this pattern.
    pub fn matches(&self, descriptor: &QueryDescriptor) -> bool {
        if let Some(kind) = self.kind {
            if descriptor.kind != kind {
                return false;
            }
        }
        if let Some(relation) = self.relation {
            if descriptor.filter.relation != Some(relation) {
                return false;
            }
        }
        if let Some(ref community) = self.community {
            if descriptor.filter.community.as_ref() != Some(community) {
                return false;
            }
        }
        true
    }
}

/// The keyed store mapping query descriptors to list state.
#[derive(Debug, Default)]
pub struct QueryCache {
    queries: RwLock<HashMap<QueryDescriptor, QueryState>>,
}

impl QueryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the state for a descriptor (page fetched).
    pub fn put(&self, descriptor: QueryDescriptor, state: QueryState) {
        self.queries.write().insert(descriptor, state);
    }

    /// Returns the cached state for a descriptor.
    pub fn get(&self, descriptor: &QueryDescriptor) -> Option<QueryState> {
        self.queries.read().get(descriptor).cloned()
    }

    /// Inserts `id` at the head of one cached list (optimistic create).
    ///
    /// No-op if the list is not cached or already holds the id, so a
    /// duplicate insertion cannot occur. Returns whether it inserted.
    pub fn insert_head(&self, descriptor: &QueryDescriptor, id: EntityId) -> bool {
        let mut queries = self.queries.write();
        match queries.get_mut(descriptor) {
            Some(state) if !state.ids.contains(&id) => {
                state.ids.insert(0, id);
                true
            }
            _ => false,
        }
    }

    /// Replaces `placeholder` with `real` in every cached list, preserving
    /// position. If a list already holds `real` (e.g. an upsert event landed
    /// first), the placeholder is simply removed. Returns affected
    /// descriptors.
    pub fn replace_id(&self, placeholder: &EntityId, real: &EntityId) -> Vec<QueryDescriptor> {
        let mut affected = Vec::new();
        let mut queries = self.queries.write();
        for (descriptor, state) in queries.iter_mut() {
            let Some(pos) = state.ids.iter().position(|id| id == placeholder) else {
                continue;
            };
            if state.ids.contains(real) {
                state.ids.remove(pos);
            } else {
                state.ids[pos] = real.clone();
            }
            affected.push(descriptor.clone());
        }
        affected
    }

    /// Removes `id` from every cached list (entity delete). Returns affected
    /// descriptors.
    pub fn remove_id(&self, id: &EntityId) -> Vec<QueryDescriptor> {
        let mut affected = Vec::new();
        let mut queries = self.queries.write();
        for (descriptor, state) in queries.iter_mut() {
            let before = state.ids.len();
            state.ids.retain(|existing| existing != id);
            if state.ids.len() != before {
                affected.push(descriptor.clone());
            }
        }
        affected
    }

    /// Marks every descriptor matching `pattern` stale. Returns the
    /// descriptors that were invalidated.
    pub fn invalidate(&self, pattern: &QueryPattern) -> Vec<QueryDescriptor> {
        let mut invalidated = Vec::new();
        let mut queries = self.queries.write();
        for (descriptor, state) in queries.iter_mut() {
            if pattern.matches(descriptor) && !state.stale {
                state.stale = true;
                invalidated.push(descriptor.clone());
            }
        }
        invalidated
    }

    /// Returns each list holding `id` along with its position, so an
    /// optimistic delete can be rolled back in place.
    pub fn positions(&self, id: &EntityId) -> Vec<(QueryDescriptor, usize)> {
        self.queries
            .read()
            .iter()
            .filter_map(|(descriptor, state)| {
                state
                    .ids
                    .iter()
                    .position(|existing| existing == id)
                    .map(|pos| (descriptor.clone(), pos))
            })
            .collect()
    }

    /// Reinserts `id` into one list at `position` (clamped to the list's
    /// length). No-op if the list is gone or already holds the id.
    pub fn insert_at(&self, descriptor: &QueryDescriptor, position: usize, id: EntityId) -> bool {
        let mut queries = self.queries.write();
        match queries.get_mut(descriptor) {
            Some(state) if !state.ids.contains(&id) => {
                let position = position.min(state.ids.len());
                state.ids.insert(position, id);
                true
            }
            _ => false,
        }
    }

    /// Returns the descriptors whose lists currently hold `id`.
    pub fn containing(&self, id: &EntityId) -> Vec<QueryDescriptor> {
        self.queries
            .read()
            .iter()
            .filter(|(_, state)| state.ids.contains(id))
            .map(|(descriptor, _)| descriptor.clone())
            .collect()
    }
}
