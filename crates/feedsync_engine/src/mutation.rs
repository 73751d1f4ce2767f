//! The optimistic mutation engine.
//!
//! Turns a local intent into an immediate cache write plus an HTTP call
//! description, and resolves each mutation exactly once through whichever
//! arrives first: the HTTP echo, a matching authoritative event, or an HTTP
//! failure (rollback to the stored pre-image).

use crate::error::{EngineError, EngineResult};
use crate::http::HttpError;
use feedsync_cache::{CacheStore, EntityRecord, QueryDescriptor};
use feedsync_protocol::{
    CorrelationToken, EntityDoc, EntityId, EntityKind, EntityRef, HttpCall, HttpMethod, MutationId,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// A pure payload transformation. Receives the current payload, returns the
/// optimistic one. Applied synchronously at submit time; rollback goes
/// through the stored pre-image, never through an inverse patch.
pub type PatchFn = Box<dyn FnOnce(Value) -> Value + Send>;

/// A local user intent.
pub enum Intent {
    /// Mutate an existing entity in place.
    Patch {
        /// The verb for the HTTP call.
        method: HttpMethod,
        /// Target entity. Must be cached.
        target: EntityRef,
        /// Optimistic payload transformation.
        patch: PatchFn,
        /// HTTP request body.
        body: Value,
    },
    /// Delete an existing entity.
    Delete {
        /// Target entity. Must be cached.
        target: EntityRef,
    },
    /// Create a new entity, optimistically visible at the head of a list.
    Create {
        /// Entity kind to create.
        kind: EntityKind,
        /// Initial payload (also the request body).
        data: Value,
        /// The list view the new entity should appear in.
        list: QueryDescriptor,
    },
}

impl Intent {
    /// Server-authoritative toggle (like, vote). The optimistic patch is a
    /// local guess; the server decides the resulting state.
    pub fn toggle(
        target: EntityRef,
        body: Value,
        patch: impl FnOnce(Value) -> Value + Send + 'static,
    ) -> Self {
        Intent::Patch {
            method: HttpMethod::Toggle,
            target,
            patch: Box::new(patch),
            body,
        }
    }

    /// Field update on an existing entity.
    pub fn update(
        target: EntityRef,
        body: Value,
        patch: impl FnOnce(Value) -> Value + Send + 'static,
    ) -> Self {
        Intent::Patch {
            method: HttpMethod::Update,
            target,
            patch: Box::new(patch),
            body,
        }
    }

    /// Delete of an existing entity.
    pub fn delete(target: EntityRef) -> Self {
        Intent::Delete { target }
    }

    /// Creation of a new entity, shown immediately in `list`.
    pub fn create(kind: EntityKind, data: Value, list: QueryDescriptor) -> Self {
        Intent::Create { kind, data, list }
    }

    /// The entity this intent serializes behind, if any. Create intents
    /// target a fresh placeholder and never queue.
    fn queue_target(&self) -> Option<&EntityRef> {
        match self {
            Intent::Patch { target, .. } | Intent::Delete { target } => Some(target),
            Intent::Create { .. } => None,
        }
    }
}

/// Result of submitting an intent.
pub enum SubmitResult {
    /// Optimistic state applied; issue this call and feed the result back
    /// through [`MutationEngine::resolve_http`].
    Dispatch(HttpCall),
    /// The entity already has an in-flight mutation; the intent is queued
    /// and will be dispatched by that mutation's resolution.
    Queued,
}

/// Terminal state of one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Confirmed by the HTTP echo.
    Confirmed,
    /// Rejected by the server; the optimistic patch was rolled back.
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },
    /// The call never completed; the optimistic patch was rolled back.
    TransportFailed(String),
    /// A matching authoritative event resolved the entity first; the HTTP
    /// response was discarded.
    SupersededByEvent,
    /// The entity was deleted by an authoritative event while the mutation
    /// was in flight; the HTTP response was discarded.
    SupersededByDelete,
}

/// The result of resolving one mutation.
pub struct Resolution {
    /// How the mutation ended.
    pub outcome: MutationOutcome,
    /// The next queued intent's call for the same entity, if one was
    /// waiting. The driver issues it and resolves it like any other.
    pub next: Option<HttpCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingState {
    InFlight,
    SupersededByEvent,
    SupersededByDelete,
}

struct Pending {
    target: EntityRef,
    pre_image: Option<EntityRecord>,
    /// List positions the id was scrubbed from, for delete rollback.
    positions: Vec<(QueryDescriptor, usize)>,
    correlation: Option<CorrelationToken>,
    is_create: bool,
    is_delete: bool,
    state: PendingState,
}

#[derive(Default)]
struct Inner {
    pending: HashMap<MutationId, Pending>,
    /// The one in-flight mutation per entity.
    active: HashMap<EntityRef, MutationId>,
    /// Intents waiting for the active mutation to resolve.
    queued: HashMap<EntityRef, VecDeque<Intent>>,
}

/// Accepts local intents, applies optimistic cache writes, and resolves each
/// pending mutation exactly once.
///
/// Intents for the same entity are serialized: a second intent waits for the
/// first to resolve, so its patch never computes against a half-applied
/// intermediate state. Intents for different entities are independent.
pub struct MutationEngine {
    store: Arc<CacheStore>,
    inner: Mutex<Inner>,
}

impl MutationEngine {
    /// Creates an engine writing to `store`.
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Submits an intent: applies the optimistic write (or queues, if the
    /// entity is busy) and returns the HTTP call to issue.
    pub fn submit(&self, intent: Intent) -> EngineResult<SubmitResult> {
        if let Some(target) = intent.queue_target() {
            let mut inner = self.inner.lock();
            if inner.active.contains_key(target) {
                debug!(entity = %target, "entity has a mutation in flight; queueing intent");
                inner
                    .queued
                    .entry(target.clone())
                    .or_default()
                    .push_back(intent);
                return Ok(SubmitResult::Queued);
            }
        }
        self.start(intent).map(SubmitResult::Dispatch)
    }

    /// The in-flight mutation for `target`, if any.
    pub fn pending_for(&self, target: &EntityRef) -> Option<MutationId> {
        self.inner.lock().active.get(target).copied()
    }

    /// Marks the in-flight mutation for `target` as resolved by an
    /// authoritative event. The eventual HTTP response will be discarded.
    /// Returns whether a mutation was superseded.
    pub fn supersede_by_event(&self, target: &EntityRef) -> bool {
        let mut inner = self.inner.lock();
        let Some(&id) = inner.active.get(target) else {
            return false;
        };
        match inner.pending.get_mut(&id) {
            Some(p) if p.state == PendingState::InFlight => {
                p.state = PendingState::SupersededByEvent;
                true
            }
            _ => false,
        }
    }

    /// Marks the in-flight mutation for `target` as superseded by an
    /// authoritative delete. Queued intents for the entity are dropped: no
    /// further resolution may mutate a deleted entity.
    pub fn supersede_by_delete(&self, target: &EntityRef) -> bool {
        let mut inner = self.inner.lock();
        if let Some(dropped) = inner.queued.remove(target) {
            if !dropped.is_empty() {
                warn!(entity = %target, count = dropped.len(),
                      "dropping queued intents for deleted entity");
            }
        }
        let Some(&id) = inner.active.get(target) else {
            return false;
        };
        match inner.pending.get_mut(&id) {
            Some(p) if p.state == PendingState::InFlight => {
                p.state = PendingState::SupersededByDelete;
                true
            }
            _ => false,
        }
    }

    /// Confirms a pending create whose correlation token was echoed in an
    /// authoritative event: swaps the placeholder for the real entity and
    /// marks the mutation superseded. Returns whether a create matched.
    pub fn confirm_create_from_event(&self, doc: &EntityDoc) -> bool {
        let Some(token) = doc.correlation else {
            return false;
        };
        let placeholder = {
            let mut inner = self.inner.lock();
            let found = inner
                .pending
                .values_mut()
                .find(|p| p.correlation == Some(token) && p.state == PendingState::InFlight);
            match found {
                Some(p) => {
                    p.state = PendingState::SupersededByEvent;
                    Some(p.target.clone())
                }
                None => None,
            }
        };
        match placeholder {
            Some(placeholder) => {
                self.store.confirm_create(&placeholder, doc.clone());
                true
            }
            None => false,
        }
    }

    /// Resolves a mutation with its HTTP result. First-to-arrive wins: if an
    /// authoritative event already resolved the entity, the response is
    /// discarded here. Failures roll the entity back to its exact pre-image.
    ///
    /// Rejection is returned as data in the outcome, not as `Err`; only a
    /// resolution for an unknown mutation is an error.
    pub fn resolve_http(
        &self,
        id: MutationId,
        result: Result<EntityDoc, HttpError>,
    ) -> EngineResult<Resolution> {
        let pending = self
            .inner
            .lock()
            .pending
            .remove(&id)
            .ok_or(EngineError::UnknownMutation(id))?;

        let outcome = match pending.state {
            PendingState::SupersededByEvent => {
                // The event resolved the mutation, but the echo may still
                // carry a strictly newer payload; the version gate decides.
                if let Ok(doc) = result {
                    if !self.store.apply_authoritative(doc) {
                        debug!(mutation = %id, "discarding stale http response; event resolved first");
                    }
                }
                MutationOutcome::SupersededByEvent
            }
            PendingState::SupersededByDelete => {
                debug!(mutation = %id, "discarding http response; entity deleted");
                MutationOutcome::SupersededByDelete
            }
            PendingState::InFlight => match result {
                Ok(doc) => {
                    if pending.is_create {
                        self.store.confirm_create(&pending.target, doc);
                    } else if !self.store.apply_authoritative(doc) {
                        // Echo not newer than cache: the cache already holds
                        // authoritative state for this entity, so drop the
                        // optimistic overlay.
                        self.store.rollback(&pending.target, pending.pre_image.clone());
                    }
                    MutationOutcome::Confirmed
                }
                Err(HttpError::Rejected { status, message }) => {
                    self.roll_back(&pending);
                    MutationOutcome::Rejected { status, message }
                }
                Err(HttpError::Transport(message)) => {
                    self.roll_back(&pending);
                    MutationOutcome::TransportFailed(message)
                }
            },
        };

        let next = self.pump(&pending.target, id);
        Ok(Resolution { outcome, next })
    }

    /// Applies the optimistic write for an intent and registers the pending
    /// mutation. The entity must not already have one in flight.
    fn start(&self, intent: Intent) -> EngineResult<HttpCall> {
        let mutation_id = MutationId::new();
        match intent {
            Intent::Patch {
                method,
                target,
                patch,
                body,
            } => {
                let pre = self
                    .store
                    .entities()
                    .get(&target)
                    .ok_or_else(|| EngineError::UnknownEntity(target.clone()))?;
                let next_data = patch(pre.doc.data.clone());
                self.store.apply_optimistic(&target, next_data, mutation_id);
                self.register(
                    mutation_id,
                    Pending {
                        target: target.clone(),
                        pre_image: Some(pre),
                        positions: Vec::new(),
                        correlation: None,
                        is_create: false,
                        is_delete: false,
                        state: PendingState::InFlight,
                    },
                );
                Ok(HttpCall {
                    mutation_id,
                    method,
                    target,
                    body,
                    correlation: None,
                })
            }
            Intent::Delete { target } => {
                let pre = self
                    .store
                    .entities()
                    .get(&target)
                    .ok_or_else(|| EngineError::UnknownEntity(target.clone()))?;
                let positions = self.store.queries().positions(&target.id);
                self.store.apply_delete(&target);
                self.register(
                    mutation_id,
                    Pending {
                        target: target.clone(),
                        pre_image: Some(pre),
                        positions,
                        correlation: None,
                        is_create: false,
                        is_delete: true,
                        state: PendingState::InFlight,
                    },
                );
                Ok(HttpCall {
                    mutation_id,
                    method: HttpMethod::Delete,
                    target,
                    body: Value::Null,
                    correlation: None,
                })
            }
            Intent::Create { kind, data, list } => {
                let placeholder = EntityRef::new(kind, EntityId::placeholder());
                let correlation = CorrelationToken::new();
                self.store
                    .apply_optimistic(&placeholder, data.clone(), mutation_id);
                self.store.insert_query_head(&list, placeholder.id.clone());
                self.register(
                    mutation_id,
                    Pending {
                        target: placeholder.clone(),
                        pre_image: None,
                        positions: Vec::new(),
                        correlation: Some(correlation),
                        is_create: true,
                        is_delete: false,
                        state: PendingState::InFlight,
                    },
                );
                Ok(HttpCall {
                    mutation_id,
                    method: HttpMethod::Create,
                    target: placeholder,
                    body: data,
                    correlation: Some(correlation),
                })
            }
        }
    }

    fn register(&self, id: MutationId, pending: Pending) {
        let mut inner = self.inner.lock();
        inner.active.insert(pending.target.clone(), id);
        inner.pending.insert(id, pending);
    }

    fn roll_back(&self, pending: &Pending) {
        if pending.is_create {
            // Placeholder never existed server-side; remove it outright.
            self.store.apply_delete(&pending.target);
        } else if pending.is_delete {
            self.store.rollback_delete(
                &pending.target,
                pending.pre_image.clone(),
                &pending.positions,
            );
        } else {
            self.store
                .rollback(&pending.target, pending.pre_image.clone());
        }
    }

    /// Releases the entity and starts the next queued intent, if any.
    fn pump(&self, target: &EntityRef, resolved: MutationId) -> Option<HttpCall> {
        loop {
            let next_intent = {
                let mut inner = self.inner.lock();
                if inner.active.get(target) == Some(&resolved) {
                    inner.active.remove(target);
                }
                let queue = inner.queued.get_mut(target)?;
                let intent = queue.pop_front();
                if queue.is_empty() {
                    inner.queued.remove(target);
                }
                intent?
            };
            match self.start(next_intent) {
                Ok(call) => return Some(call),
                Err(e) => {
                    warn!(entity = %target, error = %e, "dropping queued intent");
                    continue;
                }
            }
        }
    }
}
