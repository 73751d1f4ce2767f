//! The embedder-facing facade.
//!
//! [`SyncClient`] wires the cache store, push channel, mutation engine, and
//! event dispatcher together by explicit injection and exposes the small
//! surface a UI layer drives: `connect`, `watch`, `subscribe`, `mutate`,
//! query fetches, and `pump`.

use crate::dispatch::EventDispatcher;
use crate::error::{EngineError, EngineResult};
use crate::http::{HttpError, HttpService};
use crate::mutation::{Intent, MutationEngine, MutationOutcome, SubmitResult};
use feedsync_cache::{CacheChange, CacheStore, QueryDescriptor, QueryState, Selector};
use feedsync_channel::{
    ChannelTransport, ConnectionManager, ConnectionState, CredentialStore, ReconnectConfig,
    RoomHandle, SubscriptionRegistry,
};
use feedsync_protocol::{CounterKind, EntityId, EntityRef, MutationId, Page, PushEvent, RoomKey};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How a submitted intent ended, from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutateStatus {
    /// The intent's HTTP call ran and resolved with this outcome. A
    /// rejection arrives here as a value, already rolled back.
    Resolved(MutationOutcome),
    /// The target entity had a mutation in flight; the intent will run when
    /// that one resolves.
    Queued,
}

/// The sync client: one instance per session.
///
/// Generic over the channel transport, credential store, and HTTP service so
/// tests drive it entirely with mocks and embedders plug in real I/O.
pub struct SyncClient<T: ChannelTransport, C: CredentialStore, H: HttpService> {
    store: Arc<CacheStore>,
    http: Arc<H>,
    manager: Arc<ConnectionManager<T, C>>,
    registry: Arc<SubscriptionRegistry<T, C>>,
    engine: Arc<MutationEngine>,
    dispatcher: EventDispatcher,
}

impl<T: ChannelTransport, C: CredentialStore, H: HttpService> SyncClient<T, C, H> {
    /// Builds a client from its injected parts. Nothing connects until
    /// [`connect`](Self::connect) is called.
    pub fn new(transport: T, credentials: C, http: H, config: ReconnectConfig) -> Self {
        let store = Arc::new(CacheStore::new());
        let manager = Arc::new(ConnectionManager::new(transport, credentials, config));
        let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&manager)));
        let engine = Arc::new(MutationEngine::new(Arc::clone(&store)));
        let dispatcher = EventDispatcher::new(Arc::clone(&store), Arc::clone(&engine));
        Self {
            store,
            http: Arc::new(http),
            manager,
            registry,
            engine,
            dispatcher,
        }
    }

    /// The shared cache store.
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// The connection manager (state inspection, liveness checks).
    pub fn manager(&self) -> &Arc<ConnectionManager<T, C>> {
        &self.manager
    }

    /// The HTTP service.
    pub fn http(&self) -> &Arc<H> {
        &self.http
    }

    /// Opens the push channel with the current session token, replaying any
    /// room subscriptions acquired while disconnected.
    pub fn connect(&self) -> EngineResult<()> {
        self.manager.connect()?;
        Ok(())
    }

    /// Tears down the session: closes the channel and clears session-scoped
    /// cache state.
    pub fn logout(&self) {
        self.manager.disconnect();
        self.store.clear_session();
    }

    /// Current channel lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Detects a silent transport drop; returns true if the channel is live.
    pub fn check_liveness(&self) -> bool {
        self.manager.check_liveness()
    }

    /// The delay to wait before the next `connect` retry.
    pub fn reconnect_delay(&self) -> Duration {
        self.manager.reconnect_delay()
    }

    /// Declares interest in a room. Dropping the handle releases it; the
    /// room's network subscription is refcounted across handles.
    pub fn watch(&self, room: RoomKey) -> RoomHandle<T, C> {
        self.registry.acquire(room)
    }

    /// Subscribes a view to a cache region. The receiver gets one change
    /// notification per matching cache write.
    pub fn subscribe(&self, selector: Selector) -> Receiver<CacheChange> {
        self.store.subscribe(selector)
    }

    /// The in-flight mutation for an entity, if any.
    pub fn pending_mutation(&self, target: &EntityRef) -> Option<MutationId> {
        self.engine.pending_for(target)
    }

    /// Submits an intent and drives it (plus any queued followers for the
    /// same entity) through HTTP to resolution.
    ///
    /// Rejections and transport failures come back as
    /// [`MutateStatus::Resolved`] values with the rollback already applied;
    /// `Err` is reserved for caller mistakes like an uncached target.
    pub fn mutate(&self, intent: Intent) -> EngineResult<MutateStatus> {
        let call = match self.engine.submit(intent)? {
            SubmitResult::Dispatch(call) => call,
            SubmitResult::Queued => return Ok(MutateStatus::Queued),
        };

        let result = self.http.execute(&call);
        let resolution = self.engine.resolve_http(call.mutation_id, result)?;
        let outcome = resolution.outcome;

        // Drain queued intents the resolution released.
        let mut next = resolution.next;
        while let Some(call) = next {
            let result = self.http.execute(&call);
            next = self.engine.resolve_http(call.mutation_id, result)?.next;
        }
        Ok(MutateStatus::Resolved(outcome))
    }

    /// The cached state of a list view, if present.
    pub fn read_query(&self, descriptor: &QueryDescriptor) -> Option<QueryState> {
        self.store.queries().get(descriptor)
    }

    /// Fetches the first page of a list view, replacing any cached state.
    /// Page items land in the entity cache; the list stores ids only.
    pub fn refresh_query(&self, descriptor: &QueryDescriptor) -> EngineResult<QueryState> {
        let page = self
            .http
            .fetch_page(descriptor, None)
            .map_err(fetch_error)?;
        let (ids, cursor, has_more) = self.ingest(page);
        let state = QueryState::new(ids, cursor, has_more);
        self.store.put_query(descriptor.clone(), state.clone());
        Ok(state)
    }

    /// Fetches the next page of a list view and appends it. Ids already
    /// present (optimistic inserts, concurrent events) are not duplicated.
    /// A list marked stale by an invalidation is refetched from the first
    /// page instead of paginated further.
    pub fn fetch_more(&self, descriptor: &QueryDescriptor) -> EngineResult<QueryState> {
        let Some(current) = self.store.queries().get(descriptor) else {
            return self.refresh_query(descriptor);
        };
        if current.stale {
            return self.refresh_query(descriptor);
        }
        if !current.has_more {
            return Ok(current);
        }
        let page = self
            .http
            .fetch_page(descriptor, current.cursor.as_deref())
            .map_err(fetch_error)?;
        let (new_ids, cursor, has_more) = self.ingest(page);

        let mut ids = current.ids;
        for id in new_ids {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        let state = QueryState::new(ids, cursor, has_more);
        self.store.put_query(descriptor.clone(), state.clone());
        Ok(state)
    }

    /// Refetches a server-owned counter, replacing the local mirror.
    pub fn refresh_counter(&self, counter: &CounterKind) -> EngineResult<u64> {
        let value = self.http.fetch_counter(counter).map_err(fetch_error)?;
        self.store.set_counter(counter.clone(), value);
        Ok(value)
    }

    /// Drains the channel's inbound queue through the dispatcher. Returns
    /// the number of events applied. Malformed frames are dropped with a
    /// diagnostic, never an error.
    pub fn pump(&self) -> usize {
        let mut handled = 0;
        while let Some(raw) = self.manager.poll_event() {
            match PushEvent::decode(&raw) {
                Ok(event) => {
                    self.dispatcher.handle(event);
                    handled += 1;
                }
                Err(e) => warn!(error = %e, "dropping malformed push frame"),
            }
        }
        handled
    }

    /// Writes every page item to the entity cache and returns the id order
    /// plus pagination.
    fn ingest(&self, page: Page) -> (Vec<EntityId>, Option<String>, bool) {
        let Page {
            items,
            next_cursor,
            has_more,
        } = page;
        let ids = items
            .into_iter()
            .map(|doc| {
                let id = doc.id.clone();
                self.store.apply_authoritative(doc);
                id
            })
            .collect();
        (ids, next_cursor, has_more)
    }
}

fn fetch_error(e: HttpError) -> EngineError {
    match e {
        HttpError::Rejected { status, message } => EngineError::MutationRejected { status, message },
        HttpError::Transport(message) => EngineError::HttpTransport(message),
    }
}
