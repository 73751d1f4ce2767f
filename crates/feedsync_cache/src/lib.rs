//! # feedsync Cache
//!
//! The client-resident, read-optimized cache layer:
//!
//! - [`EntityCache`]: keyed entity snapshots with origin/version metadata
//! - [`QueryCache`]: ordered id lists per list view, with staleness and
//!   pattern invalidation
//! - [`PresenceSet`]: the wholesale-replaced set of online users
//! - [`ObserverBridge`]: scoped change notification for the rendering layer
//! - [`CacheStore`]: the single injected handle bundling all of the above,
//!   whose composite operations write and notify in one synchronous call
//!
//! ## Key Invariants
//!
//! - Query lists own ids only, never entity payloads
//! - Authoritative writes apply only if strictly newer by version
//! - Optimistic writes never advance the authoritative version
//! - Notifications are scoped to affected selectors, never global

mod entity;
mod observe;
mod presence;
mod query;
mod store;

pub use entity::{EntityCache, EntityRecord, Origin};
pub use observe::{CacheChange, ObserverBridge, Selector};
pub use presence::PresenceSet;
pub use query::{
    QueryCache, QueryDescriptor, QueryFilter, QueryPattern, QueryState, RelationScope, SortOrder,
};
pub use store::{CacheStore, CounterValue};
