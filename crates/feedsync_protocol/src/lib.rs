//! # feedsync Protocol
//!
//! Wire-level types shared by the feedsync cache, channel, and engine crates.
//!
//! This crate defines:
//! - Entity identity: kinds, ids, per-entity logical versions
//! - Room keys for topic-scoped push subscriptions
//! - The inbound push event union, with forward-compatible decoding
//! - The HTTP contract the mutation engine speaks (canonical entity docs,
//!   pages, call descriptions)
//!
//! ## Key Invariants
//!
//! - Versions are per-entity, monotonic, and logical (never wall-clock)
//! - Unrecognized event categories and entity kinds decode to
//!   [`PushEvent::Unknown`], never to an error
//! - Every mutating HTTP endpoint echoes back a canonical [`EntityDoc`]

mod event;
mod http;
mod ident;
mod room;

pub use event::{CounterKind, CounterUpdate, DecodeError, PushEvent, RelationKind};
pub use http::{EntityDoc, HttpCall, HttpMethod, Page};
pub use ident::{CorrelationToken, EntityId, EntityKind, EntityRef, MutationId, Version};
pub use room::RoomKey;
