//! # feedsync Engine
//!
//! The reconciliation core of feedsync: optimistic local mutation on one
//! side, authoritative push events on the other, both writing to the same
//! cache under one set of precedence rules.
//!
//! This crate provides:
//! - [`MutationEngine`]: optimistic apply with stored pre-images, per-entity
//!   serialization of intents, and exactly-once three-path resolution
//! - [`EventDispatcher`]: a single `handle(event)` entry point with
//!   idempotent, version-checked merge logic per event category
//! - [`HttpService`]: the trait seam over the HTTP API, with [`MockHttp`]
//! - [`SyncClient`]: the facade wiring cache, channel, engine, and
//!   dispatcher together by explicit injection
//!
//! ## Key Invariants
//!
//! - An authoritative document mutates cache only if strictly newer by the
//!   per-entity version counter (never wall-clock time)
//! - An authoritative event beats an in-flight optimistic mutation; the
//!   later HTTP response is discarded if it is not newer
//! - A rejected or failed mutation rolls back to its exact pre-image
//! - Every mutation resolves exactly once

mod client;
mod dispatch;
mod error;
mod http;
mod mutation;

pub use client::{MutateStatus, SyncClient};
pub use dispatch::EventDispatcher;
pub use error::{EngineError, EngineResult};
pub use http::{HttpError, HttpService, MockHttp};
pub use mutation::{Intent, MutationEngine, MutationOutcome, Resolution, SubmitResult};
