//! # feedsync Channel
//!
//! Lifecycle management for the persistent push channel:
//!
//! - [`ChannelTransport`]: the trait seam over the concrete socket, with a
//!   [`MockChannel`] for tests
//! - [`CredentialStore`]: read-only access to the session token
//! - [`ConnectionManager`]: connect/disconnect, token-aware reconnection
//!   with capped exponential backoff, room bookkeeping and rejoin-on-reconnect
//! - [`SubscriptionRegistry`]: refcounted room acquisition with RAII release
//!
//! ## Key Invariants
//!
//! - Room membership is never assumed to survive a reconnect; the tracked
//!   set is replayed on every successful open
//! - A token change tears the session down rather than reusing it
//! - N acquires + N releases of a room produce exactly one join and one
//!   leave at the network level
//! - Transport faults are diagnostics and retries, never panics

mod backoff;
mod credentials;
mod error;
mod manager;
mod registry;
mod transport;

pub use backoff::ReconnectConfig;
pub use credentials::{CredentialStore, StaticCredentials};
pub use error::{ChannelError, ChannelResult};
pub use manager::{ConnectionManager, ConnectionState};
pub use registry::{RoomHandle, SubscriptionRegistry};
pub use transport::{ChannelTransport, MockChannel};
