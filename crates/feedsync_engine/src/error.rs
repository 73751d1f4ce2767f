//! Error types for the engine.

use feedsync_channel::ChannelError;
use feedsync_protocol::{EntityRef, MutationId};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the mutation engine and client facade.
///
/// Only `MutationRejected` and `HttpTransport` reach the UI layer, and only
/// as values: a failed "like" must never take down unrelated views.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// The server rejected a mutating call; the optimistic patch was
    /// rolled back. Recoverable and user-visible.
    #[error("mutation rejected by server ({status}): {message}")]
    MutationRejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// The HTTP call never completed; the optimistic patch was rolled back.
    #[error("http transport failure: {0}")]
    HttpTransport(String),

    /// A patch or delete intent targeted an entity that is not cached.
    #[error("entity not in cache: {0}")]
    UnknownEntity(EntityRef),

    /// A resolution arrived for a mutation the engine is not tracking.
    #[error("unknown mutation: {0}")]
    UnknownMutation(MutationId),

    /// Push-channel error.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}
