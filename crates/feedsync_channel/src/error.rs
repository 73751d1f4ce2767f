//! Error types for the push channel.

use thiserror::Error;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors from the push-channel layer.
///
/// All of these are recoverable: transport faults are retried with backoff
/// and `LoggedOut` simply means no session exists. Nothing here corrupts
/// cache state.
#[derive(Error, Debug, Clone)]
pub enum ChannelError {
    /// No session token exists; the channel stays down until login.
    #[error("no session token available")]
    LoggedOut,

    /// Transport-level failure (socket drop, handshake failure).
    #[error("channel transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether reconnecting can help.
        retryable: bool,
    },

    /// An operation that needs an open channel was called while closed.
    #[error("channel is not open")]
    NotOpen,
}

impl ChannelError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if reconnecting with backoff can resolve this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChannelError::Transport { retryable, .. } => *retryable,
            ChannelError::NotOpen => true,
            ChannelError::LoggedOut => false,
        }
    }
}
