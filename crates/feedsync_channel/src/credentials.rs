//! Read-only access to the session token.

use parking_lot::RwLock;

/// Provides the current session token.
///
/// Read synchronously at connect time and on every reconnect attempt, so a
/// token rotated mid-session is picked up by the next (re)connect.
pub trait CredentialStore: Send + Sync {
    /// Returns the current token, or `None` when logged out.
    fn token(&self) -> Option<String>;
}

/// An in-memory credential store with a settable token.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    /// Creates a logged-out store.
    pub fn logged_out() -> Self {
        Self::default()
    }

    /// Creates a store holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Replaces the token (login or rotation).
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Clears the token (logout).
    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl CredentialStore for StaticCredentials {
    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }
}
