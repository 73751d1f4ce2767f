//! Push-channel lifecycle: connect, reconnect, room bookkeeping.

use crate::backoff::ReconnectConfig;
use crate::credentials::CredentialStore;
use crate::error::{ChannelError, ChannelResult};
use crate::transport::ChannelTransport;
use feedsync_protocol::RoomKey;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The lifecycle state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel (initial, after logout, or after explicit disconnect).
    Disconnected,
    /// Channel open and authenticated.
    Connected,
    /// Channel lost; waiting out the backoff delay before retrying.
    Backoff {
        /// Consecutive failed attempts so far.
        attempt: u32,
    },
}

impl ConnectionState {
    /// Returns true if the channel is usable.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Owns the persistent push channel: one channel per active session.
///
/// Connection faults are surfaced as error values and a `Backoff` state for
/// the caller's retry loop; they never panic and never corrupt cache state.
/// The manager also keeps the joined-room set, because membership does not
/// survive a reconnect and must be replayed on every successful open.
pub struct ConnectionManager<T: ChannelTransport, C: CredentialStore> {
    transport: Arc<T>,
    credentials: Arc<C>,
    config: ReconnectConfig,
    state: RwLock<ConnectionState>,
    session_token: RwLock<Option<String>>,
    rooms: RwLock<HashSet<RoomKey>>,
    failed_attempts: AtomicU32,
}

impl<T: ChannelTransport, C: CredentialStore> ConnectionManager<T, C> {
    /// Creates a manager. The channel starts disconnected.
    pub fn new(transport: T, credentials: C, config: ReconnectConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            credentials: Arc::new(credentials),
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            session_token: RwLock::new(None),
            rooms: RwLock::new(HashSet::new()),
            failed_attempts: AtomicU32::new(0),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the channel is open and authenticated.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected() && self.transport.is_open()
    }

    /// Snapshot of the tracked room set.
    pub fn rooms(&self) -> Vec<RoomKey> {
        self.rooms.read().iter().cloned().collect()
    }

    /// Opens (or re-opens) the channel with the current session token.
    ///
    /// - No token ⇒ tears everything down and returns `LoggedOut`.
    /// - Token changed since the existing connection ⇒ the stale session is
    ///   closed and a fresh one opened, never reused.
    /// - On success, every tracked room is re-joined.
    pub fn connect(&self) -> ChannelResult<()> {
        let Some(token) = self.credentials.token() else {
            self.disconnect();
            return Err(ChannelError::LoggedOut);
        };

        if self.transport.is_open() {
            let same_session = self.session_token.read().as_deref() == Some(token.as_str());
            if same_session {
                return Ok(());
            }
            debug!("session token changed; tearing down stale channel");
            self.transport.close();
        }

        if let Err(e) = self.transport.open(&token) {
            let attempt = self.failed_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            *self.state.write() = ConnectionState::Backoff { attempt };
            warn!(error = %e, attempt, "channel open failed; will retry");
            return Err(e);
        }

        *self.session_token.write() = Some(token);
        self.failed_attempts.store(0, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Connected;
        debug!("channel connected");

        // Membership did not survive; replay the tracked set.
        let rooms = self.rooms();
        for room in rooms {
            if let Err(e) = self.transport.join(&room) {
                warn!(room = %room, error = %e, "rejoin failed after reconnect");
                self.handle_transport_loss();
                return Err(e);
            }
            debug!(room = %room, "rejoined");
        }
        Ok(())
    }

    /// Terminal teardown (logout or shutdown): closes the channel and clears
    /// all room and session state.
    pub fn disconnect(&self) {
        self.transport.close();
        self.rooms.write().clear();
        *self.session_token.write() = None;
        self.failed_attempts.store(0, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Disconnected;
        debug!("channel disconnected");
    }

    /// Tracks `room` and subscribes if the channel is open.
    ///
    /// Idempotent: a room already tracked causes no second network join.
    /// While disconnected the room is only tracked; the join happens on the
    /// next successful connect.
    pub fn join_room(&self, room: &RoomKey) -> ChannelResult<()> {
        if !self.rooms.write().insert(room.clone()) {
            return Ok(());
        }
        if self.transport.is_open() {
            self.transport.join(room)?;
            debug!(room = %room, "joined");
        }
        Ok(())
    }

    /// Stops tracking `room` and unsubscribes if the channel is open.
    pub fn leave_room(&self, room: &RoomKey) -> ChannelResult<()> {
        if !self.rooms.write().remove(room) {
            return Ok(());
        }
        if self.transport.is_open() {
            self.transport.leave(room)?;
            debug!(room = %room, "left");
        }
        Ok(())
    }

    /// Records a transport-level drop and enters backoff.
    pub fn handle_transport_loss(&self) {
        let attempt = self.failed_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.write() = ConnectionState::Backoff { attempt };
        warn!(attempt, "push channel lost; entering backoff");
    }

    /// Detects a silent transport drop. Returns true if the channel is live.
    pub fn check_liveness(&self) -> bool {
        if self.state().is_connected() && !self.transport.is_open() {
            self.handle_transport_loss();
            return false;
        }
        self.state().is_connected()
    }

    /// The delay the caller should wait before the next `connect` attempt.
    pub fn reconnect_delay(&self) -> Duration {
        self.config
            .delay_for_attempt(self.failed_attempts.load(Ordering::SeqCst))
    }

    /// Returns the next raw inbound event, if any.
    pub fn poll_event(&self) -> Option<Value> {
        self.transport.try_recv()
    }
}
