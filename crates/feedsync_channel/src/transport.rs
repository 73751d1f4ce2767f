//! Transport abstraction over the concrete push socket.

use crate::error::{ChannelError, ChannelResult};
use feedsync_protocol::RoomKey;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// A push-channel transport.
///
/// Implement this over the concrete socket (WebSocket, SSE, etc.). The
/// transport is dumb: it carries frames and join/leave commands; all
/// lifecycle policy (backoff, rejoin, token handling) lives in the
/// [`crate::ConnectionManager`].
pub trait ChannelTransport: Send + Sync {
    /// Opens the channel, authenticating the handshake with `token`.
    fn open(&self, token: &str) -> ChannelResult<()>;

    /// Closes the channel.
    fn close(&self);

    /// Subscribes to a room. Requires an open channel.
    fn join(&self, room: &RoomKey) -> ChannelResult<()>;

    /// Unsubscribes from a room. Requires an open channel.
    fn leave(&self, room: &RoomKey) -> ChannelResult<()>;

    /// Returns the next inbound frame, if one is queued.
    fn try_recv(&self) -> Option<Value>;

    /// Whether the channel is currently open.
    fn is_open(&self) -> bool;
}

/// A scriptable in-memory transport for tests.
///
/// Records every open/join/leave call, supports failure injection for opens,
/// and lets tests queue inbound frames and force connection drops.
#[derive(Debug, Default)]
pub struct MockChannel {
    open: AtomicBool,
    calls: Mutex<Vec<String>>,
    inbound: Mutex<VecDeque<Value>>,
    open_failures_remaining: Mutex<u32>,
}

impl MockChannel {
    /// Creates a closed mock channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` open attempts fail with a retryable error.
    pub fn fail_next_opens(&self, n: u32) {
        *self.open_failures_remaining.lock() = n;
    }

    /// Queues an inbound frame.
    pub fn push_frame(&self, frame: Value) {
        self.inbound.lock().push_back(frame);
    }

    /// Simulates a transport-level drop (the socket dying underneath us).
    pub fn drop_connection(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Returns the recorded call log.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns how many times `call` appears in the log.
    pub fn count_calls(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl ChannelTransport for MockChannel {
    fn open(&self, token: &str) -> ChannelResult<()> {
        self.record(format!("open({token})"));
        let mut failures = self.open_failures_remaining.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(ChannelError::transport_retryable("injected open failure"));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.record("close".to_string());
        self.open.store(false, Ordering::SeqCst);
    }

    fn join(&self, room: &RoomKey) -> ChannelResult<()> {
        if !self.is_open() {
            return Err(ChannelError::NotOpen);
        }
        self.record(format!("join({room})"));
        Ok(())
    }

    fn leave(&self, room: &RoomKey) -> ChannelResult<()> {
        if !self.is_open() {
            return Err(ChannelError::NotOpen);
        }
        self.record(format!("leave({room})"));
        Ok(())
    }

    fn try_recv(&self) -> Option<Value> {
        if !self.is_open() {
            return None;
        }
        self.inbound.lock().pop_front()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
