//! HTTP service abstraction.
//!
//! The engine never holds a concrete HTTP client; it describes the call it
//! needs and the embedder executes it through this trait (reqwest, ureq,
//! a loopback server in tests, ...).

use feedsync_cache::QueryDescriptor;
use feedsync_protocol::{CounterKind, EntityDoc, HttpCall, Page};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Error from one HTTP call.
#[derive(Error, Debug, Clone)]
pub enum HttpError {
    /// The server answered with a rejection status.
    #[error("request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// The request never completed (timeout, connection failure).
    #[error("http transport failure: {0}")]
    Transport(String),
}

impl HttpError {
    /// Creates a rejection.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Creates a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// The HTTP request/response service the engine consumes.
///
/// Every mutating endpoint must echo back the canonical entity so path 1 of
/// the resolution rules can apply it.
pub trait HttpService: Send + Sync {
    /// Executes a mutating call.
    fn execute(&self, call: &HttpCall) -> Result<EntityDoc, HttpError>;

    /// Fetches one page of a list view.
    fn fetch_page(
        &self,
        descriptor: &QueryDescriptor,
        cursor: Option<&str>,
    ) -> Result<Page, HttpError>;

    /// Fetches the current value of a server-owned counter.
    fn fetch_counter(&self, counter: &CounterKind) -> Result<u64, HttpError>;
}

/// A scriptable HTTP service for tests.
///
/// Mutation responses are consumed in FIFO order; pages and counters are
/// keyed lookups. Unscripted calls fail with a transport error.
#[derive(Default)]
pub struct MockHttp {
    responses: Mutex<VecDeque<Result<EntityDoc, HttpError>>>,
    pages: Mutex<HashMap<QueryDescriptor, Page>>,
    counters: Mutex<HashMap<CounterKind, u64>>,
    executed: Mutex<Vec<HttpCall>>,
}

impl MockHttp {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the response for the next mutating call.
    pub fn push_response(&self, response: Result<EntityDoc, HttpError>) {
        self.responses.lock().push_back(response);
    }

    /// Scripts the page returned for a descriptor.
    pub fn set_page(&self, descriptor: QueryDescriptor, page: Page) {
        self.pages.lock().insert(descriptor, page);
    }

    /// Scripts a counter value.
    pub fn set_counter(&self, counter: CounterKind, value: u64) {
        self.counters.lock().insert(counter, value);
    }

    /// Returns the mutating calls executed so far.
    pub fn executed(&self) -> Vec<HttpCall> {
        self.executed.lock().clone()
    }
}

impl HttpService for MockHttp {
    fn execute(&self, call: &HttpCall) -> Result<EntityDoc, HttpError> {
        self.executed.lock().push(call.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(HttpError::transport("no scripted response")))
    }

    fn fetch_page(
        &self,
        descriptor: &QueryDescriptor,
        _cursor: Option<&str>,
    ) -> Result<Page, HttpError> {
        self.pages
            .lock()
            .get(descriptor)
            .cloned()
            .ok_or_else(|| HttpError::transport("no scripted page"))
    }

    fn fetch_counter(&self, counter: &CounterKind) -> Result<u64, HttpError> {
        self.counters
            .lock()
            .get(counter)
            .copied()
            .ok_or_else(|| HttpError::transport("no scripted counter"))
    }
}
