//! Types for the HTTP request/response contract.
//!
//! The engine never talks to a concrete HTTP library; it describes the call
//! it needs as an [`HttpCall`] and expects the canonical [`EntityDoc`] every
//! mutating endpoint echoes back.

use crate::ident::{CorrelationToken, EntityId, EntityKind, EntityRef, MutationId, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The canonical shape of an entity as the server serves it.
///
/// This is the unit that gets merged into the entity cache, whether it came
/// from an HTTP response or from a push-channel upsert event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDoc {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity id.
    pub id: EntityId,
    /// Per-entity monotonic version.
    pub version: Version,
    /// Business payload. Opaque to the sync layer.
    pub data: Value,
    /// Correlation token echoed back for creates, absent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationToken>,
}

impl EntityDoc {
    /// Creates a document.
    pub fn new(kind: EntityKind, id: impl Into<EntityId>, version: Version, data: Value) -> Self {
        Self {
            kind,
            id: id.into(),
            version,
            data,
            correlation: None,
        }
    }

    /// Attaches a correlation token.
    pub fn with_correlation(mut self, token: CorrelationToken) -> Self {
        self.correlation = Some(token);
        self
    }

    /// Returns the cache key for this document.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            kind: self.kind,
            id: self.id.clone(),
        }
    }
}

/// One page of a list endpoint's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Entities on this page.
    pub items: Vec<EntityDoc>,
    /// Opaque cursor for the next page, if any.
    pub next_cursor: Option<String>,
    /// Whether more pages exist past this one.
    pub has_more: bool,
}

/// The verb of a mutating HTTP call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// Create a new entity.
    Create,
    /// Update fields on an existing entity.
    Update,
    /// Delete an entity.
    Delete,
    /// Server-authoritative toggle (likes, votes). The server decides the
    /// resulting state; the client never diffs reaction arrays itself.
    Toggle,
}

/// A mutating HTTP call the engine wants issued.
///
/// Produced by the mutation engine at submit time; the embedder executes it
/// through its `HttpService` and feeds the result back for resolution.
#[derive(Debug, Clone)]
pub struct HttpCall {
    /// The mutation this call resolves.
    pub mutation_id: MutationId,
    /// Verb.
    pub method: HttpMethod,
    /// Target entity. For creates, the id is the optimistic placeholder.
    pub target: EntityRef,
    /// Request body.
    pub body: Value,
    /// Correlation token for creates, absent otherwise.
    pub correlation: Option<CorrelationToken>,
}
