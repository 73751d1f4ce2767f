//! Entity identity: kinds, ids, versions, and opaque tokens.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The type tag of a server-owned entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A post in a feed.
    Post,
    /// A poll attached to a post.
    Poll,
    /// A comment on a post.
    Comment,
    /// A user notification.
    Notification,
    /// A community.
    Community,
    /// A follow relationship between two users.
    FollowEdge,
}

impl EntityKind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Post => "post",
            EntityKind::Poll => "poll",
            EntityKind::Comment => "comment",
            EntityKind::Notification => "notification",
            EntityKind::Community => "community",
            EntityKind::FollowEdge => "follow_edge",
        }
    }

    /// Parses a wire name. Returns `None` for kinds this client does not know.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(EntityKind::Post),
            "poll" => Some(EntityKind::Poll),
            "comment" => Some(EntityKind::Comment),
            "notification" => Some(EntityKind::Notification),
            "community" => Some(EntityKind::Community),
            "follow_edge" => Some(EntityKind::FollowEdge),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stable server-assigned entity identifier.
///
/// Optimistically created entities carry a client-minted placeholder id
/// until the server echoes the real one (matched by correlation token).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an id from its wire representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a client-local placeholder id for an optimistic create.
    pub fn placeholder() -> Self {
        Self(format!("local-{}", Uuid::new_v4()))
    }

    /// Returns true if this id was minted locally and not yet confirmed.
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with("local-")
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A cache key: entity kind plus id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity id.
    pub id: EntityId,
}

impl EntityRef {
    /// Creates a reference.
    pub fn new(kind: EntityKind, id: impl Into<EntityId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A per-entity monotonic logical version.
///
/// Version 0 means "never seen"; every authoritative document carries a
/// version of at least 1, so a strict comparison implements both the
/// first-write case and the monotonicity rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(pub u64);

impl Version {
    /// The "never seen" sentinel.
    pub const ZERO: Version = Version(0);

    /// Returns true if `self` is strictly newer than `other`.
    pub fn newer_than(&self, other: Version) -> bool {
        self.0 > other.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Identifies one in-flight optimistic mutation. Session-scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(Uuid);

impl MutationId {
    /// Mints a fresh mutation id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Client-generated token embedded in create requests and echoed back by the
/// server, used to match an optimistic placeholder with its real entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(Uuid);

impl CorrelationToken {
    /// Mints a fresh correlation token.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
