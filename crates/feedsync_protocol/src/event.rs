//! Inbound push events and their forward-compatible decoding.

use crate::http::EntityDoc;
use crate::ident::{EntityId, EntityKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error for push frames that name a known category but carry a payload the
/// client cannot make sense of.
///
/// Unknown categories are *not* errors; they decode to [`PushEvent::Unknown`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame is not a JSON object.
    #[error("push frame is not an object")]
    NotAnObject,
    /// A required field is missing or has the wrong type.
    #[error("push frame missing or malformed field: {0}")]
    Malformed(&'static str),
}

/// A server-owned counter the client mirrors wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CounterKind {
    /// The session user's unread notification count.
    UnreadNotifications,
    /// Member count of one community.
    CommunityMembers(EntityId),
}

/// How a counter event updates the local mirror.
///
/// Counters are fully owned by the server; there is deliberately no delta
/// variant, since arithmetic against a possibly-stale local value drifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUpdate {
    /// Replace the local value outright.
    Replace(u64),
    /// The local value is stale; refetch it through the HTTP service.
    Refetch,
}

/// The kind of relationship a relationship-change event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// User-follows-user edge.
    Follow,
    /// Community membership (join, approval, rejection).
    CommunityMembership,
    /// Community invitation (accepted/declined).
    Invitation,
}

impl RelationKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "follow" => Some(RelationKind::Follow),
            "community_membership" => Some(RelationKind::CommunityMembership),
            "invitation" => Some(RelationKind::Invitation),
            _ => None,
        }
    }
}

/// One inbound push event, already categorized.
///
/// The dispatcher's `handle` is a total function over this union.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// A new or updated entity.
    Upsert(EntityDoc),
    /// An entity was deleted.
    Delete {
        /// Entity kind.
        kind: EntityKind,
        /// Entity id.
        id: EntityId,
    },
    /// A server-owned counter changed.
    Counter {
        /// Which counter.
        counter: CounterKind,
        /// Replacement value or refetch instruction.
        update: CounterUpdate,
    },
    /// A membership/relationship changed.
    Relationship {
        /// Which relationship kind.
        relation: RelationKind,
        /// The relationship entity, as an upsert.
        doc: EntityDoc,
    },
    /// A periodic full snapshot of who is online.
    PresenceSnapshot {
        /// The complete set of online user ids.
        online: Vec<EntityId>,
    },
    /// A category (or entity kind) this client does not recognize.
    /// Dropped by the dispatcher with a diagnostic; never an error, so a
    /// forward-incompatible server cannot break older clients.
    Unknown {
        /// The unrecognized category tag, for diagnostics.
        category: String,
    },
}

impl PushEvent {
    /// Decodes a raw push frame.
    ///
    /// Frames with an unrecognized `category`, and frames whose entity kind
    /// this client does not know, decode to [`PushEvent::Unknown`]. Frames
    /// that name a known category but are structurally broken are a
    /// [`DecodeError`].
    pub fn decode(raw: &Value) -> Result<PushEvent, DecodeError> {
        let obj = raw.as_object().ok_or(DecodeError::NotAnObject)?;
        let category = obj
            .get("category")
            .and_then(Value::as_str)
            .ok_or(DecodeError::Malformed("category"))?;

        match category {
            "upsert" => match decode_doc(obj.get("entity"))? {
                Some(doc) => Ok(PushEvent::Upsert(doc)),
                None => Ok(unknown(category)),
            },
            "delete" => {
                let kind_str = obj
                    .get("kind")
                    .and_then(Value::as_str)
                    .ok_or(DecodeError::Malformed("kind"))?;
                let id = obj
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or(DecodeError::Malformed("id"))?;
                match EntityKind::parse(kind_str) {
                    Some(kind) => Ok(PushEvent::Delete {
                        kind,
                        id: EntityId::new(id),
                    }),
                    None => Ok(unknown(category)),
                }
            }
            "counter" => {
                let name = obj
                    .get("counter")
                    .and_then(Value::as_str)
                    .ok_or(DecodeError::Malformed("counter"))?;
                let counter = match name {
                    "unread_notifications" => CounterKind::UnreadNotifications,
                    "community_members" => {
                        let community = obj
                            .get("community_id")
                            .and_then(Value::as_str)
                            .ok_or(DecodeError::Malformed("community_id"))?;
                        CounterKind::CommunityMembers(EntityId::new(community))
                    }
                    _ => return Ok(unknown(category)),
                };
                // A counter frame without a value is a refetch instruction.
                let update = match obj.get("value").and_then(Value::as_u64) {
                    Some(v) => CounterUpdate::Replace(v),
                    None => CounterUpdate::Refetch,
                };
                Ok(PushEvent::Counter { counter, update })
            }
            "relationship" => {
                let relation_str = obj
                    .get("relation")
                    .and_then(Value::as_str)
                    .ok_or(DecodeError::Malformed("relation"))?;
                let Some(relation) = RelationKind::parse(relation_str) else {
                    return Ok(unknown(category));
                };
                match decode_doc(obj.get("entity"))? {
                    Some(doc) => Ok(PushEvent::Relationship { relation, doc }),
                    None => Ok(unknown(category)),
                }
            }
            "presence" => {
                let online = obj
                    .get("online")
                    .and_then(Value::as_array)
                    .ok_or(DecodeError::Malformed("online"))?
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .map(EntityId::new)
                            .ok_or(DecodeError::Malformed("online"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(PushEvent::PresenceSnapshot { online })
            }
            other => Ok(unknown(other)),
        }
    }
}

fn unknown(category: &str) -> PushEvent {
    PushEvent::Unknown {
        category: category.to_string(),
    }
}

/// Decodes the embedded entity document of an upsert/relationship frame.
/// Returns `Ok(None)` when the entity kind is unrecognized.
fn decode_doc(entity: Option<&Value>) -> Result<Option<EntityDoc>, DecodeError> {
    let entity = entity
        .and_then(Value::as_object)
        .ok_or(DecodeError::Malformed("entity"))?;
    let kind_str = entity
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(DecodeError::Malformed("entity.kind"))?;
    if EntityKind::parse(kind_str).is_none() {
        return Ok(None);
    }
    serde_json::from_value::<EntityDoc>(Value::Object(entity.clone()))
        .map(Some)
        .map_err(|_| DecodeError::Malformed("entity"))
}
