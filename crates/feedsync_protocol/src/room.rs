//! Room keys for topic-scoped push subscriptions.

use crate::ident::EntityId;
use std::fmt;

/// A topic scope on the push channel.
///
/// The canonical string encoding (`post:<id>`, `feed:global`, ...) is what
/// crosses the transport boundary in join/leave frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    /// The global post feed.
    GlobalFeed,
    /// One post's comment stream.
    Post(EntityId),
    /// One community's activity stream.
    Community(EntityId),
    /// One user's notification stream.
    UserNotifications(EntityId),
    /// The online-presence channel.
    Presence,
}

impl RoomKey {
    /// Encodes this key into its canonical wire form.
    pub fn encode(&self) -> String {
        match self {
            RoomKey::GlobalFeed => "feed:global".to_string(),
            RoomKey::Post(id) => format!("post:{id}"),
            RoomKey::Community(id) => format!("community:{id}"),
            RoomKey::UserNotifications(id) => format!("notifications:{id}"),
            RoomKey::Presence => "presence".to_string(),
        }
    }

    /// Parses a canonical wire form. Returns `None` for unrecognized scopes.
    pub fn parse(s: &str) -> Option<Self> {
        if s == "feed:global" {
            return Some(RoomKey::GlobalFeed);
        }
        if s == "presence" {
            return Some(RoomKey::Presence);
        }
        let (scope, id) = s.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        match scope {
            "post" => Some(RoomKey::Post(EntityId::new(id))),
            "community" => Some(RoomKey::Community(EntityId::new(id))),
            "notifications" => Some(RoomKey::UserNotifications(EntityId::new(id))),
            _ => None,
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
