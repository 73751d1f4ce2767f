//! The push-event dispatcher.
//!
//! One `handle` entry point, total over [`PushEvent`]. Events are
//! authoritative: they win against in-flight optimistic mutations, and they
//! are safe to re-deliver because every merge is version-gated or wholesale.

use crate::mutation::MutationEngine;
use feedsync_cache::{CacheStore, QueryPattern, RelationScope};
use feedsync_protocol::{CounterUpdate, EntityDoc, EntityRef, PushEvent, RelationKind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes decoded push events into the cache, coordinating with the mutation
/// engine where an event touches an entity with a mutation in flight.
pub struct EventDispatcher {
    store: Arc<CacheStore>,
    engine: Arc<MutationEngine>,
}

impl EventDispatcher {
    /// Creates a dispatcher over the shared store and engine.
    pub fn new(store: Arc<CacheStore>, engine: Arc<MutationEngine>) -> Self {
        Self { store, engine }
    }

    /// Applies one event. Never fails: unknown events are dropped with a
    /// diagnostic, stale upserts are ignored by the version gate.
    pub fn handle(&self, event: PushEvent) {
        match event {
            PushEvent::Upsert(doc) => {
                // A creation echo for our own pending create swaps the
                // placeholder instead of inserting a second entity.
                if self.engine.confirm_create_from_event(&doc) {
                    return;
                }
                self.reconcile(doc);
            }
            PushEvent::Delete { kind, id } => {
                let target = EntityRef::new(kind, id);
                self.engine.supersede_by_delete(&target);
                self.store.apply_delete(&target);
            }
            PushEvent::Counter { counter, update } => match update {
                CounterUpdate::Replace(value) => self.store.set_counter(counter, value),
                CounterUpdate::Refetch => self.store.mark_counter_stale(counter),
            },
            PushEvent::Relationship { relation, doc } => {
                // Relationship docs are entities like any other: they go
                // through the same reconciliation as a plain upsert before
                // the scoped invalidation.
                if !self.engine.confirm_create_from_event(&doc) {
                    self.reconcile(doc);
                }
                let scope = relation_scope(relation);
                let invalidated = self.store.invalidate(&QueryPattern::relation(scope));
                debug!(
                    relation = ?relation,
                    lists = invalidated.len(),
                    "relationship change invalidated lists"
                );
            }
            PushEvent::PresenceSnapshot { online } => {
                self.store.replace_presence(online);
            }
            PushEvent::Unknown { category } => {
                warn!(category = %category, "dropping unrecognized push event");
            }
        }
    }

    /// Version-gated authoritative write for an event-carried document.
    ///
    /// An in-flight mutation on the entity is marked superseded only if the
    /// write actually applied: a stale or replayed event is a no-op and must
    /// leave the pending mutation to its own resolution.
    fn reconcile(&self, doc: EntityDoc) {
        let target = doc.entity_ref();
        if !self.store.apply_authoritative(doc) {
            debug!(entity = %target, "ignoring stale upsert");
            return;
        }
        if self.engine.supersede_by_event(&target) {
            debug!(entity = %target, "event resolved in-flight mutation");
        }
    }
}

/// Which cached list scope a relationship change invalidates.
fn relation_scope(relation: RelationKind) -> RelationScope {
    match relation {
        RelationKind::Follow => RelationScope::Following,
        RelationKind::CommunityMembership => RelationScope::OwnedCommunities,
        RelationKind::Invitation => RelationScope::Invitations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{Intent, MutationEngine, MutationOutcome, SubmitResult};
    use feedsync_cache::{
        CounterValue, Origin, QueryDescriptor, QueryFilter, QueryState, SortOrder,
    };
    use feedsync_protocol::{
        CounterKind, EntityDoc, EntityId, EntityKind, Version,
    };
    use serde_json::json;

    fn fixture() -> (Arc<CacheStore>, Arc<MutationEngine>, EventDispatcher) {
        let store = Arc::new(CacheStore::new());
        let engine = Arc::new(MutationEngine::new(Arc::clone(&store)));
        let dispatcher = EventDispatcher::new(Arc::clone(&store), Arc::clone(&engine));
        (store, engine, dispatcher)
    }

    fn post(id: &str, version: u64, data: serde_json::Value) -> EntityDoc {
        EntityDoc::new(EntityKind::Post, id, Version(version), data)
    }

    #[test]
    fn upsert_applies_and_redelivery_is_idempotent() {
        let (store, _, dispatcher) = fixture();

        let doc = post("p1", 3, json!({"title": "hi"}));
        dispatcher.handle(PushEvent::Upsert(doc.clone()));
        dispatcher.handle(PushEvent::Upsert(doc));

        let record = store
            .entities()
            .get(&EntityRef::new(EntityKind::Post, "p1"))
            .unwrap();
        assert_eq!(record.doc.version, Version(3));
    }

    #[test]
    fn stale_upsert_does_not_regress() {
        let (store, _, dispatcher) = fixture();
        dispatcher.handle(PushEvent::Upsert(post("p1", 5, json!({"v": 5}))));
        dispatcher.handle(PushEvent::Upsert(post("p1", 4, json!({"v": 4}))));

        let record = store
            .entities()
            .get(&EntityRef::new(EntityKind::Post, "p1"))
            .unwrap();
        assert_eq!(record.doc.data["v"], json!(5));
    }

    #[test]
    fn upsert_supersedes_in_flight_mutation() {
        let (store, engine, dispatcher) = fixture();
        store.apply_authoritative(post("p1", 1, json!({"likes": []})));
        let target = EntityRef::new(EntityKind::Post, "p1");

        let call = match engine
            .submit(Intent::toggle(target.clone(), json!({}), |mut d| {
                d["likes"] = json!(["me"]);
                d
            }))
            .unwrap()
        {
            SubmitResult::Dispatch(call) => call,
            SubmitResult::Queued => panic!("expected dispatch"),
        };

        dispatcher.handle(PushEvent::Upsert(post("p1", 2, json!({"likes": ["me"]}))));

        let resolution = engine
            .resolve_http(call.mutation_id, Ok(post("p1", 2, json!({"likes": ["me"]}))))
            .unwrap();
        assert_eq!(resolution.outcome, MutationOutcome::SupersededByEvent);
        assert_eq!(
            store.entities().get(&target).unwrap().doc.version,
            Version(2)
        );
    }

    #[test]
    fn replayed_upsert_leaves_in_flight_mutation_to_its_echo() {
        let (store, engine, dispatcher) = fixture();
        store.apply_authoritative(post("p1", 5, json!({"likes": []})));
        let target = EntityRef::new(EntityKind::Post, "p1");

        let call = match engine
            .submit(Intent::toggle(target.clone(), json!({}), |mut d| {
                d["likes"] = json!(["me"]);
                d
            }))
            .unwrap()
        {
            SubmitResult::Dispatch(call) => call,
            SubmitResult::Queued => panic!("expected dispatch"),
        };

        // A replayed event at the cached version is a no-op; it must not
        // claim the pending mutation.
        dispatcher.handle(PushEvent::Upsert(post("p1", 5, json!({"likes": []}))));

        let resolution = engine
            .resolve_http(call.mutation_id, Ok(post("p1", 6, json!({"likes": ["me"]}))))
            .unwrap();
        assert_eq!(resolution.outcome, MutationOutcome::Confirmed);

        let record = store.entities().get(&target).unwrap();
        assert_eq!(record.doc.version, Version(6));
        assert_eq!(record.origin, Origin::Authoritative);
        assert_eq!(record.pending_mutation, None);
    }

    #[test]
    fn relationship_event_supersedes_in_flight_toggle_without_regression() {
        let (store, engine, dispatcher) = fixture();
        let target = EntityRef::new(EntityKind::FollowEdge, "f1");
        store.apply_authoritative(EntityDoc::new(
            EntityKind::FollowEdge,
            "f1",
            Version(1),
            json!({"following": false}),
        ));

        let call = match engine
            .submit(Intent::toggle(target.clone(), json!({}), |mut d| {
                d["following"] = json!(true);
                d
            }))
            .unwrap()
        {
            SubmitResult::Dispatch(call) => call,
            SubmitResult::Queued => panic!("expected dispatch"),
        };

        dispatcher.handle(PushEvent::Relationship {
            relation: RelationKind::Follow,
            doc: EntityDoc::new(
                EntityKind::FollowEdge,
                "f1",
                Version(2),
                json!({"following": true}),
            ),
        });

        // The same-version echo is stale against the event's write and must
        // not roll the entity back to its pre-image.
        let resolution = engine
            .resolve_http(
                call.mutation_id,
                Ok(EntityDoc::new(
                    EntityKind::FollowEdge,
                    "f1",
                    Version(2),
                    json!({"following": true}),
                )),
            )
            .unwrap();
        assert_eq!(resolution.outcome, MutationOutcome::SupersededByEvent);

        let record = store.entities().get(&target).unwrap();
        assert_eq!(record.doc.version, Version(2));
        assert_eq!(record.doc.data["following"], json!(true));
        assert_eq!(record.pending_mutation, None);
    }

    #[test]
    fn delete_event_removes_and_is_idempotent() {
        let (store, _, dispatcher) = fixture();
        store.apply_authoritative(post("p1", 1, json!({})));
        let feed = QueryDescriptor::new(EntityKind::Post, QueryFilter::any(), SortOrder::Newest);
        store.put_query(
            feed.clone(),
            QueryState::new(vec![EntityId::new("p1")], None, false),
        );

        let event = PushEvent::Delete {
            kind: EntityKind::Post,
            id: EntityId::new("p1"),
        };
        dispatcher.handle(event.clone());
        dispatcher.handle(event);

        assert!(store
            .entities()
            .get(&EntityRef::new(EntityKind::Post, "p1"))
            .is_none());
        assert!(store.queries().get(&feed).unwrap().ids.is_empty());
    }

    #[test]
    fn counter_replace_and_refetch() {
        let (store, _, dispatcher) = fixture();

        dispatcher.handle(PushEvent::Counter {
            counter: CounterKind::UnreadNotifications,
            update: CounterUpdate::Replace(7),
        });
        assert_eq!(
            store.counter(&CounterKind::UnreadNotifications),
            Some(CounterValue::Known(7))
        );

        dispatcher.handle(PushEvent::Counter {
            counter: CounterKind::UnreadNotifications,
            update: CounterUpdate::Refetch,
        });
        assert_eq!(
            store.counter(&CounterKind::UnreadNotifications),
            Some(CounterValue::Stale)
        );
    }

    #[test]
    fn relationship_event_invalidates_scoped_lists() {
        let (store, _, dispatcher) = fixture();
        let following = QueryDescriptor::new(
            EntityKind::FollowEdge,
            QueryFilter::by_relation(RelationScope::Following),
            SortOrder::Newest,
        );
        let feed = QueryDescriptor::new(EntityKind::Post, QueryFilter::any(), SortOrder::Newest);
        store.put_query(following.clone(), QueryState::new(vec![], None, false));
        store.put_query(feed.clone(), QueryState::new(vec![], None, false));

        dispatcher.handle(PushEvent::Relationship {
            relation: RelationKind::Follow,
            doc: EntityDoc::new(EntityKind::FollowEdge, "f1", Version(1), json!({})),
        });

        assert!(store.queries().get(&following).unwrap().stale);
        assert!(!store.queries().get(&feed).unwrap().stale);
    }

    #[test]
    fn presence_snapshot_replaces_wholesale() {
        let (store, _, dispatcher) = fixture();
        dispatcher.handle(PushEvent::PresenceSnapshot {
            online: vec![EntityId::new("u1"), EntityId::new("u2")],
        });
        assert!(store.presence().contains(&EntityId::new("u1")));

        dispatcher.handle(PushEvent::PresenceSnapshot {
            online: vec![EntityId::new("u2")],
        });
        assert!(!store.presence().contains(&EntityId::new("u1")));
        assert!(store.presence().contains(&EntityId::new("u2")));
    }

    #[test]
    fn unknown_event_is_a_no_op() {
        let (store, _, dispatcher) = fixture();
        store.apply_authoritative(post("p1", 1, json!({})));
        dispatcher.handle(PushEvent::Unknown {
            category: "reaction_stream".into(),
        });
        assert!(store
            .entities()
            .get(&EntityRef::new(EntityKind::Post, "p1"))
            .is_some());
    }

    #[test]
    fn creation_echo_confirms_pending_create() {
        let (store, engine, dispatcher) = fixture();
        let feed = QueryDescriptor::new(EntityKind::Post, QueryFilter::any(), SortOrder::Newest);
        store.put_query(feed.clone(), QueryState::new(vec![], None, false));

        let call = match engine
            .submit(Intent::create(
                EntityKind::Post,
                json!({"title": "hi"}),
                feed.clone(),
            ))
            .unwrap()
        {
            SubmitResult::Dispatch(call) => call,
            SubmitResult::Queued => panic!("expected dispatch"),
        };
        let token = call.correlation.unwrap();

        dispatcher.handle(PushEvent::Upsert(
            post("p42", 1, json!({"title": "hi"})).with_correlation(token),
        ));

        assert_eq!(
            store.queries().get(&feed).unwrap().ids,
            vec![EntityId::new("p42")]
        );
    }
}
