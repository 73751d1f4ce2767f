//! End-to-end scenarios driving the full client with mock transports.

use feedsync_cache::{
    CacheStore, QueryDescriptor, QueryFilter, QueryState, RelationScope, SortOrder,
};
use feedsync_channel::{MockChannel, ReconnectConfig, StaticCredentials};
use feedsync_engine::{
    EventDispatcher, HttpError, Intent, MockHttp, MutateStatus, MutationEngine, MutationOutcome,
    SubmitResult, SyncClient,
};
use feedsync_protocol::{
    CounterKind, EntityDoc, EntityId, EntityKind, EntityRef, PushEvent, RoomKey, Version,
};
use serde_json::json;
use std::sync::Arc;

fn client() -> SyncClient<MockChannel, StaticCredentials, MockHttp> {
    SyncClient::new(
        MockChannel::new(),
        StaticCredentials::with_token("tok"),
        MockHttp::new(),
        ReconnectConfig::new().without_jitter(),
    )
}

fn feed() -> QueryDescriptor {
    QueryDescriptor::new(EntityKind::Post, QueryFilter::any(), SortOrder::Newest)
}

fn post(id: &str, version: u64, data: serde_json::Value) -> EntityDoc {
    EntityDoc::new(EntityKind::Post, id, Version(version), data)
}

fn post_ref(id: &str) -> EntityRef {
    EntityRef::new(EntityKind::Post, id)
}

// --- Mutation round trips through the facade ---

#[test]
fn like_confirmed_by_echo() {
    let client = client();
    client
        .store()
        .apply_authoritative(post("p1", 1, json!({"likes": []})));

    client
        .http()
        .push_response(Ok(post("p1", 2, json!({"likes": ["me"]}))));

    let status = client
        .mutate(Intent::toggle(post_ref("p1"), json!({}), |mut d| {
            d["likes"] = json!(["me"]);
            d
        }))
        .unwrap();

    assert_eq!(status, MutateStatus::Resolved(MutationOutcome::Confirmed));
    let record = client.store().entities().get(&post_ref("p1")).unwrap();
    assert_eq!(record.doc.version, Version(2));
    assert_eq!(record.doc.data["likes"], json!(["me"]));
    assert!(client.pending_mutation(&post_ref("p1")).is_none());
}

#[test]
fn rejected_like_rolls_back_and_later_mutations_still_work() {
    let client = client();
    client
        .store()
        .apply_authoritative(post("p1", 3, json!({"likes": ["other"]})));
    let before = client.store().entities().get(&post_ref("p1"));

    client.http().push_response(Err(HttpError::rejected(403, "forbidden")));
    let status = client
        .mutate(Intent::toggle(post_ref("p1"), json!({}), |mut d| {
            d["likes"] = json!(["other", "me"]);
            d
        }))
        .unwrap();

    assert_eq!(
        status,
        MutateStatus::Resolved(MutationOutcome::Rejected {
            status: 403,
            message: "forbidden".into()
        })
    );
    assert_eq!(client.store().entities().get(&post_ref("p1")), before);

    // The failure left no residue; a retry succeeds normally.
    client
        .http()
        .push_response(Ok(post("p1", 4, json!({"likes": ["other", "me"]}))));
    let status = client
        .mutate(Intent::toggle(post_ref("p1"), json!({}), |mut d| {
            d["likes"] = json!(["other", "me"]);
            d
        }))
        .unwrap();
    assert_eq!(status, MutateStatus::Resolved(MutationOutcome::Confirmed));
}

#[test]
fn create_swaps_placeholder_for_real_entity() {
    let client = client();
    client
        .store()
        .put_query(feed(), QueryState::new(vec![EntityId::new("p1")], None, false));

    client.http().push_response(Ok(post("p99", 1, json!({"title": "new"}))));
    let status = client
        .mutate(Intent::create(
            EntityKind::Post,
            json!({"title": "new"}),
            feed(),
        ))
        .unwrap();

    assert_eq!(status, MutateStatus::Resolved(MutationOutcome::Confirmed));
    let ids = client.read_query(&feed()).unwrap().ids;
    assert_eq!(ids, vec![EntityId::new("p99"), EntityId::new("p1")]);
    assert!(client.store().entities().get(&post_ref("p99")).is_some());
    // No placeholder residue anywhere.
    assert!(ids.iter().all(|id| !id.is_placeholder()));
}

// --- Event/HTTP races, driven at the engine level so the interleaving is
// --- explicit ---

fn reconciler() -> (Arc<CacheStore>, Arc<MutationEngine>, EventDispatcher) {
    let store = Arc::new(CacheStore::new());
    let engine = Arc::new(MutationEngine::new(Arc::clone(&store)));
    let dispatcher = EventDispatcher::new(Arc::clone(&store), Arc::clone(&engine));
    (store, engine, dispatcher)
}

fn dispatch_call(engine: &MutationEngine, intent: Intent) -> feedsync_protocol::HttpCall {
    match engine.submit(intent).unwrap() {
        SubmitResult::Dispatch(call) => call,
        SubmitResult::Queued => panic!("expected dispatch"),
    }
}

#[test]
fn event_arriving_before_echo_wins_and_echo_is_discarded() {
    let (store, engine, dispatcher) = reconciler();
    store.apply_authoritative(post("p1", 1, json!({"likes": []})));

    let call = dispatch_call(
        &engine,
        Intent::toggle(post_ref("p1"), json!({}), |mut d| {
            d["likes"] = json!(["me"]);
            d
        }),
    );

    // The room broadcast of our own like lands before the HTTP response,
    // and a second user's like follows immediately.
    dispatcher.handle(PushEvent::Upsert(post("p1", 2, json!({"likes": ["me"]}))));
    dispatcher.handle(PushEvent::Upsert(post(
        "p1",
        3,
        json!({"likes": ["me", "other"]}),
    )));

    // The echo (version 2) is now stale and must not clobber version 3.
    let resolution = engine
        .resolve_http(call.mutation_id, Ok(post("p1", 2, json!({"likes": ["me"]}))))
        .unwrap();
    assert_eq!(resolution.outcome, MutationOutcome::SupersededByEvent);

    let record = store.entities().get(&post_ref("p1")).unwrap();
    assert_eq!(record.doc.version, Version(3));
    assert_eq!(record.doc.data["likes"], json!(["me", "other"]));
}

#[test]
fn delete_event_beats_in_flight_edit_and_drops_its_queue() {
    let (store, engine, dispatcher) = reconciler();
    store.apply_authoritative(post("p1", 1, json!({"title": "old"})));

    let call = dispatch_call(
        &engine,
        Intent::update(post_ref("p1"), json!({"title": "new"}), |mut d| {
            d["title"] = json!("new");
            d
        }),
    );
    // A second edit queues behind the first.
    assert!(matches!(
        engine
            .submit(Intent::update(post_ref("p1"), json!({}), |d| d))
            .unwrap(),
        SubmitResult::Queued
    ));

    dispatcher.handle(PushEvent::Delete {
        kind: EntityKind::Post,
        id: EntityId::new("p1"),
    });
    assert!(store.entities().get(&post_ref("p1")).is_none());

    let resolution = engine
        .resolve_http(call.mutation_id, Ok(post("p1", 2, json!({"title": "new"}))))
        .unwrap();
    assert_eq!(resolution.outcome, MutationOutcome::SupersededByDelete);
    // The queued edit must not resurrect the entity.
    assert!(resolution.next.is_none());
    assert!(store.entities().get(&post_ref("p1")).is_none());
}

#[test]
fn per_entity_versions_are_independent() {
    let (store, _, dispatcher) = reconciler();
    dispatcher.handle(PushEvent::Upsert(post("p1", 10, json!({}))));
    dispatcher.handle(PushEvent::Upsert(post("p2", 2, json!({}))));

    // p2's low version is unaffected by p1's high one.
    dispatcher.handle(PushEvent::Upsert(post("p2", 3, json!({"x": 1}))));
    assert_eq!(
        store.entities().get(&post_ref("p2")).unwrap().doc.version,
        Version(3)
    );
    assert_eq!(
        store.entities().get(&post_ref("p1")).unwrap().doc.version,
        Version(10)
    );
}

// --- Channel lifecycle through the facade ---

#[test]
fn reconnect_replays_watched_rooms() {
    let client = client();
    client.connect().unwrap();

    let _feed_room = client.watch(RoomKey::GlobalFeed);
    let _post_room = client.watch(RoomKey::Post(EntityId::new("p1")));

    let transport = Arc::clone(client.manager().transport());
    transport.drop_connection();
    assert!(!client.check_liveness());
    assert!(client.reconnect_delay() > std::time::Duration::ZERO);

    client.connect().unwrap();
    assert_eq!(transport.count_calls("join(feed:global)"), 2);
    assert_eq!(transport.count_calls("join(post:p1)"), 2);
}

#[test]
fn watching_a_room_twice_joins_once() {
    let client = client();
    client.connect().unwrap();
    let transport = Arc::clone(client.manager().transport());

    let a = client.watch(RoomKey::Presence);
    let b = client.watch(RoomKey::Presence);
    assert_eq!(transport.count_calls("join(presence)"), 1);

    drop(a);
    assert_eq!(transport.count_calls("leave(presence)"), 0);
    drop(b);
    assert_eq!(transport.count_calls("leave(presence)"), 1);
}

// --- Push frames end to end through pump ---

#[test]
fn pump_applies_frames_in_order() {
    let client = client();
    client.connect().unwrap();
    client
        .store()
        .put_query(feed(), QueryState::new(vec![], None, false));

    let transport = client.manager().transport();
    transport.push_frame(json!({
        "category": "upsert",
        "entity": {"kind": "post", "id": "p1", "version": 1, "data": {"title": "hi"}}
    }));
    transport.push_frame(json!({
        "category": "counter", "counter": "unread_notifications", "value": 4
    }));
    transport.push_frame(json!({
        "category": "presence", "online": ["u1", "u2"]
    }));
    // A frame from a future server version.
    transport.push_frame(json!({
        "category": "live_reactions", "payload": {"whatever": true}
    }));
    // A malformed known frame: dropped with a diagnostic, not applied.
    transport.push_frame(json!({"category": "delete", "kind": "post"}));

    let handled = client.pump();
    assert_eq!(handled, 4);

    assert!(client.store().entities().get(&post_ref("p1")).is_some());
    assert_eq!(
        client.store().counter(&CounterKind::UnreadNotifications),
        Some(feedsync_cache::CounterValue::Known(4))
    );
    assert!(client.store().presence().contains(&EntityId::new("u1")));
    assert_eq!(client.store().presence().len(), 2);
}

#[test]
fn counter_refetch_marks_stale_then_http_refreshes() {
    let client = client();
    client.connect().unwrap();

    let transport = client.manager().transport();
    transport.push_frame(json!({
        "category": "counter", "counter": "unread_notifications"
    }));
    client.pump();
    assert_eq!(
        client.store().counter(&CounterKind::UnreadNotifications),
        Some(feedsync_cache::CounterValue::Stale)
    );

    client.http().set_counter(CounterKind::UnreadNotifications, 9);
    assert_eq!(
        client
            .refresh_counter(&CounterKind::UnreadNotifications)
            .unwrap(),
        9
    );
    assert_eq!(
        client.store().counter(&CounterKind::UnreadNotifications),
        Some(feedsync_cache::CounterValue::Known(9))
    );
}

#[test]
fn relationship_event_invalidates_only_scoped_lists() {
    let client = client();
    client.connect().unwrap();

    let invitations = QueryDescriptor::new(
        EntityKind::Community,
        QueryFilter::by_relation(RelationScope::Invitations),
        SortOrder::Newest,
    );
    client
        .store()
        .put_query(invitations.clone(), QueryState::new(vec![], None, false));
    client
        .store()
        .put_query(feed(), QueryState::new(vec![], None, false));

    client.manager().transport().push_frame(json!({
        "category": "relationship",
        "relation": "invitation",
        "entity": {"kind": "community", "id": "c1", "version": 1, "data": {}}
    }));
    client.pump();

    assert!(client.read_query(&invitations).unwrap().stale);
    assert!(!client.read_query(&feed()).unwrap().stale);
}
