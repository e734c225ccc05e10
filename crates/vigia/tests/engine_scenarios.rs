//! End-to-end scenarios through the public engine surface.
//!
//! Each test stands up the full router over a fake page, clock, and
//! transport, then drives it the way the operator process would: JSON
//! frames in, JSON responses and pushes out.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use serde_json::{json, Value};
use std::sync::Arc;
use vigia::connection::fake_transport::FakeSocket;
use vigia::page::fake::FakePage;
use vigia::semantic::TYPING_QUIET_MS;
use vigia::{Channel, FakeClock, Message, PageAdapter, RawEvent, Rect, Router};

struct Session {
    page: Arc<FakePage>,
    clock: Arc<FakeClock>,
    socket: Arc<FakeSocket>,
    router: Router,
}

/// A connected session, announcement already on the wire.
fn connect() -> Session {
    let page = FakePage::shared();
    let clock = FakeClock::handle_at(0);
    let socket = FakeSocket::shared();
    let mut router = Router::new(
        page.clone(),
        clock.clone(),
        socket.clone(),
        "ws://127.0.0.1:7332",
    );
    router.connection_mut().connect();
    router.connection_mut().handle_open();
    Session {
        page,
        clock,
        socket,
        router,
    }
}

fn frame(id: &str, channel: Channel, action: &str, payload: Value) -> String {
    serde_json::to_string(&Message {
        id: id.to_string(),
        channel,
        action: action.to_string(),
        payload,
        timestamp: 0,
        source: "operator".to_string(),
    })
    .unwrap()
}

// ============================================================================
// Operator round trips
// ============================================================================

#[test]
fn form_fill_session_round_trip() {
    let mut s = connect();
    let field = s.page.add_element(None, "input");
    s.page.set_id(field, "email");
    s.page.set_input_type(field, "text");
    s.page.set_bounds(field, Rect::new(10.0, 10.0, 200.0, 24.0));
    let button = s.page.add_element(None, "button");
    s.page.set_id(button, "submit");
    s.page.set_bounds(button, Rect::new(10.0, 50.0, 80.0, 24.0));

    let typed = s
        .router
        .handle_frame(&frame(
            "t1",
            Channel::Interaction,
            "type",
            json!({ "selector": "#email", "text": "ada@example.test" }),
        ))
        .unwrap();
    assert!(typed.success, "{:?}", typed.error);
    assert_eq!(
        s.page.element(field).unwrap().value.as_deref(),
        Some("ada@example.test")
    );

    let clicked = s
        .router
        .handle_frame(&frame(
            "t2",
            Channel::Interaction,
            "click",
            json!({ "selector": "#submit" }),
        ))
        .unwrap();
    assert!(clicked.success);
    assert_eq!(clicked.id, "t2");
}

#[test]
fn semantic_stream_reaches_the_wire() {
    let mut s = connect();
    let field = s.page.add_element(None, "textarea");
    s.page.set_id(field, "notes");

    s.router
        .handle_frame(&frame(
            "s1",
            Channel::Semantic,
            "start",
            json!({ "preset": "standard" }),
        ))
        .unwrap();

    s.page.set_value(field, "hello");
    s.router.handle_raw(&RawEvent::KeyDown {
        target: field,
        key: "o".to_string(),
        value: "hello".to_string(),
    });
    s.clock.advance(TYPING_QUIET_MS);
    s.router.tick();

    let pushed: Vec<Value> = s
        .socket
        .sent()
        .iter()
        .map(|f| serde_json::from_str(f).unwrap())
        .collect();
    let event = pushed
        .iter()
        .rev()
        .find(|m| m["channel"] == "semantic")
        .expect("semantic push on the wire");
    assert_eq!(event["payload"]["type"], "input:typed");
    assert_eq!(event["payload"]["payload"]["value"], "hello");

    let stats = s
        .router
        .handle_frame(&frame("s2", Channel::Semantic, "stats", Value::Null))
        .unwrap();
    let data = stats.data.unwrap();
    assert_eq!(data["raw"], 1);
    assert_eq!(data["semantic"], 1);
}

#[test]
fn mutation_watch_summarizes_dom_churn() {
    let mut s = connect();
    s.router
        .handle_frame(&frame(
            "m1",
            Channel::Mutations,
            "watch",
            json!({ "preset": "smart" }),
        ))
        .unwrap();

    let dialog = s.page.add_element(None, "dialog");
    let filler = s.page.add_element(None, "div");
    s.router
        .handle_mutation(vigia::MutationRecord::Added {
            nodes: vec![dialog, filler],
        });
    s.clock.advance(5_000);
    s.router.tick();

    let batch = s
        .socket
        .sent()
        .iter()
        .map(|f| serde_json::from_str::<Value>(f).unwrap())
        .find(|m| m["channel"] == "mutations")
        .expect("mutation batch on the wire");
    assert_eq!(batch["payload"]["added"], 2);
    let notable = batch["payload"]["notable"].as_array().unwrap();
    assert_eq!(notable.len(), 1, "only the dialog is notable");
}

// ============================================================================
// Lifecycle edge cases
// ============================================================================

#[test]
fn paused_engine_ignores_operator_frames() {
    let mut s = connect();
    s.router.deactivate().unwrap();
    let sent_before = s.socket.sent().len();
    assert!(s
        .router
        .handle_frame(&frame("p1", Channel::System, "version", Value::Null))
        .is_none());
    assert_eq!(s.socket.sent().len(), sent_before);

    s.router.activate().unwrap();
    let response = s
        .router
        .handle_frame(&frame("p2", Channel::System, "version", Value::Null))
        .unwrap();
    assert!(response.success);
}

#[test]
fn reconnect_after_socket_drop_reannounces() {
    let mut s = connect();
    s.socket.drop_socket();
    s.router.connection_mut().handle_close();

    s.clock.advance(vigia::connection::RECONNECT_DELAY_MS);
    s.router.tick();
    assert_eq!(s.socket.opened(), 2);

    s.router.connection_mut().handle_open();
    let last: Value = serde_json::from_str(&s.socket.sent().pop().unwrap()).unwrap();
    assert_eq!(last["channel"], "system");
    assert_eq!(last["action"], "connected");
}

#[test]
fn failures_always_come_back_as_responses() {
    let mut s = connect();
    for (channel, action, payload) in [
        (Channel::Interaction, "click", json!({ "selector": "#none" })),
        (Channel::Dom, "inspect", json!({})),
        (Channel::Tabs, "open", json!({ "url": "https://x.test" })),
        (Channel::Eval, "run", json!({ "code": "while(true){}" })),
    ] {
        let response = s
            .router
            .handle_frame(&frame("e", channel, action, payload))
            .unwrap();
        assert!(!response.success);
        assert!(response.error.is_some());
    }
}
