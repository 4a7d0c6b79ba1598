/*
[INPUT]:  Session scenarios driven through a recording frame sink
[OUTPUT]: Test results for handshake, call correlation, subscriptions, publish shapes, close handling
[POS]:    Integration tests - session state machine
[UPDATE]: When session routing or state transitions change
*/

mod common;

use std::sync::{Arc, Mutex};

use common::{closed, established_session, inbound, new_session, opened, welcome};
use serde_json::{Value, json};
use tokio_test::{assert_err, assert_ok, assert_pending, assert_ready, task};
use tradewire_session::{
    Disconnect, Listener, PublishOptions, SessionConfig, SessionError, SessionState,
    SessionTransition, TransportEvent,
};

fn recorder() -> (Listener, Arc<Mutex<Vec<(String, Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener = Listener::new(move |topic, payload| {
        sink.lock().unwrap().push((topic.to_string(), payload.clone()));
    });
    (listener, seen)
}

fn last_call_id(frames: &[Value]) -> String {
    frames
        .iter()
        .rev()
        .find(|frame| frame[0] == json!(2))
        .and_then(|frame| frame[1].as_str())
        .expect("a call frame was sent")
        .to_string()
}

#[test]
fn test_operations_require_established_session() {
    let (mut session, sent) = new_session(SessionConfig::default());
    let (listener, _) = recorder();

    assert!(matches!(
        session.call("rpc:ping", Vec::new()),
        Err(SessionError::NotConnected)
    ));
    assert!(matches!(
        session.subscribe("t", listener),
        Err(SessionError::NotConnected)
    ));
    assert!(matches!(
        session.publish("t", json!(1), PublishOptions::default()),
        Err(SessionError::NotConnected)
    ));
    assert!(sent.frames().is_empty());

    assert_eq!(session.handle_event(opened()), None);
    assert_eq!(session.state(), SessionState::AwaitingWelcome);
    assert!(matches!(
        session.prefix("m", "http://x/proc/"),
        Err(SessionError::NotConnected)
    ));
}

#[test]
fn test_subscribe_sends_one_wire_subscription_per_topic() {
    let (mut session, sent) = established_session();
    let (l1, _) = recorder();
    let (l2, _) = recorder();

    assert_ok!(session.subscribe("t", l1.clone()));
    let duplicate = session.subscribe("t", l1.clone());
    assert!(matches!(duplicate, Err(SessionError::DuplicateListener { .. })));
    assert_ok!(session.subscribe("t", l2.clone()));

    assert_eq!(sent.count(5), 1);
    assert_eq!(sent.frames(), vec![json!([5, "t"])]);
}

#[test]
fn test_wire_subscriptions_never_exceed_one_per_topic() {
    let (mut session, sent) = established_session();
    let (l1, _) = recorder();
    let (l2, _) = recorder();

    let steps: Vec<(bool, &Listener)> = vec![
        (true, &l1),
        (true, &l2),
        (false, &l1),
        (true, &l1),
        (false, &l2),
        (false, &l1),
        (true, &l2),
        (false, &l2),
    ];

    for (subscribe, listener) in steps {
        if subscribe {
            assert_ok!(session.subscribe("t", listener.clone()));
        } else {
            assert_ok!(session.unsubscribe("t", Some(listener)));
        }
        let active = sent.count(5) as i64 - sent.count(6) as i64;
        assert!((0..=1).contains(&active), "active wire subscriptions: {active}");
    }
    assert_eq!(sent.count(5), 2);
    assert_eq!(sent.count(6), 2);
}

#[test]
fn test_unsubscribe_errors() {
    let (mut session, sent) = established_session();
    let (l1, _) = recorder();
    let (stranger, _) = recorder();

    assert!(matches!(
        session.unsubscribe("t", None),
        Err(SessionError::NotSubscribed { .. })
    ));
    assert_ok!(session.subscribe("t", l1));
    assert!(matches!(
        session.unsubscribe("t", Some(&stranger)),
        Err(SessionError::NotSubscribed { .. })
    ));
    assert_ok!(session.unsubscribe("t", None));
    assert_eq!(sent.frames(), vec![json!([5, "t"]), json!([6, "t"])]);
}

#[tokio::test]
async fn test_prefix_compresses_calls() {
    let (mut session, sent) = established_session();

    assert_ok!(session.prefix("m", "http://x/proc/"));
    assert_eq!(sent.last(), Some(json!([1, "m", "http://x/proc/"])));
    assert_eq!(session.shrink("http://x/proc/foo", false).as_deref(), Some("m:foo"));
    assert_eq!(session.resolve("m:foo", false).as_deref(), Some("http://x/proc/foo"));

    let handle = assert_ok!(session.call("http://x/proc/foo", vec![json!(1), json!("two")]));
    let frames = sent.frames();
    let call_id = last_call_id(&frames);
    assert_eq!(frames.last(), Some(&json!([2, call_id, "m:foo", 1, "two"])));

    assert_eq!(session.handle_event(inbound(json!([3, call_id, {"ok": true}]))), None);
    assert_eq!(assert_ok!(handle.await), json!({"ok": true}));
    assert_eq!(session.pending_calls(), 0);
}

#[tokio::test]
async fn test_concurrent_calls_are_correlated_independently() {
    let (mut session, sent) = established_session();

    let first = assert_ok!(session.call("rpc:a", Vec::new()));
    let first_id = last_call_id(&sent.frames());
    let second = assert_ok!(session.call("rpc:b", Vec::new()));
    let second_id = last_call_id(&sent.frames());
    assert_ne!(first_id, second_id);

    let mut first = task::spawn(first);
    session.handle_event(inbound(json!([3, second_id, "b-result"])));
    assert_eq!(assert_ok!(second.await), json!("b-result"));
    assert_pending!(first.poll());
    assert_eq!(session.pending_calls(), 1);

    session.handle_event(inbound(json!([3, first_id, "a-result"])));
    let outcome = assert_ready!(first.poll());
    assert_eq!(assert_ok!(outcome), json!("a-result"));
}

#[test]
fn test_unknown_call_result_is_dropped() {
    let (mut session, _) = established_session();
    assert_eq!(session.handle_event(inbound(json!([3, "unknown", 1]))), None);
    assert_eq!(
        session.handle_event(inbound(json!([4, "unknown", "http://x/e", "boom"]))),
        None
    );
    assert_eq!(session.state(), SessionState::Established);
}

#[tokio::test]
async fn test_call_error_reaches_only_its_handle() {
    let (mut session, sent) = established_session();
    let handle = assert_ok!(session.call("rpc:order", vec![json!({"qty": 0})]));
    let call_id = last_call_id(&sent.frames());

    session.handle_event(inbound(json!([
        4,
        call_id,
        "http://x/error#invalid",
        "invalid quantity",
        {"field": "qty"}
    ])));

    let err = assert_err!(handle.await);
    let remote = err.remote().expect("remote error");
    assert_eq!(remote.uri, "http://x/error#invalid");
    assert_eq!(remote.desc, "invalid quantity");
    assert_eq!(remote.detail, Some(json!({"field": "qty"})));
    assert_eq!(session.state(), SessionState::Established);
}

#[test]
fn test_events_resolve_prefixes_and_drop_unknown_topics() {
    let (mut session, sent) = established_session();
    let (listener, seen) = recorder();

    assert_ok!(session.prefix("ev", "http://x/event#"));
    assert_ok!(session.subscribe("ev:ticker", listener));
    assert_eq!(sent.last(), Some(json!([5, "ev:ticker"])));
    assert_eq!(session.subscribed_topics(), vec!["http://x/event#ticker".to_string()]);

    session.handle_event(inbound(json!([8, "http://x/event#ticker", {"px": 1}])));
    session.handle_event(inbound(json!([8, "ev:ticker", {"px": 2}])));
    session.handle_event(inbound(json!([8, "ev:book", {"px": 3}])));
    session.handle_event(inbound(json!([8, "zz:ticker", {"px": 4}])));

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            ("http://x/event#ticker".to_string(), json!({"px": 1})),
            ("http://x/event#ticker".to_string(), json!({"px": 2})),
        ]
    );
}

#[test]
fn test_publish_argument_shapes() {
    let (mut session, sent) = established_session();
    let payload = json!({"x": 1});

    for args in [json!([]), json!([true]), json!([[]]), json!([[], []])] {
        let args = args.as_array().cloned().unwrap_or_default();
        let options = assert_ok!(PublishOptions::from_args(&args));
        assert_ok!(session.publish("t", payload.clone(), options));
    }

    assert_eq!(
        sent.frames(),
        vec![
            json!([7, "t", {"x": 1}]),
            json!([7, "t", {"x": 1}, true]),
            json!([7, "t", {"x": 1}, []]),
            json!([7, "t", {"x": 1}, [], []]),
        ]
    );

    assert!(matches!(
        PublishOptions::from_args(&[json!(5)]),
        Err(SessionError::InvalidArgument(_))
    ));

    let conflicting = PublishOptions {
        exclude_me: Some(true),
        exclude: Some(Vec::new()),
        eligible: None,
    };
    assert!(matches!(
        session.publish("t", payload, conflicting),
        Err(SessionError::InvalidArgument(_))
    ));
    assert_eq!(sent.count(7), 4);
}

#[test]
fn test_duplicate_welcome_is_fatal() {
    let (mut session, sent) = established_session();

    match session.handle_event(welcome("sess-2")) {
        Some(SessionTransition::Closed(Disconnect::ProtocolViolation { reason })) => {
            assert!(reason.contains("more than once"), "reason: {reason}");
        }
        other => panic!("Expected protocol violation, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Closed);
    assert!(sent.close_reason().is_some());
    assert!(matches!(
        session.call("rpc:ping", Vec::new()),
        Err(SessionError::NotConnected)
    ));
    assert_eq!(session.handle_event(closed(true)), None);
}

#[test]
fn test_traffic_before_welcome_is_fatal() {
    let (mut session, _) = new_session(SessionConfig::default());
    session.handle_event(opened());
    let transition = session.handle_event(inbound(json!([8, "t", 1])));
    assert!(matches!(
        transition,
        Some(SessionTransition::Closed(Disconnect::ProtocolViolation { .. }))
    ));
}

#[test]
fn test_malformed_and_outbound_only_frames_are_fatal() {
    for raw in ["[42]", "{\"welcome\": true}", "[5, \"t\"]"] {
        let (mut session, _) = established_session();
        let transition = session.handle_event(TransportEvent::Message(raw.to_string()));
        assert!(
            matches!(
                transition,
                Some(SessionTransition::Closed(Disconnect::ProtocolViolation { .. }))
            ),
            "frame {raw} gave {transition:?}"
        );
    }
}

#[test]
fn test_subprotocol_check() {
    let (mut session, sent) = new_session(SessionConfig::default());
    let transition = session.handle_event(TransportEvent::Opened { protocol: None });
    assert!(matches!(
        transition,
        Some(SessionTransition::Closed(Disconnect::ProtocolViolation { .. }))
    ));
    assert!(sent.close_reason().is_some());

    let (mut relaxed, _) = new_session(SessionConfig {
        skip_subprotocol_check: true,
        ..SessionConfig::default()
    });
    assert_eq!(relaxed.handle_event(TransportEvent::Opened { protocol: None }), None);
    assert_eq!(relaxed.state(), SessionState::AwaitingWelcome);
}

#[test]
fn test_refused_negotiation_is_protocol_violation() {
    let (mut session, _) = new_session(SessionConfig::default());
    let transition = session.handle_event(TransportEvent::SubprotocolMismatch {
        reason: "Server sent no subprotocol".to_string(),
    });
    match transition {
        Some(SessionTransition::Closed(Disconnect::ProtocolViolation { reason })) => {
            assert!(reason.contains("Server sent no subprotocol"));
        }
        other => panic!("Expected protocol violation, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_close_classification() {
    let (mut never_opened, _) = new_session(SessionConfig::default());
    assert!(matches!(
        never_opened.handle_event(closed(false)),
        Some(SessionTransition::Closed(Disconnect::Unreachable { .. }))
    ));

    let (mut no_welcome, _) = new_session(SessionConfig::default());
    no_welcome.handle_event(opened());
    assert!(matches!(
        no_welcome.handle_event(closed(true)),
        Some(SessionTransition::Closed(Disconnect::Unreachable { .. }))
    ));

    let (mut lost, _) = established_session();
    assert!(matches!(
        lost.handle_event(closed(false)),
        Some(SessionTransition::Closed(Disconnect::Lost { .. }))
    ));

    let (mut clean, _) = established_session();
    assert!(matches!(
        clean.handle_event(closed(true)),
        Some(SessionTransition::Closed(Disconnect::Closed { .. }))
    ));

    let (mut local, sent) = established_session();
    local.close();
    assert!(sent.close_reason().is_some());
    assert!(matches!(
        local.handle_event(closed(false)),
        Some(SessionTransition::Closed(Disconnect::Closed { .. }))
    ));
}

#[tokio::test]
async fn test_pending_calls_rejected_on_close() {
    let (mut session, _) = established_session();
    let (listener, _) = recorder();
    assert_ok!(session.subscribe("t", listener));
    let handle = assert_ok!(session.call("rpc:slow", Vec::new()));

    session.handle_event(closed(false));

    assert!(matches!(handle.await, Err(SessionError::ConnectionLost(_))));
    assert_eq!(session.pending_calls(), 0);
    assert!(session.subscribed_topics().is_empty());
}

#[test]
fn test_welcome_details_are_recorded() {
    let (session, _) = established_session();
    let info = session.welcome().expect("welcome recorded");
    assert_eq!(info.protocol_version, 1);
    assert_eq!(info.server_ident, "TestServer/1.0");
    assert_eq!(session.session_id(), Some("sess-1"));
}
