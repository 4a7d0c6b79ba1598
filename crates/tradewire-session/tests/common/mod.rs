/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities: recording frame sink, session fixtures, WebSocket test server
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for tradewire-session tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tradewire_session::{
    FrameSink, Result, SUBPROTOCOL, Session, SessionConfig, SessionError, SessionTransition,
    TransportEvent,
};

/// Frames written by a session, shared with the test
#[derive(Debug, Clone, Default)]
pub struct SentFrames {
    frames: Arc<Mutex<Vec<Value>>>,
    close_reason: Arc<Mutex<Option<String>>>,
}

impl SentFrames {
    pub fn frames(&self) -> Vec<Value> {
        self.frames.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Value> {
        self.frames.lock().unwrap().last().cloned()
    }

    pub fn count(&self, tag: u64) -> usize {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|frame| frame[0].as_u64() == Some(tag))
            .count()
    }

    pub fn close_reason(&self) -> Option<String> {
        self.close_reason.lock().unwrap().clone()
    }
}

/// In-memory transport half
#[derive(Debug)]
pub struct RecordingSink {
    sent: SentFrames,
}

impl FrameSink for RecordingSink {
    fn send_text(&mut self, text: String) -> Result<()> {
        if self.sent.close_reason().is_some() {
            return Err(SessionError::NotConnected);
        }
        let value: Value = serde_json::from_str(&text)?;
        self.sent.frames.lock().unwrap().push(value);
        Ok(())
    }

    fn close(&mut self, reason: &str) {
        *self.sent.close_reason.lock().unwrap() = Some(reason.to_string());
    }
}

pub fn new_session(config: SessionConfig) -> (Session, SentFrames) {
    let sent = SentFrames::default();
    let sink = RecordingSink { sent: sent.clone() };
    (Session::new(config, Box::new(sink)), sent)
}

pub fn opened() -> TransportEvent {
    TransportEvent::Opened {
        protocol: Some(SUBPROTOCOL.to_string()),
    }
}

pub fn inbound(frame: Value) -> TransportEvent {
    TransportEvent::Message(frame.to_string())
}

pub fn welcome(session_id: &str) -> TransportEvent {
    inbound(json!([0, session_id, 1, "TestServer/1.0"]))
}

pub fn closed(was_clean: bool) -> TransportEvent {
    TransportEvent::Closed {
        code: None,
        reason: "test close".to_string(),
        was_clean,
    }
}

/// Session that already went through open + welcome
pub fn established_session() -> (Session, SentFrames) {
    let (mut session, sent) = new_session(SessionConfig::default());
    assert_eq!(session.handle_event(opened()), None);
    match session.handle_event(welcome("sess-1")) {
        Some(SessionTransition::Established(info)) => assert_eq!(info.session_id, "sess-1"),
        other => panic!("Expected Established, got {other:?}"),
    }
    (session, sent)
}

/// Start a WAMP-speaking test server.
///
/// The first `drop_connections` connections are dropped right after the
/// welcome frame. Others answer calls (`...fail` procedures with a
/// Call-Error, everything else echoing the first argument) and answer each
/// Subscribe with one Event `{"x": 1}` on that topic.
pub async fn spawn_test_server(drop_connections: usize) -> SocketAddr {
    spawn_server(drop_connections, true).await
}

/// Same server, but the handshake never echoes the sub-protocol token
pub async fn spawn_server_without_subprotocol() -> SocketAddr {
    spawn_server(0, false).await
}

/// Accept `connections` connections, drop each right after the welcome
/// frame, then stop listening
pub async fn spawn_short_lived_server(connections: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("test server address");

    tokio::spawn(async move {
        for index in 1..=connections {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(serve_connection(stream, index, true, true));
        }
    });

    addr
}

async fn spawn_server(drop_connections: usize, echo_subprotocol: bool) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("test server address");

    tokio::spawn(async move {
        let mut index = 0usize;
        while let Ok((stream, _)) = listener.accept().await {
            index += 1;
            tokio::spawn(serve_connection(
                stream,
                index,
                index <= drop_connections,
                echo_subprotocol,
            ));
        }
    });

    addr
}

/// An address nothing listens on
pub async fn dead_endpoint() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let addr = listener.local_addr().expect("probe address");
    drop(listener);
    addr
}

async fn serve_connection(
    stream: TcpStream,
    index: usize,
    drop_after_welcome: bool,
    echo_subprotocol: bool,
) {
    let callback = move |request: &Request, mut response: Response| -> std::result::Result<Response, ErrorResponse> {
        if echo_subprotocol && request.headers().contains_key(SEC_WEBSOCKET_PROTOCOL) {
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
        }
        Ok(response)
    };
    let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
        return;
    };

    let welcome = json!([0, format!("session-{index}"), 1, "TestServer/1.0"]);
    if ws.send(Message::Text(welcome.to_string().into())).await.is_err() {
        return;
    }
    if drop_after_welcome {
        return;
    }

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&text.to_string()) else {
            continue;
        };

        let reply = match items.first().and_then(Value::as_u64) {
            Some(2) => {
                let procedure = items[2].as_str().unwrap_or_default();
                if procedure.ends_with("fail") {
                    Some(json!([
                        4,
                        items[1],
                        "http://example.com/error#failed",
                        "call failed",
                        {"procedure": procedure}
                    ]))
                } else {
                    Some(json!([3, items[1], items.get(3).cloned().unwrap_or(Value::Null)]))
                }
            }
            Some(5) => Some(json!([8, items[1], {"x": 1}])),
            _ => None,
        };

        if let Some(reply) = reply
            && ws.send(Message::Text(reply.to_string().into())).await.is_err()
        {
            break;
        }
    }
}
