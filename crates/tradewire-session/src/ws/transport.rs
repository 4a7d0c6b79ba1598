/*
[INPUT]:  Endpoint (ws/wss URL, sub-protocol announce/enforce flags) and outbound text frames
[OUTPUT]: Ordered transport lifecycle events (opened / message / closed) via channel
[POS]:    WebSocket layer - single duplex connection, no retry logic
[UPDATE]: When changing handshake headers or socket pump behavior
*/

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info};
use url::Url;

use crate::config::SUBPROTOCOL;
use crate::error::{Result, SessionError};

/// Connection target, immutable for the life of one transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    announce_subprotocol: bool,
    enforce_subprotocol: bool,
}

impl Endpoint {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            announce_subprotocol: true,
            enforce_subprotocol: true,
        }
    }

    pub fn parse(url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    pub fn with_subprotocol_announce(mut self, announce: bool) -> Self {
        self.announce_subprotocol = announce;
        self
    }

    /// When false, a server that ignores the announced token is connected
    /// to again without announcing it
    pub fn with_subprotocol_enforced(mut self, enforce: bool) -> Self {
        self.enforce_subprotocol = enforce;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn announces_subprotocol(&self) -> bool {
        self.announce_subprotocol
    }

    pub fn enforces_subprotocol(&self) -> bool {
        self.enforce_subprotocol
    }
}

/// Lifecycle events, delivered in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake done; `protocol` is the sub-protocol echoed by the server
    Opened { protocol: Option<String> },
    /// One received text frame
    Message(String),
    /// Handshake refused because the sub-protocol negotiation failed;
    /// nothing follows
    SubprotocolMismatch { reason: String },
    /// Connection gone (or never established); the last event otherwise
    Closed {
        code: Option<u16>,
        reason: String,
        was_clean: bool,
    },
}

/// Outbound half of a transport as seen by the session
pub trait FrameSink: Send {
    /// Queue one serialized frame
    fn send_text(&mut self, text: String) -> Result<()>;

    /// Start a normal close; a `Closed` event follows
    fn close(&mut self, reason: &str);
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close(String),
}

/// WebSocket transport backed by tokio-tungstenite
#[derive(Debug)]
pub struct WebSocketTransport {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
}

impl WebSocketTransport {
    /// Start connecting to `endpoint`.
    ///
    /// Connection failures are not returned here: they arrive as a
    /// `Closed { was_clean: false }` event without a preceding `Opened`.
    pub fn open(endpoint: &Endpoint) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        match endpoint.url().scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(SessionError::Unsupported(format!(
                    "scheme '{other}' is not a WebSocket scheme"
                )));
            }
        }

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SessionError::Unsupported(
                "no Tokio runtime available for the socket task".to_string(),
            ));
        }

        let request = build_request(endpoint)?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        info!(
            url = %endpoint.url(),
            announce_subprotocol = endpoint.announces_subprotocol(),
            enforce_subprotocol = endpoint.enforces_subprotocol(),
            "ws connecting"
        );
        tokio::spawn(run_socket(endpoint.clone(), request, event_tx, outbound_rx));

        Ok((Self { outbound_tx }, event_rx))
    }
}

impl FrameSink for WebSocketTransport {
    fn send_text(&mut self, text: String) -> Result<()> {
        self.outbound_tx
            .send(Outbound::Text(text))
            .map_err(|_| SessionError::NotConnected)
    }

    fn close(&mut self, reason: &str) {
        let _ = self.outbound_tx.send(Outbound::Close(reason.to_string()));
    }
}

fn build_request(endpoint: &Endpoint) -> Result<Request> {
    let mut request = endpoint.url().as_str().into_client_request()?;
    if endpoint.announces_subprotocol() {
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
    }
    Ok(request)
}

fn is_subprotocol_error(err: &WsError) -> bool {
    matches!(
        err,
        WsError::Protocol(ProtocolError::SecWebSocketSubProtocolError(_))
    )
}

async fn run_socket(
    endpoint: Endpoint,
    request: Request,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let mut connected = connect_async(request).await;
    let retry_unannounced = endpoint.announces_subprotocol()
        && !endpoint.enforces_subprotocol()
        && matches!(&connected, Err(err) if is_subprotocol_error(err));
    if retry_unannounced {
        debug!("server ignored sub-protocol, reconnecting without announcing it");
        match build_request(&endpoint.clone().with_subprotocol_announce(false)) {
            Ok(request) => connected = connect_async(request).await,
            Err(err) => {
                let _ = event_tx.send(TransportEvent::Closed {
                    code: None,
                    reason: err.to_string(),
                    was_clean: false,
                });
                return;
            }
        }
    }

    let (ws_stream, response) = match connected {
        Ok(pair) => pair,
        Err(err) if is_subprotocol_error(&err) => {
            debug!(error = %err, "ws sub-protocol negotiation failed");
            let _ = event_tx.send(TransportEvent::SubprotocolMismatch {
                reason: err.to_string(),
            });
            return;
        }
        Err(err) => {
            debug!(error = %err, "ws connect failed");
            let _ = event_tx.send(TransportEvent::Closed {
                code: None,
                reason: err.to_string(),
                was_clean: false,
            });
            return;
        }
    };

    let protocol = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if event_tx.send(TransportEvent::Opened { protocol }).is_err() {
        return;
    }

    let (mut write, mut read) = ws_stream.split();

    let closed = loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Text(text)) => {
                        if let Err(err) = write.send(WsMessage::Text(text.into())).await {
                            break TransportEvent::Closed {
                                code: None,
                                reason: err.to_string(),
                                was_clean: false,
                            };
                        }
                    }
                    Some(Outbound::Close(reason)) => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: reason.clone().into(),
                        };
                        let _ = write.send(WsMessage::Close(Some(frame))).await;
                        break TransportEvent::Closed {
                            code: Some(u16::from(CloseCode::Normal)),
                            reason,
                            was_clean: true,
                        };
                    }
                    None => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break TransportEvent::Closed {
                            code: Some(u16::from(CloseCode::Normal)),
                            reason: "transport dropped".to_string(),
                            was_clean: true,
                        };
                    }
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        if event_tx.send(TransportEvent::Message(text.to_string())).is_err() {
                            let _ = write.send(WsMessage::Close(None)).await;
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => {
                            if event_tx.send(TransportEvent::Message(text)).is_err() {
                                let _ = write.send(WsMessage::Close(None)).await;
                                return;
                            }
                        }
                        Err(_) => debug!(bytes = bytes.len(), "ws dropping non-utf8 binary frame"),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                            None => (None, String::new()),
                        };
                        break TransportEvent::Closed {
                            code,
                            reason,
                            was_clean: true,
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        break TransportEvent::Closed {
                            code: None,
                            reason: err.to_string(),
                            was_clean: false,
                        };
                    }
                    None => {
                        break TransportEvent::Closed {
                            code: None,
                            reason: "stream ended".to_string(),
                            was_clean: false,
                        };
                    }
                }
            }
        }
    };

    debug!(event = ?closed, "ws closed");
    let _ = event_tx.send(closed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_defaults_to_announcing() {
        let endpoint = Endpoint::parse("ws://127.0.0.1:9000/ws").unwrap();
        assert!(endpoint.announces_subprotocol());
        assert!(!endpoint.with_subprotocol_announce(false).announces_subprotocol());
    }

    #[test]
    fn request_carries_subprotocol_header() {
        let endpoint = Endpoint::parse("ws://127.0.0.1:9000/ws").unwrap();
        let request = build_request(&endpoint).unwrap();
        assert_eq!(
            request
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|v| v.to_str().ok()),
            Some(SUBPROTOCOL)
        );

        let silent = build_request(&endpoint.with_subprotocol_announce(false)).unwrap();
        assert!(silent.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());
    }

    #[test]
    fn endpoint_enforces_subprotocol_by_default() {
        let endpoint = Endpoint::parse("ws://127.0.0.1:9000/ws").unwrap();
        assert!(endpoint.enforces_subprotocol());
        let relaxed = endpoint.with_subprotocol_enforced(false);
        assert!(!relaxed.enforces_subprotocol());
        assert!(relaxed.announces_subprotocol());
    }

    #[tokio::test]
    async fn open_rejects_non_websocket_scheme() {
        let endpoint = Endpoint::parse("http://127.0.0.1:9000/").unwrap();
        assert!(matches!(
            WebSocketTransport::open(&endpoint),
            Err(SessionError::Unsupported(_))
        ));
    }

    #[test]
    fn open_requires_runtime() {
        let endpoint = Endpoint::parse("ws://127.0.0.1:9000/").unwrap();
        assert!(matches!(
            WebSocketTransport::open(&endpoint),
            Err(SessionError::Unsupported(_))
        ));
    }
}
