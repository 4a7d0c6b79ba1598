/*
[INPUT]:  Transport events and application calls (call / subscribe / unsubscribe / publish / prefix)
[OUTPUT]: Outbound frames, completed CallHandles, listener dispatch, state transitions
[POS]:    Session layer - protocol state machine composing registry and tables
[UPDATE]: When changing handshake rules, frame routing, or close classification
*/

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use super::pending::{CallHandle, Completion, PendingCalls};
use super::subscription::{Listener, SubscriptionTable};
use super::topic::TopicRegistry;
use crate::config::{SUBPROTOCOL, SessionConfig};
use crate::error::{RemoteCallError, Result, SessionError};
use crate::ws::{Frame, FrameSink, PublishOptions, TransportEvent};

const PROTOCOL_VERSION: u64 = 1;
const RAW_LOG_MAX_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingWelcome,
    Established,
    Closed,
}

/// Server greeting recorded when the session is established
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeInfo {
    pub session_id: String,
    pub protocol_version: u64,
    pub server_ident: String,
}

/// Why a session reached Closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// Clean close, or close requested locally
    Closed { reason: String },
    /// Unclean close after the session was established
    Lost { reason: String },
    /// Unclean close before the session was established
    Unreachable { reason: String },
    /// Transport could not be created at all
    Unsupported { reason: String },
    /// Peer broke the protocol; connection torn down
    ProtocolViolation { reason: String },
}

impl Disconnect {
    pub fn reason(&self) -> &str {
        match self {
            Disconnect::Closed { reason }
            | Disconnect::Lost { reason }
            | Disconnect::Unreachable { reason }
            | Disconnect::Unsupported { reason }
            | Disconnect::ProtocolViolation { reason } => reason,
        }
    }
}

/// State change reported back to whoever drives the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    Established(WelcomeInfo),
    Closed(Disconnect),
}

/// One protocol session over one transport.
///
/// Not reusable: once Closed, build a new session on a new transport.
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    sink: Box<dyn FrameSink>,
    topics: TopicRegistry,
    pending: PendingCalls,
    subscriptions: SubscriptionTable,
    welcome: Option<WelcomeInfo>,
    close_requested: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("welcome", &self.welcome)
            .field("pending_calls", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(config: SessionConfig, sink: Box<dyn FrameSink>) -> Self {
        Self {
            config,
            state: SessionState::Connecting,
            sink,
            topics: TopicRegistry::new(),
            pending: PendingCalls::new(),
            subscriptions: SubscriptionTable::new(),
            welcome: None,
            close_requested: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    pub fn welcome(&self) -> Option<&WelcomeInfo> {
        self.welcome.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.welcome.as_ref().map(|w| w.session_id.as_str())
    }

    pub fn resolve(&self, identifier: &str, permissive: bool) -> Option<String> {
        self.topics.resolve(identifier, permissive)
    }

    pub fn shrink(&self, identifier: &str, permissive: bool) -> Option<String> {
        self.topics.shrink(identifier, permissive)
    }

    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscriptions.topics().map(str::to_string).collect();
        topics.sort();
        topics
    }

    /// Feed one transport event; returns the transition it caused, if any
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<SessionTransition> {
        if self.state == SessionState::Closed {
            debug!(?event, "ignoring transport event on closed session");
            return None;
        }

        match event {
            TransportEvent::Opened { protocol } => self.on_open(protocol),
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::SubprotocolMismatch { reason } => Some(self.fail_protocol(format!(
                "server does not speak {SUBPROTOCOL}: {reason}"
            ))),
            TransportEvent::Closed {
                code,
                reason,
                was_clean,
            } => {
                debug!(?code, %reason, was_clean, state = ?self.state, "transport closed");
                let disconnect = if self.close_requested {
                    Disconnect::Closed { reason }
                } else if self.state == SessionState::Established {
                    if was_clean {
                        Disconnect::Closed { reason }
                    } else {
                        Disconnect::Lost { reason }
                    }
                } else {
                    Disconnect::Unreachable { reason }
                };
                Some(self.enter_closed(disconnect))
            }
        }
    }

    fn on_open(&mut self, protocol: Option<String>) -> Option<SessionTransition> {
        if self.state != SessionState::Connecting {
            debug!(state = ?self.state, "ignoring duplicate transport open");
            return None;
        }

        if !self.config.skip_subprotocol_check && protocol.as_deref() != Some(SUBPROTOCOL) {
            return Some(self.fail_protocol(format!(
                "server does not speak {SUBPROTOCOL} (negotiated {protocol:?})"
            )));
        }

        self.state = SessionState::AwaitingWelcome;
        None
    }

    fn on_message(&mut self, text: &str) -> Option<SessionTransition> {
        if self.config.trace_frames {
            trace!(direction = "in", frame = %truncate_for_log(text, RAW_LOG_MAX_BYTES), "wamp frame");
        }

        match Frame::decode(text) {
            Ok(frame) => self.on_frame(frame),
            Err(err) => Some(self.fail_protocol(err.to_string())),
        }
    }

    fn on_frame(&mut self, frame: Frame) -> Option<SessionTransition> {
        if let Frame::Welcome {
            session_id,
            protocol_version,
            server_ident,
        } = frame
        {
            if self.welcome.is_some() {
                return Some(self.fail_protocol("welcome message received more than once"));
            }
            if protocol_version != PROTOCOL_VERSION {
                warn!(protocol_version, "server announced unexpected protocol version");
            }

            let welcome = WelcomeInfo {
                session_id,
                protocol_version,
                server_ident,
            };
            info!(
                session_id = %welcome.session_id,
                protocol_version = welcome.protocol_version,
                server = %welcome.server_ident,
                "session established"
            );
            self.state = SessionState::Established;
            self.welcome = Some(welcome.clone());
            return Some(SessionTransition::Established(welcome));
        }

        if self.state != SessionState::Established {
            return Some(self.fail_protocol(format!(
                "{} frame received before welcome",
                frame.message_type()
            )));
        }

        match frame {
            Frame::CallResult { call_id, result } => {
                self.pending.resolve(&call_id, result);
                None
            }
            Frame::CallError {
                call_id,
                error_uri,
                error_desc,
                error_detail,
            } => {
                self.pending.reject(
                    &call_id,
                    RemoteCallError {
                        uri: error_uri,
                        desc: error_desc,
                        detail: error_detail,
                    },
                );
                None
            }
            Frame::Event { topic, payload } => {
                let Some(resolved) = self.topics.resolve(&topic, true) else {
                    debug!(%topic, "dropping event for unresolvable topic");
                    return None;
                };
                if self.subscriptions.dispatch(&resolved, &payload) == 0 {
                    debug!(topic = %resolved, "dropping event for unsubscribed topic");
                }
                None
            }
            other => Some(self.fail_protocol(format!(
                "unexpected {} frame from server",
                other.message_type()
            ))),
        }
    }

    fn fail_protocol(&mut self, message: impl Into<String>) -> SessionTransition {
        let reason = message.into();
        warn!(%reason, "protocol violation, closing connection");
        self.sink.close(&reason);
        self.enter_closed(Disconnect::ProtocolViolation { reason })
    }

    fn enter_closed(&mut self, disconnect: Disconnect) -> SessionTransition {
        self.state = SessionState::Closed;
        let rejected = self.pending.reject_all(disconnect.reason());
        if rejected > 0 {
            debug!(rejected, "rejected in-flight calls on close");
        }
        self.subscriptions.clear();
        info!(?disconnect, "session closed");
        SessionTransition::Closed(disconnect)
    }

    fn ensure_established(&self) -> Result<()> {
        if self.is_established() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    fn send(&mut self, frame: &Frame) -> Result<()> {
        let text = frame.encode();
        if self.config.trace_frames {
            trace!(direction = "out", frame = %truncate_for_log(&text, RAW_LOG_MAX_BYTES), "wamp frame");
        }
        self.sink.send_text(text)
    }

    /// Issue an RPC; the handle completes when the matching response arrives
    pub fn call(&mut self, procedure: &str, args: Vec<Value>) -> Result<CallHandle> {
        self.ensure_established()?;
        let (tx, rx) = oneshot::channel();
        self.call_into(procedure, args, tx);
        Ok(CallHandle::new(rx))
    }

    /// Issue an RPC whose outcome, including local failures, goes to `tx`
    pub(crate) fn call_into(&mut self, procedure: &str, args: Vec<Value>, tx: Completion) {
        let call_id = match self
            .ensure_established()
            .and_then(|_| self.pending.allocate_id())
        {
            Ok(call_id) => call_id,
            Err(err) => {
                let _ = tx.send(Err(err));
                return;
            }
        };
        self.pending.insert(call_id.clone(), tx);

        let frame = Frame::Call {
            call_id: call_id.clone(),
            procedure: self.wire_identifier(procedure),
            args,
        };
        if let Err(err) = self.send(&frame) {
            self.pending.fail(&call_id, err);
        }
    }

    pub fn subscribe(&mut self, topic: &str, listener: Listener) -> Result<()> {
        self.ensure_established()?;
        let resolved = self.full_identifier(topic);
        if self.subscriptions.subscribe(&resolved, listener)? {
            let frame = Frame::Subscribe {
                topic: self.wire_identifier(&resolved),
            };
            if let Err(err) = self.send(&frame) {
                let _ = self.subscriptions.unsubscribe(&resolved, None);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Remove `listener` from `topic`, or every listener when None
    pub fn unsubscribe(&mut self, topic: &str, listener: Option<&Listener>) -> Result<()> {
        self.ensure_established()?;
        let resolved = self.full_identifier(topic);
        if self.subscriptions.unsubscribe(&resolved, listener)? {
            let frame = Frame::Unsubscribe {
                topic: self.wire_identifier(&resolved),
            };
            self.send(&frame)?;
        }
        Ok(())
    }

    /// Fire-and-forget event publication
    pub fn publish(&mut self, topic: &str, payload: Value, options: PublishOptions) -> Result<()> {
        self.ensure_established()?;
        options.validate()?;
        let frame = Frame::Publish {
            topic: self.wire_identifier(topic),
            payload,
            options,
        };
        self.send(&frame)
    }

    /// Register a compression prefix locally and announce it to the server
    pub fn prefix(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.ensure_established()?;
        self.topics.set(prefix, uri);
        self.send(&Frame::Prefix {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        })
    }

    /// Ask the transport to close; the Closed transition follows its close event
    pub fn close(&mut self) {
        if self.state == SessionState::Closed || self.close_requested {
            return;
        }
        self.close_requested = true;
        self.sink.close("session closed by client");
    }

    fn full_identifier(&self, identifier: &str) -> String {
        self.topics
            .resolve(identifier, true)
            .unwrap_or_else(|| identifier.to_string())
    }

    fn wire_identifier(&self, identifier: &str) -> String {
        let full = self.full_identifier(identifier);
        self.topics.shrink(&full, true).unwrap_or(full)
    }
}

fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}
