/*
[INPUT]:  Error sources (transport, wire decoding, session state, table misuse, remote calls)
[OUTPUT]: Structured error types with locality and fatality hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or changing propagation policy
*/

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Error reported by the server for one call (Call-Error frame)
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCallError {
    pub uri: String,
    pub desc: String,
    pub detail: Option<Value>,
}

impl fmt::Display for RemoteCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.desc, self.uri)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// Main error type for the session core
#[derive(Error, Debug)]
pub enum SessionError {
    /// No usable WebSocket implementation for this endpoint or runtime
    #[error("WebSocket unsupported: {0}")]
    Unsupported(String),

    /// Peer broke the protocol (duplicate welcome, malformed frame, ...)
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Operation attempted while the session is not established
    #[error("Session not connected")]
    NotConnected,

    /// Listener already registered for the topic
    #[error("Listener already subscribed to topic {topic}")]
    DuplicateListener { topic: String },

    /// Topic or listener not subscribed
    #[error("Not subscribed to topic {topic}")]
    NotSubscribed { topic: String },

    /// Malformed publish options or call arguments
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Server answered a call with Call-Error
    #[error("Remote call failed: {0}")]
    RemoteCall(RemoteCallError),

    /// Session closed while the call was in flight
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Could not find a free call identifier
    #[error("Call identifier space exhausted after {attempts} attempts")]
    CallIdExhausted { attempts: usize },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket I/O error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Check if the error is caused by the caller and only concerns that call
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            SessionError::NotConnected
                | SessionError::DuplicateListener { .. }
                | SessionError::NotSubscribed { .. }
                | SessionError::InvalidArgument(_)
                | SessionError::CallIdExhausted { .. }
        )
    }

    /// Check if the error tears the connection down
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Unsupported(_) | SessionError::ProtocolViolation(_)
        )
    }

    /// Get the server-reported error, if this is one
    pub fn remote(&self) -> Option<&RemoteCallError> {
        match self {
            SessionError::RemoteCall(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        SessionError::ProtocolViolation(message.into())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SessionError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SessionError::WebSocket(err.to_string())
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
