/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public tradewire session crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod config;
pub mod error;
pub mod session;
pub mod supervisor;
pub mod ws;

pub use config::{SUBPROTOCOL, SessionConfig};
pub use error::{RemoteCallError, Result, SessionError};

// Re-export commonly used types from session
pub use session::{
    CallHandle,
    Disconnect,
    Listener,
    Session,
    SessionState,
    SessionTransition,
    TopicRegistry,
    WelcomeInfo,
};

// Re-export commonly used types from supervisor
pub use supervisor::{
    ReconnectPolicy,
    SessionClient,
    SessionHandler,
    SessionStatus,
    Supervisor,
};

// Re-export commonly used types from ws
pub use ws::{
    Endpoint,
    Frame,
    FrameSink,
    MessageType,
    PublishOptions,
    TransportEvent,
    WebSocketTransport,
};
