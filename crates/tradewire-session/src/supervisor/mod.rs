/*
[INPUT]:  Endpoint, connect options, application handler
[OUTPUT]: Reconnecting supervised sessions and a client handle onto them
[POS]:    Supervisor layer - connection lifecycle above the session core
[UPDATE]: When changing retry policy or the application callback surface
*/

pub mod client;
pub mod policy;
pub mod runner;

pub use client::SessionClient;
pub use policy::{ReconnectPolicy, SessionStatus};
pub use runner::{SessionHandler, Supervisor};
