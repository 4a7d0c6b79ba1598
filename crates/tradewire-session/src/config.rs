/*
[INPUT]:  Caller-supplied connect options (programmatic or deserialized)
[OUTPUT]: Validated session/supervisor configuration
[POS]:    Configuration layer - shared by Transport, Session and Supervisor
[UPDATE]: When adding new connect options
*/

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SessionError};

/// Sub-protocol token announced during the WebSocket handshake
pub const SUBPROTOCOL: &str = "wamp";

/// Connect options for one supervised connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Reconnect attempts allowed after a successful connect was lost
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before each reconnect attempt, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Accept servers that do not echo the sub-protocol token
    #[serde(default)]
    pub skip_subprotocol_check: bool,
    /// Do not announce the sub-protocol token
    #[serde(default)]
    pub skip_subprotocol_announce: bool,
    /// Log every inbound and outbound frame at trace level
    #[serde(default)]
    pub trace_frames: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            skip_subprotocol_check: false,
            skip_subprotocol_announce: false,
            trace_frames: false,
        }
    }
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    5000
}

impl SessionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry_delay_ms == 0 {
            return Err(SessionError::Config(
                "retry_delay_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
