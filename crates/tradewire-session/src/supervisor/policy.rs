/*
[INPUT]:  Session disconnect classifications and connect/retry configuration
[OUTPUT]: Application-facing connection status with reconnect decision
[POS]:    Supervisor layer - retry bookkeeping (no I/O, no timers)
[UPDATE]: When changing retry budget rules or status reporting
*/

use std::fmt;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::session::Disconnect;

/// Connection status reported to the application on every hangup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Connection closed properly; no reconnect
    Closed { reason: String },
    /// Endpoint or runtime has no usable WebSocket; no reconnect
    Unsupported { reason: String },
    /// Server broke the protocol; no reconnect
    ProtocolViolation { reason: String },
    /// First connection could not be established; no reconnect
    Unreachable { reason: String },
    /// Retry budget used up
    RetriesExceeded { max_retries: u32 },
    /// Reconnect after losing an unreachable endpoint
    UnreachableScheduledReconnect {
        delay: Duration,
        retries: u32,
        max_retries: u32,
    },
    /// Reconnect after an established connection was lost
    LostScheduledReconnect {
        delay: Duration,
        retries: u32,
        max_retries: u32,
    },
}

impl SessionStatus {
    /// Delay before the next attempt, None when terminal
    pub fn reconnect_delay(&self) -> Option<Duration> {
        match self {
            SessionStatus::UnreachableScheduledReconnect { delay, .. }
            | SessionStatus::LostScheduledReconnect { delay, .. } => Some(*delay),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.reconnect_delay().is_none()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Closed { reason } => {
                write!(f, "Connection was closed properly [{reason}]")
            }
            SessionStatus::Unsupported { reason } => {
                write!(f, "WebSocket is not supported here [{reason}]")
            }
            SessionStatus::ProtocolViolation { reason } => {
                write!(f, "Connection torn down on protocol violation [{reason}]")
            }
            SessionStatus::Unreachable { reason } => {
                write!(f, "Connection could not be established [{reason}]")
            }
            SessionStatus::RetriesExceeded { max_retries } => {
                write!(f, "Number of connection retries exceeded ({max_retries})")
            }
            SessionStatus::UnreachableScheduledReconnect {
                delay,
                retries,
                max_retries,
            } => write!(
                f,
                "Connection unreachable - scheduled reconnect in {delay:?} - attempt {retries} of {max_retries}"
            ),
            SessionStatus::LostScheduledReconnect {
                delay,
                retries,
                max_retries,
            } => write!(
                f,
                "Connection lost - scheduled reconnect in {delay:?} - attempt {retries} of {max_retries}"
            ),
        }
    }
}

/// Retry counters for one supervised endpoint
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_retries: u32,
    retry_delay: Duration,
    connects: u64,
    retry_count: u32,
}

impl ReconnectPolicy {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            connects: 0,
            retry_count: 0,
        }
    }

    /// Total successful connects
    pub fn connects(&self) -> u64 {
        self.connects
    }

    /// Retries since the last successful connect
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn on_established(&mut self) {
        self.connects += 1;
        self.retry_count = 0;
    }

    pub fn classify(&mut self, disconnect: &Disconnect) -> SessionStatus {
        match disconnect {
            Disconnect::Closed { reason } => SessionStatus::Closed {
                reason: reason.clone(),
            },
            Disconnect::Unsupported { reason } => SessionStatus::Unsupported {
                reason: reason.clone(),
            },
            Disconnect::ProtocolViolation { reason } => SessionStatus::ProtocolViolation {
                reason: reason.clone(),
            },
            Disconnect::Unreachable { reason } if self.connects == 0 => {
                SessionStatus::Unreachable {
                    reason: reason.clone(),
                }
            }
            Disconnect::Unreachable { .. } => {
                self.next_retry(|delay, retries, max_retries| {
                    SessionStatus::UnreachableScheduledReconnect {
                        delay,
                        retries,
                        max_retries,
                    }
                })
            }
            Disconnect::Lost { .. } => self.next_retry(|delay, retries, max_retries| {
                SessionStatus::LostScheduledReconnect {
                    delay,
                    retries,
                    max_retries,
                }
            }),
        }
    }

    fn next_retry(
        &mut self,
        scheduled: impl FnOnce(Duration, u32, u32) -> SessionStatus,
    ) -> SessionStatus {
        self.retry_count = self.retry_count.saturating_add(1);
        if self.retry_count <= self.max_retries {
            scheduled(self.retry_delay, self.retry_count, self.max_retries)
        } else {
            SessionStatus::RetriesExceeded {
                max_retries: self.max_retries,
            }
        }
    }
}
