/*
[INPUT]:  Endpoint, SessionConfig, application SessionHandler, shutdown token
[OUTPUT]: Supervised sessions (fresh per connect), status callbacks, terminal status
[POS]:    Supervisor layer - connect / drive / classify / reconnect loop
[UPDATE]: When changing reconnect scheduling or shutdown semantics
*/

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{SessionClient, SessionCommand};
use super::policy::{ReconnectPolicy, SessionStatus};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::session::{Disconnect, Session, SessionState, SessionTransition, WelcomeInfo};
use crate::ws::{Endpoint, TransportEvent, WebSocketTransport};

const SHUTDOWN_REASON: &str = "shutdown requested";

/// Application callbacks for a supervised connection
pub trait SessionHandler: Send {
    /// Called once per established session; the session is brand new, so
    /// prefixes and subscriptions must be declared again here
    fn on_connect(&mut self, session: &mut Session, welcome: &WelcomeInfo);

    /// Called on every hangup. Returning true vetoes a scheduled reconnect.
    fn on_hangup(&mut self, status: &SessionStatus) -> bool {
        let _ = status;
        false
    }
}

/// Owns the reconnect loop for one endpoint
#[derive(Debug)]
pub struct Supervisor {
    endpoint: Endpoint,
    config: SessionConfig,
    policy: ReconnectPolicy,
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
}

impl Supervisor {
    pub fn new(endpoint: Endpoint, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let announce = endpoint.announces_subprotocol() && !config.skip_subprotocol_announce;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        Ok(Self {
            endpoint: endpoint
                .with_subprotocol_announce(announce)
                .with_subprotocol_enforced(!config.skip_subprotocol_check),
            policy: ReconnectPolicy::new(&config),
            config,
            cmd_tx,
            cmd_rx,
        })
    }

    /// Handle usable from other tasks while `run` is active
    pub fn client(&self) -> SessionClient {
        SessionClient::new(self.cmd_tx.clone())
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Connect and keep reconnecting per policy; returns the terminal status
    pub async fn run<H: SessionHandler>(
        &mut self,
        handler: &mut H,
        shutdown: CancellationToken,
    ) -> SessionStatus {
        loop {
            let disconnect = self.run_session(handler, &shutdown).await;
            let status = self.policy.classify(&disconnect);
            let vetoed = handler.on_hangup(&status);

            let Some(delay) = status.reconnect_delay() else {
                info!(%status, "supervisor stopped");
                return status;
            };
            if vetoed {
                info!(%status, "reconnect vetoed by handler");
                return status;
            }

            warn!(%status, connects = self.policy.connects(), "connection down");
            if !self.wait_for_retry(delay, &shutdown).await {
                let status = SessionStatus::Closed {
                    reason: SHUTDOWN_REASON.to_string(),
                };
                handler.on_hangup(&status);
                return status;
            }
        }
    }

    async fn run_session<H: SessionHandler>(
        &mut self,
        handler: &mut H,
        shutdown: &CancellationToken,
    ) -> Disconnect {
        if shutdown.is_cancelled() {
            return Disconnect::Closed {
                reason: SHUTDOWN_REASON.to_string(),
            };
        }

        let (transport, mut events) = match WebSocketTransport::open(&self.endpoint) {
            Ok(pair) => pair,
            Err(SessionError::Unsupported(reason)) => return Disconnect::Unsupported { reason },
            Err(err) => {
                return Disconnect::Unreachable {
                    reason: err.to_string(),
                };
            }
        };
        let mut session = Session::new(self.config.clone(), Box::new(transport));
        let mut closing = false;

        loop {
            tokio::select! {
                _ = shutdown.cancelled(), if !closing => {
                    closing = true;
                    if session.state() == SessionState::Connecting {
                        return Disconnect::Closed { reason: SHUTDOWN_REASON.to_string() };
                    }
                    debug!("closing session on shutdown");
                    session.close();
                }
                Some(command) = self.cmd_rx.recv() => {
                    command.apply(&mut session);
                }
                event = events.recv() => {
                    let event = event.unwrap_or_else(|| TransportEvent::Closed {
                        code: None,
                        reason: "transport task ended".to_string(),
                        was_clean: false,
                    });
                    match session.handle_event(event) {
                        Some(SessionTransition::Established(welcome)) => {
                            self.policy.on_established();
                            handler.on_connect(&mut session, &welcome);
                        }
                        Some(SessionTransition::Closed(disconnect)) => return disconnect,
                        None => {}
                    }
                }
            }
        }
    }

    /// Sleep before reconnecting; false when shutdown interrupted the wait
    async fn wait_for_retry(&mut self, delay: Duration, shutdown: &CancellationToken) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return false,
                _ = &mut sleep => return true,
                Some(command) = self.cmd_rx.recv() => {
                    command.reject(SessionError::NotConnected);
                }
            }
        }
    }
}
