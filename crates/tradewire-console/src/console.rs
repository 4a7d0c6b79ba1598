/*
[INPUT]:  Console profile and supervised session callbacks
[OUTPUT]: Declared prefixes, subscriptions, calls and publishes per session; structured logs
[POS]:    Application layer - headless consumer of the session core
[UPDATE]: When changing what the console does on connect or hangup
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};
use tradewire_session::{Listener, Session, SessionHandler, SessionStatus, WelcomeInfo};

use crate::profile::ConsoleProfile;

/// Replays the profile's startup actions on every new session
#[derive(Debug)]
pub struct ConsoleHandler {
    profile: ConsoleProfile,
    events_seen: Arc<AtomicU64>,
    sessions: u64,
}

impl ConsoleHandler {
    pub fn new(profile: ConsoleProfile) -> Self {
        Self {
            profile,
            events_seen: Arc::new(AtomicU64::new(0)),
            sessions: 0,
        }
    }

    pub fn events_seen(&self) -> u64 {
        self.events_seen.load(Ordering::Relaxed)
    }

    pub fn sessions(&self) -> u64 {
        self.sessions
    }

    fn event_listener(&self) -> Listener {
        let events_seen = self.events_seen.clone();
        Listener::new(move |topic, payload| {
            let count = events_seen.fetch_add(1, Ordering::Relaxed) + 1;
            info!(topic, event_index = count, payload = %payload, "event");
        })
    }
}

impl SessionHandler for ConsoleHandler {
    fn on_connect(&mut self, session: &mut Session, welcome: &WelcomeInfo) {
        self.sessions += 1;
        info!(
            session_id = %welcome.session_id,
            server = %welcome.server_ident,
            sessions = self.sessions,
            "console connected"
        );

        for prefix in &self.profile.prefixes {
            if let Err(err) = session.prefix(&prefix.prefix, &prefix.uri) {
                warn!(prefix = %prefix.prefix, error = %err, "prefix declaration failed");
            }
        }

        let listener = self.event_listener();
        for topic in &self.profile.subscriptions {
            match session.subscribe(topic, listener.clone()) {
                Ok(()) => info!(%topic, "subscribed"),
                Err(err) => warn!(%topic, error = %err, "subscribe failed"),
            }
        }

        for call in &self.profile.calls {
            let handle = match session.call(&call.procedure, call.args.clone()) {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(procedure = %call.procedure, error = %err, "call not sent");
                    continue;
                }
            };
            let procedure = call.procedure.clone();
            tokio::spawn(async move {
                match handle.await {
                    Ok(result) => info!(%procedure, %result, "call result"),
                    Err(err) => warn!(%procedure, error = %err, "call failed"),
                }
            });
        }

        for publish in &self.profile.publishes {
            let sent = publish.options().and_then(|options| {
                session.publish(&publish.topic, publish.payload.clone(), options)
            });
            if let Err(err) = sent {
                warn!(topic = %publish.topic, error = %err, "publish failed");
            }
        }
    }

    fn on_hangup(&mut self, status: &SessionStatus) -> bool {
        if status.is_terminal() {
            info!(%status, events_seen = self.events_seen(), "console hangup");
        } else {
            warn!(%status, "console connection interrupted");
        }
        false
    }
}
