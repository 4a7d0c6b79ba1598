/*
[INPUT]:  Application requests issued outside the supervisor task
[OUTPUT]: Commands applied to the live session, replies via oneshot channels
[POS]:    Supervisor layer - cloneable handle onto the current session
[UPDATE]: When adding session operations exposed to application code
*/

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, SessionError};
use crate::session::pending::Completion;
use crate::session::{CallHandle, Listener, Session};
use crate::ws::PublishOptions;

type Reply = oneshot::Sender<Result<()>>;

#[derive(Debug)]
pub(crate) enum SessionCommand {
    Call {
        procedure: String,
        args: Vec<Value>,
        reply: Completion,
    },
    Subscribe {
        topic: String,
        listener: Listener,
        reply: Reply,
    },
    Unsubscribe {
        topic: String,
        listener: Option<Listener>,
        reply: Reply,
    },
    Publish {
        topic: String,
        payload: Value,
        options: PublishOptions,
        reply: Reply,
    },
    Prefix {
        prefix: String,
        uri: String,
        reply: Reply,
    },
}

impl SessionCommand {
    pub(crate) fn apply(self, session: &mut Session) {
        match self {
            SessionCommand::Call {
                procedure,
                args,
                reply,
            } => session.call_into(&procedure, args, reply),
            SessionCommand::Subscribe {
                topic,
                listener,
                reply,
            } => {
                let _ = reply.send(session.subscribe(&topic, listener));
            }
            SessionCommand::Unsubscribe {
                topic,
                listener,
                reply,
            } => {
                let _ = reply.send(session.unsubscribe(&topic, listener.as_ref()));
            }
            SessionCommand::Publish {
                topic,
                payload,
                options,
                reply,
            } => {
                let _ = reply.send(session.publish(&topic, payload, options));
            }
            SessionCommand::Prefix { prefix, uri, reply } => {
                let _ = reply.send(session.prefix(&prefix, &uri));
            }
        }
    }

    pub(crate) fn reject(self, err: SessionError) {
        match self {
            SessionCommand::Call { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            SessionCommand::Subscribe { reply, .. }
            | SessionCommand::Unsubscribe { reply, .. }
            | SessionCommand::Publish { reply, .. }
            | SessionCommand::Prefix { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

/// Handle for using whichever session the supervisor currently runs.
///
/// Every operation fails with `NotConnected` while no session is established.
#[derive(Debug, Clone)]
pub struct SessionClient {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionClient {
    pub(crate) fn new(cmd_tx: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Issue an RPC; returns immediately
    pub fn call(&self, procedure: &str, args: Vec<Value>) -> CallHandle {
        let (tx, rx) = oneshot::channel();
        let command = SessionCommand::Call {
            procedure: procedure.to_string(),
            args,
            reply: tx,
        };
        if let Err(mpsc::error::SendError(command)) = self.cmd_tx.send(command) {
            command.reject(SessionError::NotConnected);
        }
        CallHandle::new(rx)
    }

    pub async fn subscribe(&self, topic: &str, listener: Listener) -> Result<()> {
        self.request(|reply| SessionCommand::Subscribe {
            topic: topic.to_string(),
            listener,
            reply,
        })
        .await
    }

    pub async fn unsubscribe(&self, topic: &str, listener: Option<Listener>) -> Result<()> {
        self.request(|reply| SessionCommand::Unsubscribe {
            topic: topic.to_string(),
            listener,
            reply,
        })
        .await
    }

    pub async fn publish(&self, topic: &str, payload: Value, options: PublishOptions) -> Result<()> {
        options.validate()?;
        self.request(|reply| SessionCommand::Publish {
            topic: topic.to_string(),
            payload,
            options,
            reply,
        })
        .await
    }

    pub async fn prefix(&self, prefix: &str, uri: &str) -> Result<()> {
        self.request(|reply| SessionCommand::Prefix {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
            reply,
        })
        .await
    }

    async fn request(&self, build: impl FnOnce(Reply) -> SessionCommand) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| SessionError::NotConnected)?;
        rx.await.map_err(|_| SessionError::NotConnected)?
    }
}
