/*
[INPUT]:  Outgoing calls, inbound Call-Result / Call-Error frames, session teardown
[OUTPUT]: Unique call identifiers and awaitable CallHandles
[POS]:    Session layer - RPC request/response correlation
[UPDATE]: When changing call id generation or completion semantics
*/

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{RemoteCallError, Result, SessionError};

const CALL_ID_LEN: usize = 16;
const MAX_CALL_ID_ATTEMPTS: usize = 32;

pub(crate) type Completion = oneshot::Sender<Result<Value>>;

/// Awaitable result of one RPC.
///
/// Resolves to the call result, `RemoteCall` for a server error, or
/// `ConnectionLost` if the session closed first.
#[derive(Debug)]
pub struct CallHandle {
    rx: oneshot::Receiver<Result<Value>>,
}

impl CallHandle {
    pub(crate) fn new(rx: oneshot::Receiver<Result<Value>>) -> Self {
        Self { rx }
    }

    /// A handle that is already completed with `err`
    pub fn failed(err: SessionError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { rx }
    }
}

impl Future for CallHandle {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(SessionError::ConnectionLost(
                "call dropped without a response".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Outstanding calls keyed by call identifier
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: HashMap<String, Completion>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh call id and its handle
    pub fn register(&mut self) -> Result<(String, CallHandle)> {
        let call_id = self.allocate_id()?;
        let (tx, rx) = oneshot::channel();
        self.insert(call_id.clone(), tx);
        Ok((call_id, CallHandle::new(rx)))
    }

    /// Pick an id not used by any pending call
    pub(crate) fn allocate_id(&self) -> Result<String> {
        self.next_call_id(|| random_call_id(CALL_ID_LEN))
    }

    pub(crate) fn insert(&mut self, call_id: String, tx: Completion) {
        self.calls.insert(call_id, tx);
    }

    fn next_call_id(&self, mut generate: impl FnMut() -> String) -> Result<String> {
        for _ in 0..MAX_CALL_ID_ATTEMPTS {
            let candidate = generate();
            if !self.calls.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(SessionError::CallIdExhausted {
            attempts: MAX_CALL_ID_ATTEMPTS,
        })
    }

    /// Complete a call with its result. Returns false for unknown ids.
    pub fn resolve(&mut self, call_id: &str, result: Value) -> bool {
        self.complete(call_id, Ok(result))
    }

    /// Fail a call with a server error. Returns false for unknown ids.
    pub fn reject(&mut self, call_id: &str, error: RemoteCallError) -> bool {
        self.complete(call_id, Err(SessionError::RemoteCall(error)))
    }

    /// Fail a call locally, e.g. when its frame could not be sent
    pub(crate) fn fail(&mut self, call_id: &str, err: SessionError) -> bool {
        self.complete(call_id, Err(err))
    }

    /// Fail every pending call and empty the table
    pub fn reject_all(&mut self, reason: &str) -> usize {
        let count = self.calls.len();
        for (_, tx) in self.calls.drain() {
            let _ = tx.send(Err(SessionError::ConnectionLost(reason.to_string())));
        }
        count
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.calls.contains_key(call_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn complete(&mut self, call_id: &str, outcome: Result<Value>) -> bool {
        match self.calls.remove(call_id) {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    debug!(call_id, "call handle dropped before completion");
                }
                true
            }
            None => {
                debug!(call_id, "dropping response for unknown call id");
                false
            }
        }
    }
}

fn random_call_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
