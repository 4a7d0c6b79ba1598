/*
[INPUT]:  Listener registrations per resolved topic and inbound event payloads
[OUTPUT]: Wire subscribe/unsubscribe decisions and ordered listener dispatch
[POS]:    Session layer - topic subscription multiplexing
[UPDATE]: When changing listener identity or dispatch isolation
*/

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::error::{Result, SessionError};

type ListenerFn = dyn Fn(&str, &Value) + Send + Sync;

/// Event callback; identity is the shared allocation, so clone a listener
/// to unsubscribe it later.
#[derive(Clone)]
pub struct Listener(Arc<ListenerFn>);

impl Listener {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    pub fn call(&self, topic: &str, payload: &Value) {
        (self.0)(topic, payload)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0))
    }
}

/// Resolved topic -> listeners in registration order
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    topics: HashMap<String, Vec<Listener>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `listener`; returns true when the topic had no listeners before
    pub fn subscribe(&mut self, topic: &str, listener: Listener) -> Result<bool> {
        match self.topics.get_mut(topic) {
            Some(listeners) => {
                if listeners.contains(&listener) {
                    return Err(SessionError::DuplicateListener {
                        topic: topic.to_string(),
                    });
                }
                listeners.push(listener);
                Ok(false)
            }
            None => {
                self.topics.insert(topic.to_string(), vec![listener]);
                Ok(true)
            }
        }
    }

    /// Remove one listener, or all when `listener` is None; returns true when
    /// the topic has no listeners left
    pub fn unsubscribe(&mut self, topic: &str, listener: Option<&Listener>) -> Result<bool> {
        let not_subscribed = || SessionError::NotSubscribed {
            topic: topic.to_string(),
        };
        let listeners = self.topics.get_mut(topic).ok_or_else(not_subscribed)?;

        if let Some(listener) = listener {
            let index = listeners
                .iter()
                .position(|existing| existing == listener)
                .ok_or_else(not_subscribed)?;
            listeners.remove(index);
            if !listeners.is_empty() {
                return Ok(false);
            }
        }

        self.topics.remove(topic);
        Ok(true)
    }

    /// Deliver to every listener of `topic`; returns how many were invoked
    pub fn dispatch(&self, topic: &str, payload: &Value) -> usize {
        let Some(listeners) = self.topics.get(topic) else {
            return 0;
        };

        for (index, listener) in listeners.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener.call(topic, payload))).is_err() {
                warn!(topic, listener_index = index, "event listener panicked");
            }
        }
        listeners.len()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }
}
