/*
[INPUT]:  Raw WebSocket text frames (JSON arrays)
[OUTPUT]: Decoded Frame variants / encoded JSON text
[POS]:    WebSocket layer - message parsing and validation
[UPDATE]: When adding message types or changing frame shapes
*/

use serde_json::Value;
use std::fmt;

use super::publish::PublishOptions;
use crate::error::{Result, SessionError};

/// Message type tag, first element of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Welcome = 0,
    Prefix = 1,
    Call = 2,
    CallResult = 3,
    CallError = 4,
    Subscribe = 5,
    Unsubscribe = 6,
    Publish = 7,
    Event = 8,
}

impl MessageType {
    pub fn from_tag(tag: u64) -> Option<Self> {
        Some(match tag {
            0 => MessageType::Welcome,
            1 => MessageType::Prefix,
            2 => MessageType::Call,
            3 => MessageType::CallResult,
            4 => MessageType::CallError,
            5 => MessageType::Subscribe,
            6 => MessageType::Unsubscribe,
            7 => MessageType::Publish,
            8 => MessageType::Event,
            _ => return None,
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Allowed frame length including the tag
    fn arity(self) -> (usize, usize) {
        match self {
            MessageType::Welcome => (4, 4),
            MessageType::Prefix => (3, 3),
            MessageType::Call => (3, usize::MAX),
            MessageType::CallResult => (3, 3),
            MessageType::CallError => (4, 5),
            MessageType::Subscribe | MessageType::Unsubscribe => (2, 2),
            MessageType::Publish => (3, 5),
            MessageType::Event => (3, 3),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Welcome => "welcome",
            MessageType::Prefix => "prefix",
            MessageType::Call => "call",
            MessageType::CallResult => "call_result",
            MessageType::CallError => "call_error",
            MessageType::Subscribe => "subscribe",
            MessageType::Unsubscribe => "unsubscribe",
            MessageType::Publish => "publish",
            MessageType::Event => "event",
        };
        f.write_str(name)
    }
}

/// One wire message
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Welcome {
        session_id: String,
        protocol_version: u64,
        server_ident: String,
    },
    Prefix {
        prefix: String,
        uri: String,
    },
    Call {
        call_id: String,
        procedure: String,
        args: Vec<Value>,
    },
    CallResult {
        call_id: String,
        result: Value,
    },
    CallError {
        call_id: String,
        error_uri: String,
        error_desc: String,
        error_detail: Option<Value>,
    },
    Subscribe {
        topic: String,
    },
    Unsubscribe {
        topic: String,
    },
    Publish {
        topic: String,
        payload: Value,
        options: PublishOptions,
    },
    Event {
        topic: String,
        payload: Value,
    },
}

impl Frame {
    pub fn message_type(&self) -> MessageType {
        match self {
            Frame::Welcome { .. } => MessageType::Welcome,
            Frame::Prefix { .. } => MessageType::Prefix,
            Frame::Call { .. } => MessageType::Call,
            Frame::CallResult { .. } => MessageType::CallResult,
            Frame::CallError { .. } => MessageType::CallError,
            Frame::Subscribe { .. } => MessageType::Subscribe,
            Frame::Unsubscribe { .. } => MessageType::Unsubscribe,
            Frame::Publish { .. } => MessageType::Publish,
            Frame::Event { .. } => MessageType::Event,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut items = vec![Value::from(self.message_type().tag())];
        match self {
            Frame::Welcome {
                session_id,
                protocol_version,
                server_ident,
            } => {
                items.push(Value::from(session_id.as_str()));
                items.push(Value::from(*protocol_version));
                items.push(Value::from(server_ident.as_str()));
            }
            Frame::Prefix { prefix, uri } => {
                items.push(Value::from(prefix.as_str()));
                items.push(Value::from(uri.as_str()));
            }
            Frame::Call {
                call_id,
                procedure,
                args,
            } => {
                items.push(Value::from(call_id.as_str()));
                items.push(Value::from(procedure.as_str()));
                items.extend(args.iter().cloned());
            }
            Frame::CallResult { call_id, result } => {
                items.push(Value::from(call_id.as_str()));
                items.push(result.clone());
            }
            Frame::CallError {
                call_id,
                error_uri,
                error_desc,
                error_detail,
            } => {
                items.push(Value::from(call_id.as_str()));
                items.push(Value::from(error_uri.as_str()));
                items.push(Value::from(error_desc.as_str()));
                if let Some(detail) = error_detail {
                    items.push(detail.clone());
                }
            }
            Frame::Subscribe { topic } | Frame::Unsubscribe { topic } => {
                items.push(Value::from(topic.as_str()));
            }
            Frame::Publish {
                topic,
                payload,
                options,
            } => {
                items.push(Value::from(topic.as_str()));
                items.push(payload.clone());
                items.extend(options.wire_args());
            }
            Frame::Event { topic, payload } => {
                items.push(Value::from(topic.as_str()));
                items.push(payload.clone());
            }
        }
        Value::Array(items)
    }

    /// Serialize to the JSON text sent on the socket
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    /// Parse one received text frame
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| SessionError::protocol(format!("frame is not valid JSON: {err}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Array(mut items) = value else {
            return Err(SessionError::protocol("frame is not a JSON array"));
        };

        let tag = items
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| SessionError::protocol("frame has no integer message type tag"))?;
        let kind = MessageType::from_tag(tag)
            .ok_or_else(|| SessionError::protocol(format!("unknown message type tag {tag}")))?;

        let (min, max) = kind.arity();
        if items.len() < min || items.len() > max {
            return Err(SessionError::protocol(format!(
                "{kind} frame has {} elements",
                items.len()
            )));
        }

        let frame = match kind {
            MessageType::Welcome => Frame::Welcome {
                session_id: take_string(&mut items, 1, kind)?,
                protocol_version: items[2].as_u64().ok_or_else(|| {
                    SessionError::protocol("welcome protocol version is not an integer")
                })?,
                server_ident: take_string(&mut items, 3, kind)?,
            },
            MessageType::Prefix => Frame::Prefix {
                prefix: take_string(&mut items, 1, kind)?,
                uri: take_string(&mut items, 2, kind)?,
            },
            MessageType::Call => Frame::Call {
                call_id: take_string(&mut items, 1, kind)?,
                procedure: take_string(&mut items, 2, kind)?,
                args: items.split_off(3),
            },
            MessageType::CallResult => Frame::CallResult {
                call_id: take_string(&mut items, 1, kind)?,
                result: items[2].take(),
            },
            MessageType::CallError => Frame::CallError {
                call_id: take_string(&mut items, 1, kind)?,
                error_uri: take_string(&mut items, 2, kind)?,
                error_desc: take_string(&mut items, 3, kind)?,
                error_detail: items.get_mut(4).map(Value::take),
            },
            MessageType::Subscribe => Frame::Subscribe {
                topic: take_string(&mut items, 1, kind)?,
            },
            MessageType::Unsubscribe => Frame::Unsubscribe {
                topic: take_string(&mut items, 1, kind)?,
            },
            MessageType::Publish => Frame::Publish {
                topic: take_string(&mut items, 1, kind)?,
                payload: items[2].take(),
                options: PublishOptions::from_args(&items[3..])
                    .map_err(|err| SessionError::protocol(err.to_string()))?,
            },
            MessageType::Event => Frame::Event {
                topic: take_string(&mut items, 1, kind)?,
                payload: items[2].take(),
            },
        };
        Ok(frame)
    }
}

fn take_string(items: &mut [Value], index: usize, kind: MessageType) -> Result<String> {
    match items[index].take() {
        Value::String(text) => Ok(text),
        other => Err(SessionError::protocol(format!(
            "{kind} frame field {index} must be a string, got {other}"
        ))),
    }
}
