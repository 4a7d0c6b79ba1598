/*
[INPUT]:  Caller publish options or positional JSON publish arguments
[OUTPUT]: Validated PublishOptions and their trailing wire fields
[POS]:    WebSocket layer - publish argument shapes
[UPDATE]: When publish frame trailing fields change
*/

use serde_json::Value;

use crate::error::{Result, SessionError};

/// Delivery restrictions for one published event.
///
/// `exclude_me` and the explicit lists are mutually exclusive on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub exclude_me: Option<bool>,
    pub exclude: Option<Vec<String>>,
    pub eligible: Option<Vec<String>>,
}

impl PublishOptions {
    pub fn exclude_me(flag: bool) -> Self {
        Self {
            exclude_me: Some(flag),
            ..Self::default()
        }
    }

    pub fn exclude<I, S>(session_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude: Some(session_ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn with_eligible<I, S>(mut self, session_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.eligible = Some(session_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.exclude_me.is_some() && (self.exclude.is_some() || self.eligible.is_some()) {
            return Err(SessionError::InvalidArgument(
                "exclude_me cannot be combined with exclude/eligible lists".to_string(),
            ));
        }
        Ok(())
    }

    /// Interpret positional publish arguments: `[]`, `[bool]`, `[array]` or
    /// `[array, array]`, arrays holding session id strings.
    pub fn from_args(args: &[Value]) -> Result<Self> {
        match args {
            [] => Ok(Self::default()),
            [Value::Bool(flag)] => Ok(Self::exclude_me(*flag)),
            [Value::Array(exclude)] => Ok(Self {
                exclude: Some(session_id_list(exclude, "exclude")?),
                ..Self::default()
            }),
            [Value::Array(exclude), Value::Array(eligible)] => Ok(Self {
                exclude: Some(session_id_list(exclude, "exclude")?),
                eligible: Some(session_id_list(eligible, "eligible")?),
                ..Self::default()
            }),
            other => Err(SessionError::InvalidArgument(format!(
                "unsupported publish arguments: {}",
                Value::Array(other.to_vec())
            ))),
        }
    }

    /// Trailing fields of the Publish frame after `[tag, topic, payload]`
    pub(crate) fn wire_args(&self) -> Vec<Value> {
        if let Some(flag) = self.exclude_me {
            return vec![Value::Bool(flag)];
        }
        match (&self.exclude, &self.eligible) {
            (Some(exclude), Some(eligible)) => vec![string_array(exclude), string_array(eligible)],
            (Some(exclude), None) => vec![string_array(exclude)],
            (None, Some(eligible)) => vec![Value::Array(Vec::new()), string_array(eligible)],
            (None, None) => Vec::new(),
        }
    }
}

fn session_id_list(values: &[Value], field: &str) -> Result<Vec<String>> {
    values
        .iter()
        .map(|value| {
            value.as_str().map(str::to_string).ok_or_else(|| {
                SessionError::InvalidArgument(format!("{field} list must hold session id strings"))
            })
        })
        .collect()
}

fn string_array(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}
