/*
[INPUT]:  YAML console profile
[OUTPUT]: Parsed and validated endpoint, session options and startup actions
[POS]:    Configuration layer - console setup
[UPDATE]: When adding new profile options
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tradewire_session::{Endpoint, PublishOptions, SessionConfig};

/// Top-level configuration for one venue console
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsoleProfile {
    /// WebSocket endpoint (ws:// or wss://)
    pub endpoint: String,
    /// Reconnect and sub-protocol options
    #[serde(default)]
    pub session: SessionConfig,
    /// Prefixes declared on every new session
    #[serde(default)]
    pub prefixes: Vec<PrefixConfig>,
    /// Topics subscribed on every new session
    #[serde(default)]
    pub subscriptions: Vec<String>,
    /// Calls issued on every new session
    #[serde(default)]
    pub calls: Vec<CallConfig>,
    /// Events published on every new session
    #[serde(default)]
    pub publishes: Vec<PublishConfig>,
}

/// Prefix declaration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrefixConfig {
    pub prefix: String,
    pub uri: String,
}

/// One RPC issued after connect
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallConfig {
    /// Procedure URI or `prefix:suffix`
    pub procedure: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// One event published after connect
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublishConfig {
    pub topic: String,
    pub payload: Value,
    /// Positional publish options: `[]`, `[bool]`, `[[ids]]` or `[[ids], [ids]]`
    #[serde(default)]
    pub args: Vec<Value>,
}

impl PublishConfig {
    pub fn options(&self) -> tradewire_session::Result<PublishOptions> {
        PublishOptions::from_args(&self.args)
    }
}

impl ConsoleProfile {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let profile: Self = serde_yaml::from_str(content).context("parse profile yaml")?;
        Ok(profile)
    }

    /// Check everything that would otherwise only fail after connecting
    pub fn validate(&self) -> Result<()> {
        self.endpoint()?;
        self.session.validate().context("session options")?;
        for publish in &self.publishes {
            publish
                .options()
                .with_context(|| format!("publish options for topic {}", publish.topic))?;
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        let endpoint = Endpoint::parse(&self.endpoint)
            .with_context(|| format!("invalid endpoint {}", self.endpoint))?;
        match endpoint.url().scheme() {
            "ws" | "wss" => Ok(endpoint),
            other => anyhow::bail!("endpoint scheme must be ws or wss, got {other}"),
        }
    }
}
