/*
[INPUT]:  Prefix declarations (short name -> full URI) and identifiers to expand/compress
[OUTPUT]: Resolved full identifiers and compressed `prefix:suffix` identifiers
[POS]:    Session layer - wire identifier compression
[UPDATE]: When changing prefix matching rules
*/

use std::collections::HashMap;

/// Bijective short-name <-> full-URI registry
#[derive(Debug, Clone, Default)]
pub struct TopicRegistry {
    by_prefix: HashMap<String, String>,
    by_uri: HashMap<String, String>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `prefix` for `uri`, replacing any mapping either side had
    pub fn set(&mut self, prefix: &str, uri: &str) {
        if let Some(old_uri) = self.by_prefix.remove(prefix) {
            self.by_uri.remove(&old_uri);
        }
        if let Some(old_prefix) = self.by_uri.remove(uri) {
            self.by_prefix.remove(&old_prefix);
        }
        self.by_prefix.insert(prefix.to_string(), uri.to_string());
        self.by_uri.insert(uri.to_string(), prefix.to_string());
    }

    pub fn uri_for(&self, prefix: &str) -> Option<&str> {
        self.by_prefix.get(prefix).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_prefix.is_empty()
    }

    /// Expand `prefix:suffix` to the full identifier.
    ///
    /// Unregistered or prefix-less identifiers come back unchanged when
    /// `permissive`, else `None`.
    pub fn resolve(&self, identifier: &str, permissive: bool) -> Option<String> {
        if let Some((prefix, suffix)) = identifier.split_once(':')
            && let Some(uri) = self.by_prefix.get(prefix)
        {
            return Some(format!("{uri}{suffix}"));
        }
        permissive.then(|| identifier.to_string())
    }

    /// Compress `identifier` with the longest registered URI prefix
    pub fn shrink(&self, identifier: &str, permissive: bool) -> Option<String> {
        let best = self
            .by_uri
            .iter()
            .filter(|(uri, _)| identifier.starts_with(uri.as_str()))
            .max_by_key(|(uri, _)| uri.len());

        match best {
            Some((uri, prefix)) => Some(format!("{prefix}:{}", &identifier[uri.len()..])),
            None => permissive.then(|| identifier.to_string()),
        }
    }
}
