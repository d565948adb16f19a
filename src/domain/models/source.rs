use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a chat source.
///
/// Derived from the display prefix by stripping square brackets and
/// lowercasing, so `"[YT]"` becomes `"yt"`. Used for artifact names, dedup
/// keys, log fields and restart requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Wrap an already-normalized identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the identifier from a display prefix.
    pub fn from_prefix(prefix: &str) -> Self {
        let stripped: String = prefix.chars().filter(|c| *c != '[' && *c != ']').collect();
        Self(stripped.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration of a single upstream chat source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    /// Short display tag prepended to author names, e.g. `[YT]`
    #[serde(default)]
    pub prefix: String,

    /// Human readable source name
    #[serde(default)]
    pub name: String,

    /// Opaque locator handed to the worker (stream URL, channel handle, ...)
    #[serde(default, alias = "url")]
    pub target: String,

    /// Disabled sources are kept in the config but never started
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    /// Create an enabled source
    pub fn new(prefix: impl Into<String>, name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            name: name.into(),
            target: target.into(),
            enabled: true,
        }
    }

    pub fn id(&self) -> SourceId {
        SourceId::from_prefix(&self.prefix)
    }

    /// Reason this entry cannot be started, if any.
    pub fn validation_error(&self) -> Option<&'static str> {
        if self.prefix.trim().is_empty() {
            Some("prefix is empty")
        } else if self.id().is_empty() {
            Some("prefix yields an empty source id")
        } else if self.name.trim().is_empty() {
            Some("name is empty")
        } else if self.target.trim().is_empty() {
            Some("target is empty")
        } else {
            None
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validation_error().is_none()
    }
}
