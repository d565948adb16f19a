//! Chat items as produced by workers and as published in the merged feed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::source::{SourceConfig, SourceId};

/// Badge shown next to an author name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Message author with role flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub name: String,

    /// Prefixed name, filled in at ingestion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default)]
    pub is_moderator: bool,

    #[serde(default)]
    pub is_sponsor: bool,

    #[serde(default)]
    pub is_owner: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub badges: Vec<Badge>,

    /// Worker-specific fields (avatar URL, ...) passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            is_moderator: false,
            is_sponsor: false,
            is_owner: false,
            badges: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Role names in a fixed order: owner, moderator, sponsor.
    pub fn roles(&self) -> Vec<&'static str> {
        let mut roles = Vec::new();
        if self.is_owner {
            roles.push("owner");
        }
        if self.is_moderator {
            roles.push("moderator");
        }
        if self.is_sponsor {
            roles.push("sponsor");
        }
        roles
    }
}

/// A single chat message as appended by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatItem {
    /// Source-local message id; may be empty for workers that do not report one
    #[serde(default)]
    pub id: String,

    pub author: Author,

    #[serde(default)]
    pub text: String,

    /// Milliseconds on the source's clock
    #[serde(default)]
    pub timestamp: i64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatItem {
    pub fn new(id: impl Into<String>, author: impl Into<String>, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            author: Author::new(author),
            text: text.into(),
            timestamp,
            extra: Map::new(),
        }
    }

    /// The id used for deduplication.
    ///
    /// Items without an id fall back to `<timestamp>_<author>_<text hash>`,
    /// which is stable across repeated reads of the same artifact and tells
    /// apart two messages one author sent within the same millisecond.
    pub fn effective_id(&self) -> String {
        if self.id.is_empty() {
            let mut hasher = DefaultHasher::new();
            self.text.hash(&mut hasher);
            format!("{}_{}_{:016x}", self.timestamp, self.author.name, hasher.finish())
        } else {
            self.id.clone()
        }
    }
}

/// Origin of an enriched item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub source_id: SourceId,
    pub source_name: String,
    pub prefix: String,
}

/// A chat item annotated with its source, ready for merging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedItem {
    #[serde(flatten)]
    pub item: ChatItem,

    pub source: SourceMeta,
}

impl EnrichedItem {
    /// Attach source metadata and compute the prefixed display name.
    pub fn enrich(mut item: ChatItem, source: &SourceConfig) -> Self {
        if item.id.is_empty() {
            item.id = item.effective_id();
        }
        item.author.display_name = Some(format!("{} {}", source.prefix, item.author.name));

        Self {
            item,
            source: SourceMeta {
                source_id: source.id(),
                source_name: source.name.clone(),
                prefix: source.prefix.clone(),
            },
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.item.timestamp
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source.source_id
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(self.source.source_id.clone(), self.item.effective_id())
    }
}

/// Identity of a chat event across all sources: (source id, source-local id).
///
/// Two sources may reuse the same local id without colliding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    source: SourceId,
    id: String,
}

impl DedupKey {
    pub fn new(source: SourceId, id: impl Into<String>) -> Self {
        Self {
            source,
            id: id.into(),
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}
