//! Types persisted in the registry.

use serde::{Deserialize, Serialize};

/// Sentinel the service puts in place of self-text that a moderator removed.
pub const REMOVED_MARKER: &str = "[removed]";

/// Author value used when the record carries no author reference.
pub const DELETED_AUTHOR: &str = "[deleted]";

/// Payload of an entry: self-text verbatim, or the ordered media urls of a
/// gallery/album post. Link posts carry the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryData {
    Text(String),
    Media(Vec<String>),
}

impl Default for EntryData {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl EntryData {
    /// The media urls, if this is a gallery/album payload.
    pub fn media(&self) -> Option<&[String]> {
        match self {
            Self::Media(urls) => Some(urls),
            Self::Text(_) => None,
        }
    }

    /// Whether the payload is the moderator-removed sentinel.
    pub fn is_removed(&self) -> bool {
        matches!(self, Self::Text(t) if t == REMOVED_MARKER)
    }

    /// Whether the payload is a gallery that resolved to nothing.
    pub fn is_empty_media(&self) -> bool {
        matches!(self, Self::Media(urls) if urls.is_empty())
    }
}

/// Canonical record for one saved item.
///
/// Field names match the on-disk JSON written by earlier versions of the
/// tool (`sub`, `date`); the descriptive names are accepted on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "sub", alias = "subreddit", default)]
    pub subreddit: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "date", alias = "timestamp", default)]
    pub timestamp: f64,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub url_preview: String,
    #[serde(default)]
    pub data: EntryData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Entry {
    /// Whether the entry is missing the fields the media fetcher needs, per
    /// the archive-fallback heuristic.
    pub fn looks_incomplete(&self) -> bool {
        self.source.is_empty()
            || self.url.is_empty()
            || self.data.is_removed()
            || self.data.is_empty_media()
    }

    /// Whether this is a self (text) post.
    pub fn is_self_post(&self) -> bool {
        self.source.starts_with("self.")
    }
}
