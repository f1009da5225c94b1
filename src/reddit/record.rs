//! Intermediate schema for raw post records.
//!
//! Both the Reddit API and the archive service return loosely-typed JSON
//! with fields that may be missing or `null`. Everything the normalizer needs
//! is decoded here once, with explicit defaults, so downstream code never
//! inspects raw JSON. Gallery metadata stays as [`Value`] because its shape
//! varies per media item and is read through explicit lookups instead.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize `null` as the type's default instead of failing.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPost {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub subreddit: String,
    #[serde(deserialize_with = "nullable")]
    pub title: String,
    /// `None` when the author account is gone.
    pub author: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub created_utc: f64,
    #[serde(deserialize_with = "nullable")]
    pub domain: String,
    #[serde(deserialize_with = "nullable")]
    pub url: String,
    pub url_overridden_by_dest: Option<String>,
    /// Site-relative thread path, e.g. `/r/rust/comments/abc/title/`.
    #[serde(deserialize_with = "nullable")]
    pub permalink: String,
    #[serde(deserialize_with = "nullable")]
    pub is_self: bool,
    #[serde(deserialize_with = "nullable")]
    pub selftext: String,
    pub preview: Option<Preview>,
    #[serde(deserialize_with = "nullable")]
    pub crosspost_parent_list: Vec<CrosspostParent>,
    pub gallery_data: Option<Value>,
    pub media_metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Preview {
    #[serde(deserialize_with = "nullable")]
    pub images: Vec<PreviewImage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PreviewImage {
    pub source: Option<PreviewSource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PreviewSource {
    #[serde(deserialize_with = "nullable")]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrosspostParent {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
}

impl RawPost {
    /// The link the post points at; the destination override wins when set.
    pub fn link(&self) -> &str {
        self.url_overridden_by_dest.as_deref().unwrap_or(&self.url)
    }

    /// Id of the ultimate origin of a cross-post chain, if this is one.
    pub fn crosspost_origin(&self) -> Option<&str> {
        self.crosspost_parent_list
            .last()
            .map(|p| p.id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// First listed preview image url, if the record has one.
    pub fn preview_url(&self) -> Option<&str> {
        self.preview
            .as_ref()?
            .images
            .first()?
            .source
            .as_ref()
            .map(|s| s.url.as_str())
            .filter(|u| !u.is_empty())
    }
}
