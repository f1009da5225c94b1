//! Expansion of multi-image posts into ordered media urls.
//!
//! Native galleries carry their items in `gallery_data` (order) and
//! `media_metadata` (per-item variants). Album-service links are expanded
//! through its API using keys from a shared [`CredentialPool`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use super::credentials::CredentialPool;
use super::fallback::ArchiveLookup;
use crate::reddit::{ContentSource, RawPost};

const NATIVE_GALLERY_MARKER: &str = "reddit.com/gallery/";
const ALBUM_MARKER: &str = "imgur.com/a/";
const QUOTA_HEADER: &str = "x-ratelimit-clientremaining";
const ALBUM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub(crate) enum GalleryError {
    #[error("no album-service keys left")]
    NoCredentials,

    #[error("album service returned HTTP {0}")]
    Status(u16),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub fn is_native_gallery(url: &str) -> bool {
    url.contains(NATIVE_GALLERY_MARKER)
}

pub fn is_album(url: &str) -> bool {
    url.contains(ALBUM_MARKER)
}

pub fn is_gallery_link(url: &str) -> bool {
    is_native_gallery(url) || is_album(url)
}

/// Last path segment of a gallery or album link.
pub fn gallery_id(link: &str) -> &str {
    link.trim_matches('/').rsplit('/').next().unwrap_or("")
}

/// Ordered media urls of a native gallery record.
///
/// `None` when any expected field is missing; a partially readable gallery
/// is treated the same as an unreadable one.
pub fn native_gallery_urls(post: &RawPost) -> Option<Vec<String>> {
    let items = post.gallery_data.as_ref()?.get("items")?.as_array()?;
    let metadata = post.media_metadata.as_ref()?;
    items
        .iter()
        .map(|item| {
            let key = item.get("media_id")?.as_str()?;
            let media = metadata.get(key)?;
            let previews = media.get("p")?.as_array()?;
            let raw = match previews.last() {
                Some(largest) => largest.get("u")?.as_str()?,
                None => media.get("s")?.get("u")?.as_str()?,
            };
            Some(canonical_media_url(raw))
        })
        .collect()
}

/// Drop the query string and point preview hosts at the direct-serving host.
fn canonical_media_url(raw: &str) -> String {
    raw.split('?').next().unwrap_or(raw).replace("preview", "i")
}

#[derive(Deserialize)]
struct AlbumResponse {
    #[serde(default)]
    data: Vec<AlbumImage>,
}

#[derive(Deserialize)]
struct AlbumImage {
    #[serde(default)]
    link: String,
}

/// Album-service API client sharing one rotating key pool.
pub struct AlbumClient {
    client: Client,
    base: String,
    pool: Mutex<CredentialPool>,
}

impl AlbumClient {
    pub fn new(client: Client, base: &str, pool: CredentialPool) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            pool: Mutex::new(pool),
        }
    }

    pub(crate) async fn album_images(&self, album_id: &str) -> Result<Vec<String>, GalleryError> {
        // Lock only to read the key; the request runs unlocked.
        let key = self
            .pool
            .lock()
            .await
            .front()
            .map(str::to_string)
            .ok_or(GalleryError::NoCredentials)?;

        let response = self
            .client
            .get(format!("{}/3/album/{}/images", self.base, album_id))
            .header(AUTHORIZATION, format!("Client-ID {key}"))
            .timeout(ALBUM_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GalleryError::Status(status.as_u16()));
        }

        let remaining = response
            .headers()
            .get(QUOTA_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body: AlbumResponse = response.json().await?;

        if let Some(remaining) = remaining {
            tracing::debug!(remaining, "Album-service quota");
            self.pool.lock().await.retire_if_front(&key, remaining);
        }

        Ok(body
            .data
            .into_iter()
            .map(|image| image.link)
            .filter(|link| !link.is_empty())
            .collect())
    }
}

/// Resolves gallery and album links to their media urls.
pub struct GalleryResolver {
    source: Arc<dyn ContentSource>,
    archive: Arc<dyn ArchiveLookup>,
    albums: AlbumClient,
}

impl GalleryResolver {
    pub fn new(
        source: Arc<dyn ContentSource>,
        archive: Arc<dyn ArchiveLookup>,
        albums: AlbumClient,
    ) -> Self {
        Self {
            source,
            archive,
            albums,
        }
    }

    /// Media urls behind `link`, in gallery order. Empty when nothing could
    /// be resolved.
    pub async fn resolve(&self, link: &str) -> Vec<String> {
        let id = gallery_id(link);
        if is_native_gallery(link) {
            self.native(id).await
        } else if is_album(link) {
            match self.albums.album_images(id).await {
                Ok(urls) => urls,
                Err(e) => {
                    tracing::warn!(album = %id, "Could not expand album: {}", e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        }
    }

    async fn native(&self, id: &str) -> Vec<String> {
        tracing::debug!(gallery = %id, "Resolving gallery");
        let live = match self.source.fetch_post(id).await {
            Ok(post) => Some(post),
            Err(e) => {
                tracing::debug!(gallery = %id, "Gallery refetch failed: {:#}", e);
                None
            }
        };
        let post = match live.filter(|p| p.gallery_data.is_some()) {
            Some(post) => Some(post),
            None => self
                .archive
                .lookup(id)
                .await
                .filter(|p| p.gallery_data.is_some()),
        };
        let Some(post) = post else {
            tracing::warn!(gallery = %id, "No gallery data from the API or the archive");
            return Vec::new();
        };
        native_gallery_urls(&post).unwrap_or_else(|| {
            tracing::warn!(gallery = %id, "Gallery metadata incomplete");
            Vec::new()
        })
    }
}
