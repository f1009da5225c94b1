//! Media fetching: classify an entry by its source domain (or, failing that,
//! by the content type the server declares) and save its media under
//! `root/<sub>/<title>`.

pub mod error;
pub mod file;
pub mod paths;
pub mod video;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::config::SourceDomains;
use crate::registry::types::{Entry, EntryData};
use crate::resolve::gallery::{GalleryResolver, gallery_id, is_album, is_native_gallery};
use crate::retry::RetryConfig;
use crate::types::MediaClass;

use error::FetchError;
use video::VideoFetcher;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Extensions that mark a link as a video regardless of its domain.
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mkv", ".mov", ".m4v"];

/// HTTP client for media downloads. No overall timeout, large files are
/// streamed; only connecting is bounded.
pub fn build_download_client(user_agent: &str) -> anyhow::Result<Client> {
    Ok(Client::builder()
        .user_agent(user_agent)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?)
}

fn has_video_extension(link: &str) -> bool {
    let path = Url::parse(link)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| link.to_ascii_lowercase());
    VIDEO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

pub struct MediaFetcher {
    client: Client,
    sources: SourceDomains,
    video: Arc<dyn VideoFetcher>,
    gallery: Arc<GalleryResolver>,
    retry: RetryConfig,
}

impl MediaFetcher {
    pub fn new(
        client: Client,
        sources: SourceDomains,
        video: Arc<dyn VideoFetcher>,
        gallery: Arc<GalleryResolver>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client,
            sources,
            video,
            gallery,
            retry,
        }
    }

    /// Decide how an entry's media is fetched.
    ///
    /// Known domains are classified locally; anything else costs one HEAD
    /// request to read the declared content type.
    pub async fn classify(&self, entry: &Entry) -> Result<MediaClass, FetchError> {
        if entry.is_self_post() {
            return Ok(MediaClass::SelfText);
        }
        let url = entry.url.as_str();
        if url.is_empty() {
            return Err(FetchError::IncompleteData);
        }
        if self.sources.is_video(&entry.source) || has_video_extension(url) {
            return Ok(MediaClass::Video);
        }
        if self.sources.is_image(&entry.source) {
            return Ok(if is_album(url) || is_native_gallery(url) {
                MediaClass::Album
            } else if url.contains(".gifv") {
                MediaClass::Video
            } else {
                MediaClass::Image
            });
        }

        let content_type = file::probe_content_type(&self.client, url)
            .await?
            .to_ascii_lowercase();
        tracing::debug!(id = %entry.id, %content_type, "Probed unknown domain");
        if content_type.contains("image") {
            Ok(MediaClass::Image)
        } else if content_type.contains("video") {
            Ok(MediaClass::Video)
        } else {
            Err(FetchError::UnrecognizedSource {
                source_domain: entry.source.clone(),
                url: entry.url.clone(),
            })
        }
    }

    /// Fetch the entry's media below `root` and report how it was handled.
    pub async fn fetch(&self, entry: &Entry, root: &Path) -> Result<MediaClass, FetchError> {
        let class = self.classify(entry).await?;
        let dest = paths::destination(root, &entry.subreddit, &entry.title, &entry.id);
        tracing::debug!(id = %entry.id, class = class.as_str(), "Fetching to {}", dest.display());

        match class {
            MediaClass::Video => self.video.fetch_video(&entry.url, &dest).await?,
            MediaClass::Image => {
                file::fetch_to(
                    &self.client,
                    &entry.url,
                    &dest,
                    Some(entry.timestamp),
                    &self.retry,
                )
                .await?;
            }
            MediaClass::Album => self.fetch_album(entry, &dest).await?,
            MediaClass::SelfText => {
                if let EntryData::Text(text) = &entry.data {
                    if !text.is_empty() {
                        if let Some(parent) = dest.parent() {
                            tokio::fs::create_dir_all(parent).await?;
                        }
                        tokio::fs::write(paths::with_extension(&dest, "txt"), text).await?;
                    }
                }
            }
        }
        Ok(class)
    }

    async fn fetch_album(&self, entry: &Entry, dest: &Path) -> Result<(), FetchError> {
        let urls = match entry.data.media() {
            Some(urls) if !urls.is_empty() => urls.to_vec(),
            _ => self.gallery.resolve(&entry.url).await,
        };
        if urls.is_empty() {
            return Err(FetchError::EmptyAlbum(gallery_id(&entry.url).to_string()));
        }

        tokio::fs::create_dir_all(dest).await?;
        let total = urls.len();
        for (n, url) in urls.iter().enumerate() {
            file::fetch_to(
                &self.client,
                url,
                &dest.join(n.to_string()),
                Some(entry.timestamp),
                &self.retry,
            )
            .await?;
            tracing::debug!(id = %entry.id, "Album item {}/{}", n + 1, total);
        }
        Ok(())
    }
}
