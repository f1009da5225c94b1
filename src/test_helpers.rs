//! In-memory stand-ins for the network collaborators.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::download::error::FetchError;
use crate::download::video::VideoFetcher;
use crate::reddit::ids::strip_prefix;
use crate::reddit::{ContentSource, RawPost, RedditError};
use crate::resolve::credentials::CredentialPool;
use crate::resolve::fallback::ArchiveLookup;
use crate::resolve::gallery::{AlbumClient, GalleryResolver};

/// Content source serving a fixed list of records plus lookup-only posts.
#[derive(Default)]
pub(crate) struct FakeSource {
    records: Vec<RawPost>,
    posts: HashMap<String, RawPost>,
    pub(crate) fetches: AtomicUsize,
}

impl FakeSource {
    pub(crate) fn new(records: Vec<RawPost>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Make `post` available to `fetch_post` without yielding it as a record.
    pub(crate) fn with_post(mut self, post: RawPost) -> Self {
        self.posts.insert(post.id.clone(), post);
        self
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    fn records(&self) -> BoxStream<'_, anyhow::Result<RawPost>> {
        stream::iter(self.records.iter().cloned().map(Ok)).boxed()
    }

    async fn fetch_post(&self, id: &str) -> anyhow::Result<RawPost> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let id = strip_prefix(id);
        self.posts
            .get(id)
            .or_else(|| self.records.iter().find(|p| p.id == id))
            .cloned()
            .ok_or_else(|| RedditError::NotFound(id.to_string()).into())
    }
}

#[derive(Default)]
pub(crate) struct FakeArchive {
    posts: HashMap<String, RawPost>,
    pub(crate) lookups: AtomicUsize,
}

impl FakeArchive {
    pub(crate) fn with(mut self, post: RawPost) -> Self {
        self.posts.insert(post.id.clone(), post);
        self
    }
}

#[async_trait]
impl ArchiveLookup for FakeArchive {
    async fn lookup(&self, id: &str) -> Option<RawPost> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.posts.get(strip_prefix(id)).cloned()
    }
}

/// Video fetcher that records requests and writes an empty `.mp4`.
///
/// With a delay set, each call stays in flight that long, so `peak` shows
/// how many calls overlapped.
#[derive(Default)]
pub(crate) struct RecordingVideo {
    pub(crate) calls: Mutex<Vec<(String, PathBuf)>>,
    delay: Duration,
    in_flight: AtomicUsize,
    pub(crate) peak: AtomicUsize,
}

impl RecordingVideo {
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl VideoFetcher for RecordingVideo {
    async fn fetch_video(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(crate::download::paths::with_extension(dest, "mp4"), b"").await?;
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), dest.to_path_buf()));
        Ok(())
    }
}

/// Gallery resolver whose lookups all come back empty.
pub(crate) fn empty_gallery_resolver() -> Arc<GalleryResolver> {
    let albums = AlbumClient::new(
        reqwest::Client::new(),
        "http://127.0.0.1:1",
        CredentialPool::default(),
    );
    Arc::new(GalleryResolver::new(
        Arc::new(FakeSource::default()),
        Arc::new(FakeArchive::default()),
        albums,
    ))
}
