//! Turning raw post records into registry entries: normalization,
//! cross-post indirection, archive fallback and gallery expansion.

pub mod credentials;
pub mod fallback;
pub mod gallery;
pub mod normalize;

use std::sync::Arc;

use crate::reddit::{ContentSource, RawPost};
use crate::registry::types::{Entry, EntryData};

use fallback::ArchiveLookup;
use gallery::{GalleryResolver, is_gallery_link};
pub use normalize::entry_from_record;

pub struct Resolver {
    source: Arc<dyn ContentSource>,
    archive: Arc<dyn ArchiveLookup>,
    gallery: Arc<GalleryResolver>,
}

impl Resolver {
    pub fn new(
        source: Arc<dyn ContentSource>,
        archive: Arc<dyn ArchiveLookup>,
        gallery: Arc<GalleryResolver>,
    ) -> Self {
        Self {
            source,
            archive,
            gallery,
        }
    }

    /// Produce the entry for a saved record, keyed by the record's own id.
    ///
    /// Cross-posts are replaced by their origin; entries that still look
    /// incomplete are rebuilt from the archive.
    pub async fn resolve(&self, post: &RawPost) -> anyhow::Result<Entry> {
        let entry = self.normalize(post).await?;
        let mut entry = self.resolve_if_incomplete(entry, &post.id).await;
        entry.id = post.id.clone();
        Ok(entry)
    }

    /// Normalize a record, following a cross-post to its origin first.
    pub async fn normalize(&self, post: &RawPost) -> anyhow::Result<Entry> {
        match post.crosspost_origin() {
            Some(origin) => {
                tracing::debug!(id = %post.id, %origin, "Following cross-post");
                let origin = self.source.fetch_post(origin).await?;
                Ok(self.build(&origin).await)
            }
            None => Ok(self.build(post).await),
        }
    }

    /// Rebuild `entry` from the archive when it lacks what the fetcher needs.
    ///
    /// A failed lookup normalizes an empty record, so the entry still fails
    /// later with a descriptive error instead of being silently kept.
    pub async fn resolve_if_incomplete(&self, entry: Entry, id: &str) -> Entry {
        if !entry.looks_incomplete() {
            return entry;
        }
        tracing::info!(%id, "Post looks incomplete, trying the archive");
        let archived = self.archive.lookup(id).await.unwrap_or_default();
        self.build(&archived).await
    }

    async fn build(&self, post: &RawPost) -> Entry {
        let mut entry = entry_from_record(post);
        if !post.is_self && is_gallery_link(&entry.url) {
            entry.data = EntryData::Media(self.gallery.resolve(&entry.url).await);
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::credentials::CredentialPool;
    use crate::resolve::gallery::AlbumClient;
    use crate::test_helpers::{FakeArchive, FakeSource};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn raw(value: serde_json::Value) -> RawPost {
        serde_json::from_value(value).unwrap()
    }

    fn resolver(source: FakeSource, archive: FakeArchive) -> (Resolver, Arc<FakeSource>, Arc<FakeArchive>) {
        let source = Arc::new(source);
        let archive = Arc::new(archive);
        let albums = AlbumClient::new(reqwest::Client::new(), "http://127.0.0.1:1", CredentialPool::default());
        let gallery = Arc::new(GalleryResolver::new(source.clone(), archive.clone(), albums));
        (
            Resolver::new(source.clone(), archive.clone(), gallery),
            source,
            archive,
        )
    }

    #[tokio::test]
    async fn test_complete_post_skips_archive() {
        let (resolver, _, archive) = resolver(FakeSource::default(), FakeArchive::default());
        let post = raw(json!({"id": "a", "domain": "i.redd.it", "url": "https://i.redd.it/a.jpg"}));
        let entry = resolver.resolve(&post).await.unwrap();
        assert_eq!(entry.url, "https://i.redd.it/a.jpg");
        assert_eq!(archive.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_crosspost_uses_last_parent() {
        let origin = raw(json!({
            "id": "orig",
            "subreddit": "source_sub",
            "domain": "i.redd.it",
            "url": "https://i.redd.it/orig.png",
        }));
        let (resolver, source, _) =
            resolver(FakeSource::default().with_post(origin), FakeArchive::default());
        let post = raw(json!({
            "id": "xpost",
            "subreddit": "mirror",
            "crosspost_parent_list": [{"id": "middle"}, {"id": "orig"}],
        }));
        let entry = resolver.resolve(&post).await.unwrap();
        assert_eq!(entry.id, "xpost");
        assert_eq!(entry.subreddit, "source_sub");
        assert_eq!(entry.url, "https://i.redd.it/orig.png");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_removed_post_replaced_from_archive() {
        let archived = raw(json!({
            "id": "gone",
            "subreddit": "pics",
            "domain": "i.imgur.com",
            "url": "https://i.imgur.com/keep.jpg",
        }));
        let (resolver, _, _) =
            resolver(FakeSource::default(), FakeArchive::default().with(archived));
        let post = raw(json!({
            "id": "gone",
            "is_self": true,
            "domain": "self.pics",
            "selftext": "[removed]",
            "url": "https://www.reddit.com/r/pics/comments/gone/",
        }));
        let entry = resolver.resolve(&post).await.unwrap();
        assert_eq!(entry.source, "i.imgur.com");
        assert_eq!(entry.url, "https://i.imgur.com/keep.jpg");
    }

    #[tokio::test]
    async fn test_missing_url_and_no_archive_stays_incomplete() {
        let (resolver, _, archive) = resolver(FakeSource::default(), FakeArchive::default());
        let post = raw(json!({"id": "nourl", "domain": "i.redd.it", "url": ""}));
        let entry = resolver.resolve(&post).await.unwrap();
        assert_eq!(entry.id, "nourl");
        assert!(entry.url.is_empty());
        assert!(entry.looks_incomplete());
        assert_eq!(archive.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unresolved_crosspost_is_error() {
        let (resolver, _, _) = resolver(FakeSource::default(), FakeArchive::default());
        let post = raw(json!({"id": "x", "crosspost_parent_list": [{"id": "missing"}]}));
        assert!(resolver.resolve(&post).await.is_err());
    }
}
