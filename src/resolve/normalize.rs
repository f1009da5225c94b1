use url::Url;

use crate::download::paths::sanitize_title;
use crate::reddit::RawPost;
use crate::registry::types::{DELETED_AUTHOR, Entry, EntryData};

/// Extension assumed for extension-less single-image imgur links.
const IMGUR_DEFAULT_EXT: &str = ".png";

/// Web origin used to rebuild thread links for self posts.
const REDDIT_WEB: &str = "https://www.reddit.com";

/// Build an entry from a raw record without any network access.
///
/// Gallery data is left for the resolver to fill in. Also used to describe
/// posts whose resolution failed, so it must never fail itself.
pub fn entry_from_record(post: &RawPost) -> Entry {
    let (source, url, data) = if post.is_self {
        (
            self_source(post),
            self_link(post),
            EntryData::Text(post.selftext.clone()),
        )
    } else {
        (
            post.domain.clone(),
            with_inferred_extension(post.link()),
            EntryData::default(),
        )
    };
    Entry {
        id: post.id.clone(),
        subreddit: post.subreddit.clone(),
        title: sanitize_title(&post.title),
        author: post
            .author
            .clone()
            .unwrap_or_else(|| DELETED_AUTHOR.to_string()),
        timestamp: post.created_utc,
        source,
        url,
        url_preview: post.preview_url().unwrap_or_default().to_string(),
        data,
        error: None,
    }
}

/// Text posts are classified as `self.<community>`; records that omit the
/// domain get it derived from the subreddit.
fn self_source(post: &RawPost) -> String {
    if post.domain.is_empty() {
        format!("self.{}", post.subreddit)
    } else {
        post.domain.clone()
    }
}

/// A self post links to its own thread. Rebuilt from the permalink, or the
/// id, when the record carries no url.
fn self_link(post: &RawPost) -> String {
    let link = post.link();
    if !link.is_empty() {
        link.to_string()
    } else if !post.permalink.is_empty() {
        format!("{REDDIT_WEB}{}", post.permalink)
    } else if !post.id.is_empty() {
        format!("{REDDIT_WEB}/comments/{}/", post.id)
    } else {
        String::new()
    }
}

/// Direct imgur image links are served without an extension; give them one
/// so the fetcher treats them as a single image. Album links are left alone.
fn with_inferred_extension(link: &str) -> String {
    if link.contains("imgur") && !link.contains("/a/") && !has_extension(link) {
        format!("{link}{IMGUR_DEFAULT_EXT}")
    } else {
        link.to_string()
    }
}

/// Whether the last path segment of `link` carries a file extension.
fn has_extension(link: &str) -> bool {
    let last_segment = match Url::parse(link) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .map(str::to_string),
        Err(_) => link
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .map(str::to_string),
    };
    last_segment
        .and_then(|name| name.rfind('.').map(|dot| dot > 0 && dot + 1 < name.len()))
        .unwrap_or(false)
}
