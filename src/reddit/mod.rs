//! Reddit content source: the saved-items feed, explicit id lists, and
//! single-post lookups used during resolution.

pub mod error;
pub mod ids;
pub mod record;
pub mod session;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::Stream;
use futures_util::stream::BoxStream;
use serde::Deserialize;
use serde_json::Value;

pub use error::RedditError;
pub use record::RawPost;
pub use session::RedditSession;

/// Items per listing page and per `/api/info` batch.
const PAGE_SIZE: usize = 100;

const LINK_KIND: &str = "t3";

/// Source of raw post records.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Lazy, finite sequence of records to process this run.
    fn records(&self) -> BoxStream<'_, anyhow::Result<RawPost>>;

    /// Fetch one post by id (with or without the `t3_` prefix).
    async fn fetch_post(&self, id: &str) -> anyhow::Result<RawPost>;
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Keep link posts; saved comments and other kinds are dropped.
fn link_posts(children: Vec<Thing>) -> Vec<RawPost> {
    children
        .into_iter()
        .filter(|thing| thing.kind == LINK_KIND)
        .filter_map(|thing| match serde_json::from_value::<RawPost>(thing.data) {
            Ok(post) => Some(post),
            Err(e) => {
                tracing::warn!("Skipping undecodable listing item: {}", e);
                None
            }
        })
        .collect()
}

/// Which records [`RedditSource::records`] yields.
#[derive(Debug, Clone)]
pub enum SourceMode {
    /// The authenticated user's saved feed.
    Saved,
    /// Explicit post fullnames, e.g. from a CSV export.
    Ids(Vec<String>),
}

pub struct RedditSource {
    session: RedditSession,
    mode: SourceMode,
}

impl RedditSource {
    pub fn new(session: RedditSession, mode: SourceMode) -> Self {
        Self { session, mode }
    }

    async fn info(&self, fullnames: &str) -> Result<Vec<RawPost>, RedditError> {
        let listing: Listing = self
            .session
            .get_json("/api/info", &[("id", fullnames), ("raw_json", "1")])
            .await?;
        Ok(link_posts(listing.data.children))
    }

    fn saved_feed(&self) -> impl Stream<Item = anyhow::Result<RawPost>> + Send + '_ {
        try_stream! {
            let path = format!("/user/{}/saved", self.session.username());
            let limit = PAGE_SIZE.to_string();
            let mut after: Option<String> = None;
            loop {
                let mut query = vec![("limit", limit.as_str()), ("raw_json", "1")];
                if let Some(cursor) = after.as_deref() {
                    query.push(("after", cursor));
                }
                let listing: Listing = self.session.get_json(&path, &query).await?;
                let ListingData { after: next, children } = listing.data;
                tracing::debug!(count = children.len(), "Fetched saved page");
                for post in link_posts(children) {
                    yield post;
                }
                match next {
                    Some(cursor) if !cursor.is_empty() => after = Some(cursor),
                    _ => break,
                }
            }
        }
    }

    fn id_batches<'a>(
        &'a self,
        fullnames: &'a [String],
    ) -> impl Stream<Item = anyhow::Result<RawPost>> + Send + 'a {
        try_stream! {
            for batch in fullnames.chunks(PAGE_SIZE) {
                let joined = batch.join(",");
                for post in self.info(&joined).await? {
                    yield post;
                }
            }
        }
    }
}

#[async_trait]
impl ContentSource for RedditSource {
    fn records(&self) -> BoxStream<'_, anyhow::Result<RawPost>> {
        match &self.mode {
            SourceMode::Saved => Box::pin(self.saved_feed()),
            SourceMode::Ids(fullnames) => Box::pin(self.id_batches(fullnames)),
        }
    }

    async fn fetch_post(&self, id: &str) -> anyhow::Result<RawPost> {
        let fullname = ids::fullname(id);
        self.info(&fullname)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RedditError::NotFound(ids::strip_prefix(id).to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Endpoints, RedditCredentials};
    use futures_util::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn session(server: &MockServer) -> RedditSession {
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
            .mount(server)
            .await;
        let credentials = RedditCredentials {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            username: "me".into(),
            password: "pw".into(),
            user_agent: "test".into(),
        };
        let endpoints = Endpoints {
            reddit_token: format!("{}/api/v1/access_token", server.uri()),
            reddit_api: server.uri(),
            ..Endpoints::default()
        };
        RedditSession::login(&credentials, &endpoints).await.unwrap()
    }

    fn listing(after: Option<&str>, children: Vec<Value>) -> Value {
        json!({"kind": "Listing", "data": {"after": after, "children": children}})
    }

    fn link(id: &str) -> Value {
        json!({"kind": "t3", "data": {"id": id, "title": format!("post {id}")}})
    }

    #[tokio::test]
    async fn test_saved_feed_paginates_and_skips_comments() {
        let server = MockServer::start().await;
        let session = session(&server).await;
        Mock::given(method("GET"))
            .and(path("/user/me/saved"))
            .and(query_param_is_missing("after"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(
                Some("t3_b"),
                vec![link("a"), json!({"kind": "t1", "data": {"id": "c1"}}), link("b")],
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/me/saved"))
            .and(query_param("after", "t3_b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(None, vec![link("c")])))
            .expect(1)
            .mount(&server)
            .await;

        let source = RedditSource::new(session, SourceMode::Saved);
        let ids: Vec<String> = source
            .records()
            .map(|r| r.unwrap().id)
            .collect()
            .await;
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_feed_error_ends_sequence_with_error() {
        let server = MockServer::start().await;
        let session = session(&server).await;
        Mock::given(method("GET"))
            .and(path("/user/me/saved"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = RedditSource::new(session, SourceMode::Saved);
        let results: Vec<_> = source.records().collect().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[tokio::test]
    async fn test_id_mode_batches_info_requests() {
        let server = MockServer::start().await;
        let session = session(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/info"))
            .and(query_param("id", "t3_x,t3_y"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(listing(None, vec![link("x"), link("y")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mode = SourceMode::Ids(vec!["t3_x".into(), "t3_y".into()]);
        let source = RedditSource::new(session, mode);
        let ids: Vec<String> = source
            .records()
            .map(|r| r.unwrap().id)
            .collect()
            .await;
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_fetch_post_not_found() {
        let server = MockServer::start().await;
        let session = session(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/info"))
            .and(query_param("id", "t3_gone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(None, vec![])))
            .mount(&server)
            .await;

        let source = RedditSource::new(session, SourceMode::Saved);
        let err = source.fetch_post("gone").await.unwrap_err();
        assert!(err.to_string().contains("gone"));
    }
}
