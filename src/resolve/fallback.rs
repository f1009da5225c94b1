use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::reddit::RawPost;
use crate::reddit::ids::strip_prefix;

const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Historical archive of posts, consulted when the live record is
/// incomplete (removed, or missing its link).
#[async_trait]
pub trait ArchiveLookup: Send + Sync {
    /// The archived record for `id`, or `None` on any failure.
    async fn lookup(&self, id: &str) -> Option<RawPost>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<RawPost>,
}

/// Pushshift submission search.
#[derive(Debug, Clone)]
pub struct PushshiftArchive {
    client: Client,
    base: String,
}

impl PushshiftArchive {
    pub fn new(client: Client, base: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    async fn search(&self, id: &str) -> anyhow::Result<Option<RawPost>> {
        let url = format!("{}/reddit/search/submission", self.base);
        let response = self
            .client
            .get(&url)
            .query(&[("ids", id)])
            .timeout(ARCHIVE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        let body: SearchResponse = response.json().await?;
        Ok(body.data.into_iter().next())
    }
}

#[async_trait]
impl ArchiveLookup for PushshiftArchive {
    async fn lookup(&self, id: &str) -> Option<RawPost> {
        let id = strip_prefix(id);
        tracing::debug!(%id, "Looking up post in the archive");
        match self.search(id).await {
            Ok(found) => {
                if found.is_none() {
                    tracing::debug!(%id, "Archive has no record");
                }
                found
            }
            Err(e) => {
                tracing::debug!(%id, "Archive lookup failed: {:#}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_lookup_returns_first_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reddit/search/submission"))
            .and(query_param("ids", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "abc", "domain": "i.redd.it", "url": "https://i.redd.it/abc.jpg"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let archive = PushshiftArchive::new(Client::new(), &server.uri());
        let post = archive.lookup("t3_abc").await.unwrap();
        assert_eq!(post.url, "https://i.redd.it/abc.jpg");
    }

    #[tokio::test]
    async fn test_empty_result_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let archive = PushshiftArchive::new(Client::new(), &server.uri());
        assert!(archive.lookup("abc").await.is_none());
    }

    #[tokio::test]
    async fn test_service_error_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let archive = PushshiftArchive::new(Client::new(), &server.uri());
        assert!(archive.lookup("abc").await.is_none());
    }
}
