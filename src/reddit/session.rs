use std::time::{Duration, Instant};

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use super::error::RedditError;
use crate::config::{Endpoints, RedditCredentials};

/// Timeout applied to every Reddit API call.
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifetime assumed when the token endpoint does not report one.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Tokens this close to expiry are renewed before use.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}

/// Authenticated Reddit API session (script-app password grant).
///
/// The bearer token is renewed with the same credentials when it nears
/// expiry or the API rejects it, so a run can outlive a single token.
pub struct RedditSession {
    client: Client,
    token_url: String,
    api_base: String,
    credentials: RedditCredentials,
    token: RwLock<AccessToken>,
}

impl std::fmt::Debug for RedditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditSession")
            .field("api_base", &self.api_base)
            .field("username", &self.credentials.username)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

async fn request_token(
    client: &Client,
    token_url: &str,
    credentials: &RedditCredentials,
) -> Result<AccessToken, RedditError> {
    let response = client
        .post(token_url)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(&[
            ("grant_type", "password"),
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(RedditError::Auth(format!("token endpoint returned HTTP {status}")));
    }

    // Bad credentials come back as 200 with an `error` field.
    let body: TokenResponse = response.json().await?;
    let value = match (body.access_token, body.error) {
        (Some(token), _) => token,
        (None, Some(error)) => return Err(RedditError::Auth(error)),
        (None, None) => return Err(RedditError::Auth("no access token in response".into())),
    };
    let lifetime = body
        .expires_in
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TOKEN_LIFETIME);
    Ok(AccessToken {
        value,
        expires_at: Instant::now() + lifetime,
    })
}

impl RedditSession {
    /// Exchange the script-app credentials for a bearer token.
    pub async fn login(
        credentials: &RedditCredentials,
        endpoints: &Endpoints,
    ) -> Result<Self, RedditError> {
        let client = Client::builder()
            .user_agent(credentials.user_agent.as_str())
            .timeout(API_TIMEOUT)
            .build()?;
        let token = request_token(&client, &endpoints.reddit_token, credentials).await?;

        tracing::info!(username = %credentials.username, "Authenticated with Reddit");
        Ok(Self {
            client,
            token_url: endpoints.reddit_token.clone(),
            api_base: endpoints.reddit_api.trim_end_matches('/').to_string(),
            credentials: credentials.clone(),
            token: RwLock::new(token),
        })
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Current bearer token, renewed first if it is about to expire.
    async fn bearer(&self) -> Result<String, RedditError> {
        {
            let token = self.token.read().await;
            if token.is_fresh() {
                return Ok(token.value.clone());
            }
        }
        let mut token = self.token.write().await;
        if !token.is_fresh() {
            tracing::info!("Reddit token expiring, re-authenticating");
            *token = request_token(&self.client, &self.token_url, &self.credentials).await?;
        }
        Ok(token.value.clone())
    }

    /// Replace `rejected` with a new token. Concurrent callers that were
    /// rejected with the same token share one renewal.
    async fn renew(&self, rejected: &str) -> Result<String, RedditError> {
        let mut token = self.token.write().await;
        if token.value == rejected {
            tracing::info!("Reddit rejected the token, re-authenticating");
            *token = request_token(&self.client, &self.token_url, &self.credentials).await?;
        }
        Ok(token.value.clone())
    }

    async fn send_get(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, &str)],
    ) -> Result<Response, RedditError> {
        Ok(self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?)
    }

    /// GET an API path and decode the JSON body.
    ///
    /// A 401 renews the token and retries the request once.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RedditError> {
        let url = format!("{}{}", self.api_base, path);
        tracing::debug!(%url, ?query, "Reddit API request");
        let token = self.bearer().await?;
        let mut response = self.send_get(&url, &token, query).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let token = self.renew(&token).await?;
            response = self.send_get(&url, &token, query).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(RedditError::ApiStatus {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> RedditCredentials {
        RedditCredentials {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            username: "me".into(),
            password: "pw".into(),
            user_agent: "test-agent".into(),
        }
    }

    fn endpoints(server: &MockServer) -> Endpoints {
        Endpoints {
            reddit_token: format!("{}/api/v1/access_token", server.uri()),
            reddit_api: server.uri(),
            ..Endpoints::default()
        }
    }

    #[tokio::test]
    async fn test_login_and_authorized_get() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .and(body_string_contains("grant_type=password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/info"))
            .and(header("authorization", "Bearer tok"))
            .and(query_param("id", "t3_abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let session = RedditSession::login(&credentials(), &endpoints(&server))
            .await
            .unwrap();
        let body: Value = session.get_json("/api/info", &[("id", "t3_abc")]).await.unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_login_rejects_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let err = RedditSession::login(&credentials(), &endpoints(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, RedditError::Auth(ref m) if m == "invalid_grant"));
    }

    #[tokio::test]
    async fn test_get_non_success_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/me/saved"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let session = RedditSession::login(&credentials(), &endpoints(&server))
            .await
            .unwrap();
        let err = session
            .get_json::<Value>("/user/me/saved", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RedditError::ApiStatus { status: 503, .. }));
    }

    fn token_body(token: &str, expires_in: u64) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(json!({"access_token": token, "expires_in": expires_in}))
    }

    #[tokio::test]
    async fn test_rejected_token_is_renewed_and_request_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(token_body("old", 3600))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(token_body("new", 3600))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/info"))
            .and(header("authorization", "Bearer old"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/info"))
            .and(header("authorization", "Bearer new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(2)
            .mount(&server)
            .await;

        let session = RedditSession::login(&credentials(), &endpoints(&server))
            .await
            .unwrap();
        let body: Value = session.get_json("/api/info", &[]).await.unwrap();
        assert_eq!(body["ok"], true);
        // The renewed token is kept for later calls.
        let _: Value = session.get_json("/api/info", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_expiring_token_is_renewed_before_use() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(token_body("short", 0))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(token_body("long", 3600))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer short"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/info"))
            .and(header("authorization", "Bearer long"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let session = RedditSession::login(&credentials(), &endpoints(&server))
            .await
            .unwrap();
        let body: Value = session.get_json("/api/info", &[]).await.unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_second_rejection_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(token_body("tok", 3600))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let session = RedditSession::login(&credentials(), &endpoints(&server))
            .await
            .unwrap();
        let err = session.get_json::<Value>("/api/info", &[]).await.unwrap_err();
        assert!(matches!(err, RedditError::ApiStatus { status: 401, .. }));
    }
}
