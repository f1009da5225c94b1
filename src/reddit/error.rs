use thiserror::Error;

/// Errors from the Reddit API client.
#[derive(Debug, Error)]
pub enum RedditError {
    #[error("Reddit authentication failed: {0}")]
    Auth(String),

    #[error("Reddit API returned HTTP {status} for {path}")]
    ApiStatus { status: u16, path: String },

    #[error("Post {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
