use thiserror::Error;

/// Errors from fetching a post's media.
///
/// [`FetchError::is_retryable`] separates transient failures (rate limits,
/// server errors, dropped connections) from ones that will fail the same way
/// on every attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Request for {url} failed: {source}")]
    Http {
        source: reqwest::Error,
        url: String,
    },

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("No file extension for content type {content_type:?} at {url}")]
    UnknownContentType { content_type: String, url: String },

    #[error("Unknown domain {source_domain}: {url} is neither an image nor a video")]
    UnrecognizedSource { source_domain: String, url: String },

    #[error("Post has no url to fetch")]
    IncompleteData,

    #[error("Album {0} resolved to no media")]
    EmptyAlbum(String),

    #[error("Video download failed: {0}")]
    Video(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            FetchError::Http { .. } => true,
            FetchError::Disk(_)
            | FetchError::UnknownContentType { .. }
            | FetchError::UnrecognizedSource { .. }
            | FetchError::IncompleteData
            | FetchError::EmptyAlbum(_)
            | FetchError::Video(_)
            | FetchError::Other(_) => false,
        }
    }
}
