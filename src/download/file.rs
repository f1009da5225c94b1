use std::fs::FileTimes;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::error::FetchError;
use super::paths::{extension_for_content_type, with_extension};
use crate::retry::{self, RetryAction, RetryConfig};

/// Write buffer for streamed downloads.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Timeout for content-type probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Declared content type of `url`, from a HEAD request.
///
/// Returns an empty string when the server does not send one. A
/// non-success status is an error whatever the declared type.
pub async fn probe_content_type(client: &Client, url: &str) -> Result<String, FetchError> {
    let response = client
        .head(url)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .map_err(|e| FetchError::Http {
            source: e,
            url: url.to_string(),
        })?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(header_str(&response, CONTENT_TYPE))
}

fn header_str(response: &reqwest::Response, name: reqwest::header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Download `url` to `dest` plus an extension derived from the response's
/// content type, retrying transient failures.
///
/// Bytes go to a `.part` file that is renamed into place once complete, so an
/// interrupted download never leaves a truncated file at the final path.
/// The finished file's mtime is set to `created` (epoch seconds) when given.
pub async fn fetch_to(
    client: &Client,
    url: &str,
    dest: &Path,
    created: Option<f64>,
    retry_config: &RetryConfig,
) -> Result<PathBuf, FetchError> {
    let label = format!("GET {url}");
    let path = retry::retry_with_backoff(
        retry_config,
        &label,
        |e: &FetchError| {
            if e.is_retryable() {
                RetryAction::Retry
            } else {
                RetryAction::Abort
            }
        },
        || attempt_fetch(client, url, dest),
    )
    .await?;

    if let Some(ts) = created {
        let mtime_path = path.clone();
        match tokio::task::spawn_blocking(move || set_file_mtime(&mtime_path, ts)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("Could not set mtime on {}: {}", path.display(), e),
            Err(e) => tracing::debug!("mtime task for {} failed: {}", path.display(), e),
        }
    }
    Ok(path)
}

async fn attempt_fetch(client: &Client, url: &str, dest: &Path) -> Result<PathBuf, FetchError> {
    let http_err = |e| FetchError::Http {
        source: e,
        url: url.to_string(),
    };
    let response = client.get(url).send().await.map_err(http_err)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let content_type = header_str(&response, CONTENT_TYPE);
    let ext = extension_for_content_type(&content_type).ok_or_else(|| {
        FetchError::UnknownContentType {
            content_type: content_type.clone(),
            url: url.to_string(),
        }
    })?;
    let final_path = with_extension(dest, &ext);
    let part_path = with_extension(&final_path, "part");

    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let file = fs::File::create(&part_path).await?;
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(bytes = written, "Body stream error for {}: {}", url, e);
                drop(writer);
                let _ = fs::remove_file(&part_path).await;
                return Err(http_err(e));
            }
        };
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.flush().await?;
    drop(writer);

    fs::rename(&part_path, &final_path).await?;
    tracing::debug!(bytes = written, "Saved {}", final_path.display());
    Ok(final_path)
}

fn set_file_mtime(path: &Path, timestamp: f64) -> std::io::Result<()> {
    let time = if timestamp >= 0.0 {
        UNIX_EPOCH + Duration::from_secs_f64(timestamp)
    } else {
        UNIX_EPOCH
            .checked_sub(Duration::from_secs_f64(-timestamp))
            .unwrap_or(SystemTime::UNIX_EPOCH)
    };
    let times = FileTimes::new().set_modified(time).set_accessed(time);
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_times(times)
}
