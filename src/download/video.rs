use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use super::error::FetchError;

/// Fetches a video page or stream into a local file.
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    /// Save the video at `url` to `dest` plus whatever extension the tool picks.
    async fn fetch_video(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// `yt-dlp` invoked as a subprocess, recoding output to mp4.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary_path: PathBuf,
}

impl YtDlp {
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Locate `yt-dlp` on `PATH`.
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }
}

#[async_trait]
impl VideoFetcher for YtDlp {
    async fn fetch_video(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut template = dest.as_os_str().to_os_string();
        template.push(".%(ext)s");

        tracing::debug!(%url, "Running {}", self.binary_path.display());
        let output = Command::new(&self.binary_path)
            .arg("-o")
            .arg(&template)
            .args(["--recode-video", "mp4", "--quiet", "--no-warnings"])
            .arg(url)
            .output()
            .await
            .map_err(|e| {
                FetchError::Video(format!(
                    "failed to execute {}: {}",
                    self.binary_path.display(),
                    e
                ))
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("no output")
            .trim()
            .to_string();
        Err(FetchError::Video(format!("{} ({})", reason, output.status)))
    }
}

/// Stand-in used when no video tool is installed; every video post fails
/// with an explanatory error instead of aborting the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVideoTool;

#[async_trait]
impl VideoFetcher for NoVideoTool {
    async fn fetch_video(&self, url: &str, _dest: &Path) -> Result<(), FetchError> {
        Err(FetchError::Video(format!(
            "yt-dlp not found on PATH, cannot fetch {url}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_video_error() {
        let tool = YtDlp::new(PathBuf::from("/nonexistent/yt-dlp-xyz"));
        let dir = tempfile::tempdir().unwrap();
        let err = tool
            .fetch_video("https://v.redd.it/abc", &dir.path().join("clip"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Video(ref m) if m.contains("failed to execute")));
    }

    #[tokio::test]
    async fn test_no_video_tool_fails() {
        let err = NoVideoTool
            .fetch_video("https://v.redd.it/abc", Path::new("x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("yt-dlp not found"));
    }

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_passes_output_template_and_url() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args.txt");
        let bin = script(dir.path(), &format!("echo \"$@\" > {}", log.display()));
        let dest = dir.path().join("videos").join("clip");

        YtDlp::new(bin)
            .fetch_video("https://v.redd.it/abc", &dest)
            .await
            .unwrap();

        let args = std::fs::read_to_string(&log).unwrap();
        assert!(args.contains(&format!("-o {}.%(ext)s", dest.display())));
        assert!(args.contains("--recode-video mp4"));
        assert!(args.trim_end().ends_with("https://v.redd.it/abc"));
        assert!(dir.path().join("videos").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "echo 'ERROR: Unsupported URL' >&2; exit 1");
        let err = YtDlp::new(bin)
            .fetch_video("https://example.com/v", &dir.path().join("clip"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported URL"));
    }
}
