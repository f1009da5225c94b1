use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

use crate::retry::RetryConfig;

const DEFAULT_USER_AGENT: &str = "geddit saved posts backup utility";

/// Service base URLs. Overridable so tests can point at mock servers.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub reddit_token: String,
    pub reddit_api: String,
    pub archive: String,
    pub albums: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            reddit_token: "https://www.reddit.com/api/v1/access_token".to_string(),
            reddit_api: "https://oauth.reddit.com".to_string(),
            archive: "https://api.pushshift.io".to_string(),
            albums: "https://api.imgur.com".to_string(),
        }
    }
}

/// Script-app credentials for the Reddit API.
#[derive(Clone, Deserialize)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct UserFile {
    reddit: RedditCredentials,
    imgur: ImgurSection,
}

#[derive(Deserialize)]
struct ImgurSection {
    client_id: Value,
}

/// Credentials read from the user config file.
#[derive(Debug, Clone)]
pub struct UserConfig {
    pub reddit: RedditCredentials,
    pub imgur_client_ids: Vec<String>,
}

impl UserConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let file: UserFile = serde_json::from_str(text)?;
        // Older files held a single key; rotation needs a list.
        let imgur_client_ids = match file.imgur.client_id {
            Value::Array(items) => items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s),
                    other => anyhow::bail!("Imgur client id must be a string, got {}", other),
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
            _ => anyhow::bail!(
                "imgur.client_id must be a list of keys; update the user config format"
            ),
        };
        Ok(Self {
            reddit: file.reddit,
            imgur_client_ids,
        })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read user config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid user config {}", path.display()))
    }
}

/// Domain lists that decide how a post's media is fetched.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDomains {
    #[serde(default)]
    pub vid: Vec<String>,
    #[serde(default)]
    pub img: Vec<String>,
}

impl Default for SourceDomains {
    fn default() -> Self {
        let vid = [
            "v.redd.it",
            "youtube.com",
            "www.youtube.com",
            "m.youtube.com",
            "youtu.be",
            "gfycat.com",
            "redgifs.com",
            "www.redgifs.com",
            "v3.redgifs.com",
            "streamable.com",
            "clips.twitch.tv",
            "vimeo.com",
        ];
        let img = [
            "i.redd.it",
            "preview.redd.it",
            "reddit.com",
            "www.reddit.com",
            "old.reddit.com",
            "imgur.com",
            "i.imgur.com",
            "m.imgur.com",
        ];
        Self {
            vid: vid.iter().map(|s| s.to_string()).collect(),
            img: img.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SourceDomains {
    /// Load the domain file, falling back to built-in lists when it is absent.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("No {} found, using built-in domain lists", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid domain file {}", path.display()))
    }

    pub fn is_video(&self, source: &str) -> bool {
        self.vid.iter().any(|d| d == source)
    }

    pub fn is_image(&self, source: &str) -> bool {
        self.img.iter().any(|d| d == source)
    }
}

/// Application configuration for a sync run.
///
/// Heap types first, then numbers, booleans grouped at the end.
pub struct Config {
    pub data_dir: PathBuf,
    pub csv_path: PathBuf,
    pub user: UserConfig,
    pub sources: SourceDomains,
    pub endpoints: Endpoints,

    pub retry_delay_secs: u64,
    pub max_retries: u32,
    pub threads_num: u16,

    pub dry_run: bool,
    pub csv: bool,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("csv_path", &self.csv_path)
            .field("user", &self.user)
            .field("threads_num", &self.threads_num)
            .field("dry_run", &self.dry_run)
            .field("csv", &self.csv)
            .finish_non_exhaustive()
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(args: crate::cli::SyncArgs) -> anyhow::Result<Self> {
        if args.threads_num == 0 {
            anyhow::bail!("--threads must be at least 1");
        }
        let user = UserConfig::load(&expand_tilde(&args.user_config))?;
        let sources = SourceDomains::load_or_default(&expand_tilde(&args.sources))?;

        Ok(Self {
            data_dir: expand_tilde(&args.data_dir),
            csv_path: expand_tilde(&args.csv_path),
            user,
            sources,
            endpoints: Endpoints::default(),
            retry_delay_secs: args.retry_delay,
            max_retries: args.max_retries,
            threads_num: args.threads_num,
            dry_run: args.dry_run,
            csv: args.csv,
            no_progress_bar: args.no_progress_bar,
        })
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_secs: self.retry_delay_secs,
            max_delay_secs: 60,
        }
    }
}
