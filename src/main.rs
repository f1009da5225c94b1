//! geddit: archive your saved Reddit posts and their media.
//!
//! Saved posts are resolved to their media (following cross-posts, falling
//! back to the Pushshift archive for removed posts, expanding galleries and
//! Imgur albums) and downloaded with bounded concurrency. A JSON registry
//! records what was archived and what failed, checkpointed so an interrupted
//! run can resume where it left off.

#![warn(clippy::all)]

mod cli;
mod config;
mod download;
mod pipeline;
mod prune;
mod reddit;
mod registry;
mod resolve;
mod retry;
mod shutdown;
#[cfg(test)]
pub(crate) mod test_helpers;
mod types;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use download::MediaFetcher;
use download::video::{NoVideoTool, VideoFetcher, YtDlp};
use pipeline::{DEFAULT_CHECKPOINT_INTERVAL, Pipeline, PipelineConfig};
use reddit::{RedditSession, RedditSource, SourceMode};
use registry::Registry;
use resolve::Resolver;
use resolve::credentials::CredentialPool;
use resolve::fallback::PushshiftArchive;
use resolve::gallery::{AlbumClient, GalleryResolver};

/// Timeout for archive and album-service API calls.
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the status command.
async fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let data_dir = config::expand_tilde(&args.data_dir);
    let registry = Registry::load(&data_dir, false).await?;

    println!("Registry: {}", registry.completed_path().display());
    println!();
    println!("Posts:");
    println!("  Completed: {}", registry.completed().len());
    println!("  Failed:    {}", registry.failed().len());

    if args.failed && !registry.failed().is_empty() {
        println!();
        println!("Failed posts:");
        for (id, entry) in registry.failed() {
            println!(
                "  {} (r/{}) - {}",
                id,
                entry.subreddit,
                entry.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(())
}

/// Run the prune command.
async fn run_prune(args: cli::PruneArgs) -> anyhow::Result<()> {
    let data_dir = config::expand_tilde(&args.data_dir);
    let bin_dir = args.bin_dir.as_deref().map(config::expand_tilde);
    let removed = prune::prune(&data_dir, bin_dir).await?;
    for id in &removed {
        println!("{id} removed");
    }
    println!("{} removed", removed.len());
    Ok(())
}

/// Run a sync: authenticate, wire the resolver and fetcher, and drive the
/// pipeline over the saved feed or the CSV id list.
async fn run_sync(args: cli::SyncArgs) -> anyhow::Result<()> {
    let config = config::Config::from_cli(args)?;
    tracing::info!(concurrency = config.threads_num, dry_run = config.dry_run, "Starting geddit");

    let shutdown_token = shutdown::install_signal_handler();

    let user_agent = config.user.reddit.user_agent.clone();
    let session = RedditSession::login(&config.user.reddit, &config.endpoints).await?;
    let mode = if config.csv {
        let ids = reddit::ids::load_id_list(&config.csv_path)?;
        tracing::info!(count = ids.len(), "Processing ids from {}", config.csv_path.display());
        SourceMode::Ids(ids)
    } else {
        SourceMode::Saved
    };
    let source = Arc::new(RedditSource::new(session, mode));

    let api_client = reqwest::Client::builder()
        .user_agent(user_agent.as_str())
        .timeout(API_TIMEOUT)
        .build()?;
    let archive = Arc::new(PushshiftArchive::new(api_client.clone(), &config.endpoints.archive));
    let pool = CredentialPool::new(config.user.imgur_client_ids.iter().cloned());
    if pool.is_empty() {
        tracing::warn!("No Imgur client ids configured, album links will fail");
    } else {
        tracing::debug!(keys = pool.len(), "Loaded Imgur client ids");
    }
    let albums = AlbumClient::new(api_client, &config.endpoints.albums, pool);
    let gallery = Arc::new(GalleryResolver::new(source.clone(), archive.clone(), albums));
    let resolver = Resolver::new(source.clone(), archive, gallery.clone());

    let video: Arc<dyn VideoFetcher> = match YtDlp::from_path() {
        Some(tool) => Arc::new(tool),
        None => {
            tracing::warn!("yt-dlp not found on PATH, video posts will fail");
            Arc::new(NoVideoTool)
        }
    };
    let fetcher = MediaFetcher::new(
        download::build_download_client(&user_agent)?,
        config.sources.clone(),
        video,
        gallery,
        config.retry(),
    );

    let registry = Registry::load(&config.data_dir, config.dry_run).await?;
    let pipeline = Pipeline::new(
        registry,
        resolver,
        fetcher,
        PipelineConfig {
            root: config.data_dir.clone(),
            concurrency: usize::from(config.threads_num),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            dry_run: config.dry_run,
            no_progress_bar: config.no_progress_bar,
        },
    );
    pipeline.run(source.as_ref(), shutdown_token).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let verbose = match &cli.command {
        Some(Command::Sync(args)) => args.verbose,
        Some(_) => false,
        None => cli.sync.verbose,
    };
    let filter = if verbose {
        types::LogLevel::Debug.as_filter()
    } else {
        cli.log_level.as_filter()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.effective_command() {
        Command::Sync(args) => run_sync(args).await,
        Command::Status(args) => run_status(args).await,
        Command::Prune(args) => run_prune(args).await,
    }
}
