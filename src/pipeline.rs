//! Sync coordinator: pulls records from a [`ContentSource`], skips ones
//! already archived, resolves and fetches the rest with bounded concurrency,
//! and records every outcome in the [`Registry`].
//!
//! Worker futures only compute an [`Outcome`]; this loop is the single
//! writer of the registry and of its checkpoint files.

use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Instant;

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::download::MediaFetcher;
use crate::reddit::{ContentSource, RawPost};
use crate::registry::{Entry, Registry};
use crate::resolve::{Resolver, entry_from_record};

/// Outcomes recorded between two checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 50;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Media root; the registry files live here too.
    pub root: PathBuf,
    pub concurrency: usize,
    pub checkpoint_interval: usize,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub added: usize,
    pub failed: usize,
    pub skipped: usize,
}

enum Work {
    Skip { id: String, subreddit: String },
    Process(RawPost),
}

enum Outcome {
    Skipped { id: String, subreddit: String },
    Added(Entry),
    Failed(Entry),
}

/// `[T: total][A: added][F: failed][S: skipped] message`
fn status_line(total: usize, stats: &RunStats, message: &str) -> String {
    format!(
        "[T: {}][A: {}][F: {}][S: {}] {}",
        total, stats.added, stats.failed, stats.skipped, message
    )
}

fn create_progress_bar(disabled: bool) -> ProgressBar {
    if disabled || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {pos} posts {wide_msg}")
    {
        pb.set_style(style);
    }
    pb
}

async fn process_post(
    resolver: &Resolver,
    fetcher: &MediaFetcher,
    root: &Path,
    dry_run: bool,
    post: RawPost,
) -> Outcome {
    let entry = match resolver.resolve(&post).await {
        Ok(entry) => entry,
        Err(e) => {
            let mut entry = entry_from_record(&post);
            entry.error = Some(format!("{e:#}"));
            return Outcome::Failed(entry);
        }
    };
    if dry_run {
        return Outcome::Added(entry);
    }
    match fetcher.fetch(&entry, root).await {
        Ok(class) => {
            tracing::debug!(id = %entry.id, class = class.as_str(), "Fetched");
            Outcome::Added(entry)
        }
        Err(e) => {
            let mut entry = entry;
            entry.error = Some(e.to_string());
            Outcome::Failed(entry)
        }
    }
}

pub struct Pipeline {
    registry: Registry,
    resolver: Resolver,
    fetcher: MediaFetcher,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        registry: Registry,
        resolver: Resolver,
        fetcher: MediaFetcher,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            resolver,
            fetcher,
            config,
        }
    }

    /// Process every record `source` yields, then write the registry.
    ///
    /// Per-post failures are recorded, never returned. Errors come only from
    /// registry or destination I/O. Cancelling `shutdown` stops pulling new
    /// records; in-flight posts finish and the registry is still written.
    pub async fn run(
        self,
        source: &dyn ContentSource,
        shutdown: CancellationToken,
    ) -> anyhow::Result<RunStats> {
        let Pipeline {
            mut registry,
            resolver,
            fetcher,
            config,
        } = self;
        let started = Instant::now();

        tokio::fs::create_dir_all(&config.root).await?;

        let pb = create_progress_bar(config.no_progress_bar);
        pb.suspend(|| {
            tracing::info!(
                "{}",
                status_line(registry.completed().len(), &RunStats::default(), "Initialized!")
            )
        });

        let known = registry.completed_ids();
        let mut seen: HashSet<String> = HashSet::new();
        let resolver = &resolver;
        let fetcher = &fetcher;
        let root = config.root.as_path();
        let dry_run = config.dry_run;
        let pb_ref = &pb;
        let shutdown_ref = &shutdown;

        let outcomes = source
            .records()
            .take_while(move |record| {
                let keep = match record {
                    Ok(_) => !shutdown_ref.is_cancelled(),
                    Err(e) => {
                        pb_ref.suspend(|| tracing::error!("Stopped reading saved posts: {:#}", e));
                        false
                    }
                };
                std::future::ready(keep)
            })
            .filter_map(|record| std::future::ready(record.ok()))
            .map(move |post| {
                let duplicate = known.contains(&post.id) || !seen.insert(post.id.clone());
                if duplicate {
                    Work::Skip {
                        id: post.id,
                        subreddit: post.subreddit,
                    }
                } else {
                    Work::Process(post)
                }
            })
            .map(move |work| async move {
                match work {
                    Work::Skip { id, subreddit } => Outcome::Skipped { id, subreddit },
                    Work::Process(post) => {
                        process_post(resolver, fetcher, root, dry_run, post).await
                    }
                }
            })
            .buffer_unordered(config.concurrency.max(1));
        tokio::pin!(outcomes);

        let mut stats = RunStats::default();
        let mut since_checkpoint = 0usize;

        while let Some(outcome) = outcomes.next().await {
            let message = match outcome {
                Outcome::Skipped { id, subreddit } => {
                    stats.skipped += 1;
                    let subreddit = registry
                        .completed()
                        .get(&id)
                        .map(|e| e.subreddit.clone())
                        .unwrap_or(subreddit);
                    format!("Skipped post {id} from r/{subreddit} - already in database")
                }
                Outcome::Added(entry) => {
                    stats.added += 1;
                    since_checkpoint += 1;
                    let message = format!("Added post {} from r/{}", entry.id, entry.subreddit);
                    registry.record_completed(entry);
                    message
                }
                Outcome::Failed(entry) => {
                    stats.failed += 1;
                    since_checkpoint += 1;
                    let message = format!(
                        "Failed to add post {} from r/{}: {}",
                        entry.id,
                        entry.subreddit,
                        entry.error.as_deref().unwrap_or("unknown error")
                    );
                    registry.record_failed(entry);
                    message
                }
            };
            pb.suspend(|| {
                tracing::info!("{}", status_line(registry.completed().len(), &stats, &message))
            });
            pb.inc(1);

            if since_checkpoint >= config.checkpoint_interval {
                since_checkpoint = 0;
                let (temp_path, _) = registry.temp_paths();
                pb.suspend(|| tracing::debug!("Checkpointing registry to {}", temp_path.display()));
                registry.checkpoint().await?;
            }
        }
        pb.finish_and_clear();

        if shutdown.is_cancelled() {
            tracing::info!("Interrupted, saving progress");
        }
        tracing::info!(
            "{}",
            status_line(registry.completed().len(), &stats, "Saving items to JSON...")
        );
        registry.flush().await?;

        tracing::info!("── Summary ──");
        tracing::info!(
            "  {} added, {} failed, {} skipped in {:.1}s",
            stats.added,
            stats.failed,
            stats.skipped,
            started.elapsed().as_secs_f64()
        );
        if dry_run {
            tracing::info!("  dry run: nothing was downloaded");
        }
        Ok(stats)
    }
}
