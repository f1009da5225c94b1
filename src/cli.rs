use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "geddit",
    about = "Archive saved Reddit posts and their media",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Sync options when no subcommand is given
    #[command(flatten)]
    pub sync: SyncArgs,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,
}

impl Cli {
    /// The command to run; a bare invocation syncs.
    pub fn effective_command(self) -> Command {
        self.command.unwrap_or(Command::Sync(self.sync))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download saved posts not yet in the registry (default)
    Sync(SyncArgs),
    /// Show registry counts and, optionally, failed posts
    Status(StatusArgs),
    /// Forget completed posts whose files were moved to the bin directory
    Prune(PruneArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Dry run: resolve and record posts without downloading anything
    #[arg(short = 'd', long = "debug", alias = "dry-run")]
    pub dry_run: bool,

    /// Process the ids listed in the saved-posts CSV instead of the saved feed
    #[arg(long)]
    pub csv: bool,

    /// Log every step (same as --log-level debug)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Directory for downloaded media and registry files
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// Saved-posts export read in --csv mode
    #[arg(long, default_value = "saved_posts.csv")]
    pub csv_path: String,

    /// Credentials file
    #[arg(long, default_value = "user.json", env = "GEDDIT_USER_CONFIG")]
    pub user_config: String,

    /// Optional domain classification file
    #[arg(long, default_value = "sources.json")]
    pub sources: String,

    /// Number of posts processed concurrently
    #[arg(short = 't', long = "threads", default_value_t = 8)]
    pub threads_num: u16,

    /// Retries for transient download failures
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Base delay in seconds between download retries
    #[arg(long, default_value_t = 5)]
    pub retry_delay: u64,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Directory holding the registry files
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// List failed posts with their errors
    #[arg(long)]
    pub failed: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PruneArgs {
    /// Directory holding the registry files
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// Directory whose entries name the posts to forget (default: <data-dir>/_BIN)
    #[arg(long)]
    pub bin_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_invocation_syncs() {
        let cli = Cli::try_parse_from(["geddit", "--debug", "-v"]).unwrap();
        match cli.effective_command() {
            Command::Sync(args) => {
                assert!(args.dry_run);
                assert!(args.verbose);
                assert!(!args.csv);
                assert_eq!(args.threads_num, 8);
            }
            other => panic!("expected sync, got {other:?}"),
        }
    }

    #[test]
    fn test_status_subcommand() {
        let cli = Cli::try_parse_from(["geddit", "status", "--failed"]).unwrap();
        assert!(matches!(
            cli.effective_command(),
            Command::Status(StatusArgs { failed: true, .. })
        ));
    }

    #[test]
    fn test_dry_run_alias() {
        let cli = Cli::try_parse_from(["geddit", "sync", "--dry-run", "--csv"]).unwrap();
        match cli.effective_command() {
            Command::Sync(args) => assert!(args.dry_run && args.csv),
            other => panic!("expected sync, got {other:?}"),
        }
    }
}
