//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Collect Reddit posts and comment trees for labeling datasets.
///
/// Credentials are read from REDDIT_CLIENT_ID, REDDIT_CLIENT_SECRET,
/// REDDIT_USERNAME and REDDIT_PASSWORD (a `.env` file is loaded if present).
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory receiving batch files
    #[arg(short, long, global = true, default_value = "data/raw")]
    pub output_dir: PathBuf,

    /// Items requested per listing page (1-100)
    #[arg(long, global = true, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub page_size: u32,

    /// Pause between listing pages in milliseconds
    #[arg(long, global = true, default_value_t = 2000)]
    pub page_delay_ms: u64,

    /// Pause between entities in milliseconds
    #[arg(long, global = true, default_value_t = 5000)]
    pub entity_delay_ms: u64,

    /// Wait after a rate-limit response in seconds
    #[arg(long, global = true, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub cooldown_secs: u64,

    /// Rate-limit retries per request before skipping the entity (0-20)
    #[arg(short = 'r', long, global = true, default_value_t = 5, value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_retries: u32,

    /// Minimum delay between any two requests in milliseconds (0 to disable, max 60000)
    #[arg(short = 'l', long, global = true, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub rate_limit: u64,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Collect the newest posts of one or more subreddits
    Subreddit(SubredditArgs),

    /// Collect submissions and/or comments of one or more users
    User(UserArgs),

    /// Collect the activity of every moderator of one or more subreddits
    Moderators(ModeratorArgs),

    /// Merge batch files into one deduplicated JSON file
    Combine(CombineArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SubredditArgs {
    /// Subreddit names (without the r/ prefix)
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Maximum posts per subreddit
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub limit: usize,

    /// Also collect the full comment tree of every post
    #[arg(long)]
    pub comments: bool,

    /// Cap on "load more" requests per post (default: expand everything)
    #[arg(long, requires = "comments")]
    pub expand_limit: Option<usize>,

    /// Leave out replies written by this account
    #[arg(long, requires = "comments")]
    pub exclude_author: Option<String>,

    /// Resume after this listing cursor (e.g. t3_abc123); single subreddit only
    #[arg(long)]
    pub after: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ActivityArgs {
    /// Maximum items per listing
    #[arg(short = 'n', long, default_value_t = 1000, conflicts_with = "all")]
    pub limit: usize,

    /// Collect every item the listing exposes
    #[arg(long)]
    pub all: bool,

    /// Collect submissions only
    #[arg(long, conflicts_with = "comments")]
    pub posts: bool,

    /// Collect comments only
    #[arg(long)]
    pub comments: bool,
}

impl ActivityArgs {
    /// Item target per listing.
    #[must_use]
    pub fn target(&self) -> usize {
        if self.all { usize::MAX } else { self.limit }
    }

    /// Whether submissions are collected (default: both listings).
    #[must_use]
    pub fn wants_posts(&self) -> bool {
        self.posts || !self.comments
    }

    /// Whether comments are collected (default: both listings).
    #[must_use]
    pub fn wants_comments(&self) -> bool {
        self.comments || !self.posts
    }
}

#[derive(Args, Debug, Clone)]
pub struct UserArgs {
    /// User names (without the u/ prefix)
    #[arg(required = true)]
    pub names: Vec<String>,

    #[command(flatten)]
    pub activity: ActivityArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ModeratorArgs {
    /// Subreddits whose moderators are collected
    #[arg(required = true)]
    pub subreddits: Vec<String>,

    #[command(flatten)]
    pub activity: ActivityArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CombineArgs {
    /// Directory containing batch files
    #[arg(short, long, default_value = "data/raw")]
    pub input: PathBuf,

    /// Combined output file
    #[arg(short = 'O', long, default_value = "data/combined.json")]
    pub output: PathBuf,
}
