use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "strand",
    about = "Strand: content-addressed, event-sourced message store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Store directory; overrides `data_dir` from the config file
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Configuration file (defaults to `<data-dir>/strand.toml` when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a store and write its default configuration
    Init(InitArgs),
    /// Show store counts
    Status(StatusArgs),
    /// Post a message from the command line
    Post(PostArgs),
    /// Import source records (one JSON object per line)
    Import(ImportArgs),
    /// Show a message
    Show(ShowArgs),
    /// List threads, or the messages of one thread
    Thread(ThreadArgs),
    /// Show recent messages across all threads
    Timeline(TimelineArgs),
    /// List accounts
    Accounts(AccountsArgs),
    /// Search messages
    Search(SearchArgs),
    /// Verify thread integrity against stored content
    Verify(VerifyArgs),
    /// Show the proof path from a thread root to a message
    Proof(ProofArgs),
    /// Rebuild projections from the event log
    Rebuild(RebuildArgs),
    /// Take or discard aggregate snapshots
    Snapshot(SnapshotArgs),
    /// List events in log order
    Events(EventsArgs),
    /// Generate an Ed25519 signing key
    Keygen(KeygenArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct StatusArgs {}

#[derive(Args)]
pub struct PostArgs {
    pub content: String,
    /// Native thread id on the platform
    #[arg(short, long)]
    pub thread: String,
    /// Author handle on the platform
    #[arg(short, long)]
    pub author: String,
    #[arg(long, default_value = "cli")]
    pub platform: String,
    #[arg(long, default_value = "text")]
    pub kind: String,
    #[arg(long)]
    pub reply_to: Option<String>,
    /// `key=value` tag, repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Sign with the hex-encoded key in this file
    #[arg(long)]
    pub key: Option<PathBuf>,
}

#[derive(Args)]
pub struct ImportArgs {
    /// File to read, or `-` for stdin
    pub path: PathBuf,
    /// Skip records that fail instead of stopping
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    pub message: String,
    /// Print the stored identity bytes instead of the message
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args)]
pub struct ThreadArgs {
    pub thread: Option<String>,
    #[arg(long, default_value = "0")]
    pub offset: usize,
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
}

#[derive(Args)]
pub struct TimelineArgs {
    #[arg(long, default_value = "0")]
    pub offset: usize,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct AccountsArgs {}

#[derive(Args)]
pub struct SearchArgs {
    pub query: String,
    /// lexical, semantic or hybrid
    #[arg(long, default_value = "hybrid")]
    pub mode: String,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(long)]
    pub thread: Option<String>,
    #[arg(long)]
    pub account: Option<String>,
    #[arg(long)]
    pub kind: Option<String>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Thread to verify; every thread when omitted
    pub thread: Option<String>,
}

#[derive(Args)]
pub struct ProofArgs {
    pub message: String,
}

#[derive(Args)]
pub struct RebuildArgs {
    /// Projection to rebuild; every projection when omitted
    pub projection: Option<String>,
}

#[derive(Args)]
pub struct SnapshotArgs {
    /// Message aggregate to snapshot
    pub message: Option<String>,
    /// Delete every snapshot
    #[arg(long, conflicts_with = "message")]
    pub clear: bool,
}

#[derive(Args)]
pub struct EventsArgs {
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
}

#[derive(Args)]
pub struct KeygenArgs {
    /// Where to write the key
    pub out: PathBuf,
}
