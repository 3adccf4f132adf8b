//! Command-line interface definitions.
//!
//! # Example
//!
//! ```bash
//! # Fingerprint everything under two roots
//! safedupe index ~/Downloads ~/Documents --session ~/.safedupe-index.json
//!
//! # See what would be removed
//! safedupe preview ~/Downloads
//!
//! # Back up and remove, at most 20 files
//! safedupe execute ~/Downloads --max-deletions 20 --yes
//!
//! # Undo a deletion
//! safedupe restore 17
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::Profile;
use crate::realtime::EventKind;

/// Content-addressed duplicate finder with backup-before-delete.
///
/// safedupe fingerprints files with BLAKE3, groups identical content, scores
/// how safe each group is to clean up, and only ever deletes after a
/// verified backup has been recorded in an auditable ledger.
#[derive(Debug, Parser)]
#[command(name = "safedupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE", env = "SAFEDUPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Built-in policy preset used beneath the configuration file
    #[arg(long, global = true, value_enum, default_value = "standard")]
    pub profile: ProfileArg,

    /// Fingerprint database (overrides the configuration)
    #[arg(long, global = true, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Backup directory (overrides the configuration)
    #[arg(long, global = true, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Print errors as JSON objects on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fingerprint every file under the given roots
    Index(IndexArgs),
    /// Show the duplicate groups and what executing would remove
    Preview(PreviewArgs),
    /// Back up and remove redundant copies
    Execute(ExecuteArgs),
    /// Restore a deleted file from its backup
    Restore(RecordArgs),
    /// Confirm a deletion so older backups of its group can be purged
    Confirm(RecordArgs),
    /// Purge confirmed backups older than the retention window
    Sweep(SweepArgs),
    /// List deletion records, newest first
    History(HistoryArgs),
    /// Check a single file against the store, as a watcher would
    Observe(ObserveArgs),
    /// Print the effective configuration as TOML
    Config,
}

/// Arguments for `index`.
#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Roots to index
    #[arg(value_name = "PATHS", required = true)]
    pub paths: Vec<PathBuf>,

    /// Skip the first N files of the ordered universe
    #[arg(long, value_name = "N", conflicts_with = "session")]
    pub resume_from: Option<usize>,

    /// Session file; created if missing, resumed if present
    #[arg(long, value_name = "FILE")]
    pub session: Option<PathBuf>,

    /// Files per batch (overrides the configuration)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub batch_size: Option<u64>,

    /// Do not pause between batches
    #[arg(long)]
    pub no_pacing: bool,

    /// Ignore files smaller than this (e.g. 1KB, 1MiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Extra gitignore-style patterns to exclude (repeatable)
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Skip hidden files and directories
    #[arg(long)]
    pub skip_hidden: bool,
}

/// Arguments for `preview`.
#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Limit to groups with a member under these roots
    #[arg(value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Print the preview as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `execute`.
#[derive(Debug, Args)]
pub struct ExecuteArgs {
    /// Limit to groups with a member under these roots
    #[arg(value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Run every check but leave files in place
    #[arg(long)]
    pub dry_run: bool,

    /// Cap on deletions for this run (overrides the configuration)
    #[arg(long, value_name = "N")]
    pub max_deletions: Option<usize>,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// A ledger record id.
#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Record id as shown by `history`
    #[arg(value_name = "RECORD_ID")]
    pub record_id: i64,
}

/// Arguments for `sweep`.
#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Retention window in days (overrides the configuration)
    #[arg(long, value_name = "N")]
    pub max_age_days: Option<u32>,
}

/// Arguments for `history`.
#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Show at most N records
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Write the ledger to a CSV file instead of printing it
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,
}

/// Arguments for `observe`.
#[derive(Debug, Args)]
pub struct ObserveArgs {
    /// File the event is about
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Kind of event
    #[arg(long, value_enum, default_value = "created")]
    pub event: EventArg,
}

/// Event kind accepted by `observe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventArg {
    /// A new file appeared
    Created,
    /// Contents changed
    Modified,
    /// The file was moved here
    Renamed,
    /// The file is gone
    Deleted,
}

impl From<EventArg> for EventKind {
    fn from(arg: EventArg) -> Self {
        match arg {
            EventArg::Created => Self::Created,
            EventArg::Modified => Self::Modified,
            EventArg::Renamed => Self::Renamed,
            EventArg::Deleted => Self::Deleted,
        }
    }
}

/// Policy preset accepted by `--profile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    /// General-purpose defaults
    Standard,
    /// Favors cleaning browser download duplicates
    Downloads,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Standard => Self::Standard,
            ProfileArg::Downloads => Self::Downloads,
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// ```
/// use safedupe::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("1.5MB").unwrap(), 1_500_000);
/// ```
///
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number or
/// an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
