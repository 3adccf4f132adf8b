//! Command dispatch for the `safedupe` binary.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytesize::ByteSize;

use crate::actions::{DeletionExecutor, DirectoryBackup, PathLocks};
use crate::cli::{Cli, Commands, ExecuteArgs, HistoryArgs, IndexArgs, ObserveArgs, PreviewArgs};
use crate::config::Config;
use crate::error::ExitCode;
use crate::fingerprint::{FingerprintEngine, Hasher};
use crate::indexer::{BatchIndexer, IndexerConfig, NoPacer, ScanSession, SessionStatus};
use crate::ledger::Ledger;
use crate::logging::init_logging;
use crate::progress::Progress;
use crate::realtime::{DebounceCache, Observation, RealTimeDetector};
use crate::scanner::path_utils::resolve_scope;
use crate::signal::{install_handler, KeepGoing};
use crate::store::FingerprintStore;

/// Everything a command needs, built once from the configuration.
///
/// Every component that reads or mutates a path shares `locks`.
struct App {
    config: Config,
    store: Arc<FingerprintStore>,
    locks: Arc<PathLocks>,
    signal: KeepGoing,
    quiet: bool,
}

impl App {
    fn engine(&self) -> FingerprintEngine {
        FingerprintEngine::new(Arc::clone(&self.store))
            .with_hasher(self.hasher())
            .with_locks(Arc::clone(&self.locks))
    }

    fn hasher(&self) -> Hasher {
        Hasher::with_config(self.config.policy.hasher_config())
    }
}

/// Run the parsed command line.
///
/// # Errors
///
/// Configuration, store and I/O failures. Per-file problems are reported
/// through the returned exit code instead.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref(), cli.profile.into())
        .context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.store_path = db;
    }
    if let Some(dir) = cli.backup_dir {
        config.backup_dir = dir;
    }

    if matches!(cli.command, Commands::Config) {
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::Success);
    }

    let signal = install_handler().context("Failed to install Ctrl+C handler")?;
    let store = FingerprintStore::open(&config.store_path).with_context(|| {
        format!("Failed to open store at {}", config.store_path.display())
    })?;
    log::debug!("Using store {}", config.store_path.display());

    let ctx = App {
        config,
        store: Arc::new(store),
        locks: Arc::new(PathLocks::new()),
        signal,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Index(args) => handle_index(&ctx, args),
        Commands::Preview(args) => handle_preview(&ctx, &args),
        Commands::Execute(args) => handle_execute(&ctx, &args),
        Commands::Restore(args) => {
            let outcome = ledger(&ctx).restore(args.record_id)?;
            println!(
                "Restored record {} to {}{}",
                outcome.record_id,
                outcome.restored_to.display(),
                if outcome.renamed { " (original path was occupied)" } else { "" }
            );
            Ok(ExitCode::Success)
        }
        Commands::Confirm(args) => {
            ledger(&ctx).confirm(args.record_id)?;
            println!("Confirmed record {}", args.record_id);
            Ok(ExitCode::Success)
        }
        Commands::Sweep(args) => {
            let days = args.max_age_days.unwrap_or(ctx.config.policy.retention_days);
            let report = ledger(&ctx).retention_sweep(days)?;
            println!(
                "Purged {} backup(s), releasing {}",
                report.purged,
                ByteSize::b(report.purged_bytes)
            );
            for (id, reason) in &report.failures {
                eprintln!("Record {id}: {reason}");
            }
            Ok(if !report.failures.is_empty() {
                ExitCode::PartialSuccess
            } else if report.purged == 0 {
                ExitCode::NothingToDo
            } else {
                ExitCode::Success
            })
        }
        Commands::History(args) => handle_history(&ctx, &args),
        Commands::Observe(args) => handle_observe(&ctx, &args),
        Commands::Config => Ok(ExitCode::Success),
    }
}

fn ledger(ctx: &App) -> Ledger {
    Ledger::new(Arc::clone(&ctx.store))
        .with_hasher(ctx.hasher())
        .with_locks(Arc::clone(&ctx.locks))
}

fn handle_index(ctx: &App, args: IndexArgs) -> Result<ExitCode> {
    let mut config = IndexerConfig::from_policy(&ctx.config.policy);
    if let Some(size) = args.batch_size {
        config.batch_size = usize::try_from(size).unwrap_or(usize::MAX);
    }
    config.walker.skip_hidden = args.skip_hidden;
    config.walker.min_size = args.min_size;
    config.walker.ignore_patterns.extend(args.ignore_patterns);

    let mut indexer = BatchIndexer::new(ctx.engine(), config).with_signal(ctx.signal.clone());
    if args.no_pacing {
        indexer = indexer.with_pacer(Box::new(NoPacer));
    }

    let scope: Vec<PathBuf> = resolve_scope(&args.paths);
    let progress = Progress::new(ctx.quiet);

    let report = match &args.session {
        Some(path) => {
            let mut session = if path.exists() {
                let session = ScanSession::load(path)
                    .with_context(|| format!("Failed to resume session {}", path.display()))?;
                if session.scope == scope {
                    log::info!(
                        "Resuming session {} at offset {}",
                        session.id,
                        session.resume_offset
                    );
                    session
                } else {
                    log::warn!("Session {} covers different roots; starting over", session.id);
                    ScanSession::new(scope, 0, chrono::Utc::now())
                }
            } else {
                ScanSession::new(scope, 0, chrono::Utc::now())
            };
            if session.status == SessionStatus::Completed {
                session.resume_offset = 0;
            }
            indexer.run_session(&mut session, Some(path), &progress)?
        }
        None => indexer.index(&scope, args.resume_from.unwrap_or(0), &progress)?,
    };

    if !ctx.quiet {
        println!(
            "Indexed {} file(s): {} fingerprinted ({} cached), {} duplicate(s), {} unreadable",
            report.processed, report.found, report.cached, report.duplicates, report.unreadable
        );
        if report.cancelled {
            match &args.session {
                Some(path) => println!("Interrupted; rerun with --session {}", path.display()),
                None => println!("Interrupted; resume with --resume-from {}", report.next_offset),
            }
        }
    }

    Ok(if report.cancelled {
        ExitCode::Interrupted
    } else if report.unreadable > 0 || report.scan_errors > 0 {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    })
}

fn executor(ctx: &App) -> Result<DeletionExecutor> {
    let backup = DirectoryBackup::new(&ctx.config.backup_dir).with_hasher(ctx.hasher());
    Ok(
        DeletionExecutor::new(Arc::clone(&ctx.store), &ctx.config.policy, Box::new(backup))?
            .with_signal(ctx.signal.clone())
            .with_locks(Arc::clone(&ctx.locks)),
    )
}

fn handle_preview(ctx: &App, args: &PreviewArgs) -> Result<ExitCode> {
    let preview = executor(ctx)?.preview(&args.paths)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
    } else {
        for group in &preview.groups {
            let flag = if group.requires_manual_review { "review" } else { "auto" };
            println!(
                "{} [{}] safety {:.2}, {} x {}",
                &group.group_id[..12.min(group.group_id.len())],
                flag,
                group.safety_score,
                group.len(),
                ByteSize::b(group.file_size())
            );
            for member in &group.members {
                let marker = if group.canonical.as_deref() == Some(member.path.as_path()) {
                    "keep"
                } else {
                    "    "
                };
                println!("  {marker} {}", member.path.display());
            }
        }
        println!(
            "{} group(s), {} held for review; executing would remove {} file(s), freeing {}",
            preview.groups.len(),
            preview.review_groups,
            preview.candidate_count,
            ByteSize::b(preview.freed_bytes_estimate)
        );
    }

    Ok(if preview.groups.is_empty() {
        ExitCode::NothingToDo
    } else {
        ExitCode::Success
    })
}

fn handle_execute(ctx: &App, args: &ExecuteArgs) -> Result<ExitCode> {
    let mut executor = executor(ctx)?;
    if let Some(max) = args.max_deletions {
        executor = executor.with_max_deletions(max);
    }

    if !args.dry_run && !args.yes {
        let preview = executor.preview(&args.paths)?;
        if preview.candidate_count == 0 {
            println!("Nothing to delete.");
            return Ok(ExitCode::NothingToDo);
        }
        let question = format!(
            "Back up and delete {} file(s), freeing {}? [y/N] ",
            preview.candidate_count,
            ByteSize::b(preview.freed_bytes_estimate)
        );
        if !confirm(&question)? {
            println!("Aborted.");
            return Ok(ExitCode::Success);
        }
    }

    let progress = Progress::new(ctx.quiet);
    let report = executor.execute_with_observer(&args.paths, args.dry_run, &progress)?;
    println!("{}", report.summary());

    Ok(if ctx.signal.is_cancelled() {
        ExitCode::Interrupted
    } else if !report.all_succeeded() {
        ExitCode::PartialSuccess
    } else if report.deleted_count() == 0 {
        ExitCode::NothingToDo
    } else {
        ExitCode::Success
    })
}

fn confirm(question: &str) -> Result<bool> {
    let mut stdout = io::stdout();
    write!(stdout, "{question}")?;
    stdout.flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn handle_history(ctx: &App, args: &HistoryArgs) -> Result<ExitCode> {
    let ledger = ledger(ctx);
    if let Some(path) = &args.csv {
        let count = ledger.export_csv(path)?;
        println!("Wrote {count} record(s) to {}", path.display());
        return Ok(if count == 0 { ExitCode::NothingToDo } else { ExitCode::Success });
    }

    let records = ledger.history(args.limit)?;
    for record in &records {
        println!(
            "{:>6}  {}  {:>10}  {}  {}",
            record.id,
            record.deleted_at.format("%Y-%m-%d %H:%M:%S"),
            ByteSize::b(record.size).to_string(),
            if record.restorable { "restorable" } else { "consumed  " },
            record.deleted_path.display()
        );
    }
    Ok(if records.is_empty() {
        ExitCode::NothingToDo
    } else {
        ExitCode::Success
    })
}

fn handle_observe(ctx: &App, args: &ObserveArgs) -> Result<ExitCode> {
    let policy = &ctx.config.policy;
    let detector = RealTimeDetector::new(
        ctx.engine(),
        DebounceCache::new(policy.debounce_window, policy.debounce_capacity),
    );
    match detector.on_file_observed(&args.path, args.event.into())? {
        Observation::DuplicateOf(paths) => {
            println!("{} duplicates:", args.path.display());
            for path in paths {
                println!("  {}", path.display());
            }
        }
        Observation::Unique => println!("{} is unique", args.path.display()),
        Observation::Debounced => println!("{} was seen recently", args.path.display()),
        Observation::Skipped => println!("{} is empty; skipped", args.path.display()),
        Observation::Gone => println!("{} no longer exists", args.path.display()),
        Observation::Unreadable(e) => {
            eprintln!("{e}");
            return Ok(ExitCode::PartialSuccess);
        }
    }
    Ok(ExitCode::Success)
}
