//! Batch indexing.
//!
//! [`BatchIndexer`] fingerprints a whole scope in fixed-size batches:
//!
//! 1. Enumerate the [`Universe`] under the scope roots, highest tier first.
//! 2. Skip to the resume offset.
//! 3. Fingerprint each file through the shared engine and check it against
//!    the store for duplicates.
//! 4. After each batch, persist the [`ScanSession`], report progress and
//!    rest through the [`Pacer`].
//!
//! The keep-going signal is checked between files and between batches.
//! Everything before the saved offset is already durable in the store, so a
//! cancelled run resumes exactly where it stopped.

pub mod pacer;
pub mod session;
pub mod universe;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

pub use pacer::{NoPacer, Pacer, SleepPacer};
pub use session::{ScanSession, SessionCounters, SessionError, SessionStatus, SESSION_VERSION};
pub use universe::{Priority, Universe, UniverseEntry};

use crate::clock::{system_clock, SharedClock};
use crate::duplicates::Grouper;
use crate::fingerprint::{FingerprintEngine, Lookup};
use crate::policy::Policy;
use crate::scanner::path_utils::resolve_scope;
use crate::scanner::WalkerConfig;
use crate::signal::KeepGoing;
use crate::store::StoreError;

/// Errors that stop an index run.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The fingerprint store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The session file could not be written.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Progress after a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndexProgress {
    /// Position in the universe, including files handled by earlier runs.
    pub processed: usize,
    /// Size of the universe.
    pub total: usize,
    /// Fingerprints obtained in this run.
    pub found: u64,
    /// Files found to duplicate a known file in this run.
    pub duplicates: u64,
    /// Estimated seconds to completion, once a rate is known.
    pub eta_seconds: Option<u64>,
    /// Throughput of this run.
    pub files_per_second: f64,
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    /// Session id.
    pub session_id: String,
    /// Files visited by this run.
    pub processed: u64,
    /// Fingerprints obtained.
    pub found: u64,
    /// Fingerprints served from the store.
    pub cached: u64,
    /// Files matching an already known file.
    pub duplicates: u64,
    /// Files that could not be read.
    pub unreadable: u64,
    /// Empty or vanished files.
    pub skipped: u64,
    /// Walker errors during enumeration.
    pub scan_errors: usize,
    /// Size of the universe.
    pub total: usize,
    /// Offset to resume from.
    pub next_offset: usize,
    /// Batches committed.
    pub batches: usize,
    /// Whether the keep-going signal stopped the run.
    pub cancelled: bool,
}

impl IndexReport {
    /// Check whether every file in the universe has been processed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.next_offset >= self.total
    }
}

/// Receives indexer progress.
pub trait IndexObserver: Send + Sync {
    /// Enumeration finished; `total` files, starting at `offset`.
    fn on_start(&self, _total: usize, _offset: usize) {}
    /// A batch was committed.
    fn on_batch(&self, _progress: &IndexProgress) {}
    /// The run ended.
    fn on_finish(&self, _report: &IndexReport) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIndexObserver;

impl IndexObserver for NoopIndexObserver {}

/// Settings for [`BatchIndexer`].
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Files per batch.
    pub batch_size: usize,
    /// Rest between batches.
    pub batch_pause: Duration,
    /// Walk settings for enumeration.
    pub walker: WalkerConfig,
    /// Scheduling priorities.
    pub priority: Priority,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self::from_policy(&Policy::default())
    }
}

impl IndexerConfig {
    /// Settings taken from `policy`.
    #[must_use]
    pub fn from_policy(policy: &Policy) -> Self {
        Self {
            batch_size: policy.batch_size.max(1),
            batch_pause: policy.batch_pause,
            walker: WalkerConfig {
                ignore_patterns: policy.ignore_patterns.clone(),
                ..Default::default()
            },
            priority: Priority {
                dirs: resolve_scope(&policy.priority_dirs),
                extensions: policy.priority_extensions.clone(),
            },
        }
    }
}

/// Prioritized, resumable fingerprinting driver.
pub struct BatchIndexer {
    engine: FingerprintEngine,
    grouper: Grouper,
    config: IndexerConfig,
    pacer: Box<dyn Pacer>,
    clock: SharedClock,
    signal: KeepGoing,
}

impl std::fmt::Debug for BatchIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchIndexer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BatchIndexer {
    /// Indexer sharing `engine`'s store.
    #[must_use]
    pub fn new(engine: FingerprintEngine, config: IndexerConfig) -> Self {
        Self {
            grouper: Grouper::new(Arc::clone(engine.store())),
            engine,
            config,
            pacer: Box::new(SleepPacer),
            clock: system_clock(),
            signal: KeepGoing::new(),
        }
    }

    /// Replace the pacer.
    #[must_use]
    pub fn with_pacer(mut self, pacer: Box<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// Measure throughput with `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Stop between files once `signal` is cancelled.
    #[must_use]
    pub fn with_signal(mut self, signal: KeepGoing) -> Self {
        self.signal = signal;
        self
    }

    /// Index `scope`, skipping the first `resume_from` files of the universe.
    ///
    /// # Errors
    ///
    /// [`IndexError::Store`] if the store fails. Unreadable files are
    /// counted, never fatal.
    pub fn index(
        &self,
        scope: &[PathBuf],
        resume_from: usize,
        observer: &dyn IndexObserver,
    ) -> Result<IndexReport, IndexError> {
        let mut session = ScanSession::new(resolve_scope(scope), resume_from, self.clock.now());
        self.run_session(&mut session, None, observer)
    }

    /// Continue `session`, saving it to `session_path` after every batch.
    ///
    /// # Errors
    ///
    /// [`IndexError::Store`] if the store fails, [`IndexError::Session`] if
    /// the session cannot be saved.
    pub fn run_session(
        &self,
        session: &mut ScanSession,
        session_path: Option<&Path>,
        observer: &dyn IndexObserver,
    ) -> Result<IndexReport, IndexError> {
        session.scope = resolve_scope(&session.scope);
        let universe = Universe::enumerate(
            &session.scope,
            &self.config.walker,
            &self.config.priority,
            &self.signal,
        );
        let total = universe.len();
        let start_offset = session.resume_offset.min(total);
        session.total = total;
        session.status = SessionStatus::Running;

        log::info!(
            "Indexing {} files under {} root(s), starting at {}",
            total,
            session.scope.len(),
            start_offset
        );
        observer.on_start(total, start_offset);

        let started = self.clock.now();
        let base = session.counters;
        let mut report = IndexReport {
            session_id: session.id.clone(),
            processed: 0,
            found: 0,
            cached: 0,
            duplicates: 0,
            unreadable: 0,
            skipped: 0,
            scan_errors: universe.scan_errors,
            total,
            next_offset: start_offset,
            batches: 0,
            cancelled: false,
        };

        let remaining = &universe.entries[start_offset..];
        let batch_count = remaining.chunks(self.config.batch_size).len();

        for (batch_index, batch) in remaining.chunks(self.config.batch_size).enumerate() {
            if !self.signal.should_continue() {
                report.cancelled = true;
                break;
            }

            for entry in batch {
                if !self.signal.should_continue() {
                    report.cancelled = true;
                    break;
                }
                self.process(&entry.file.path, &mut report)?;
                report.next_offset += 1;
            }

            report.batches += 1;
            self.commit(session, base, &report, session_path)?;
            let progress = self.progress(&report, started);
            log::debug!(
                "Batch {} done: {}/{} files, {} duplicates",
                report.batches,
                progress.processed,
                total,
                report.duplicates
            );
            observer.on_batch(&progress);

            if report.cancelled {
                break;
            }
            if batch_index + 1 < batch_count {
                self.pacer.pause(self.config.batch_pause, &self.signal);
            }
        }

        if self.signal.is_cancelled() && report.next_offset < total {
            report.cancelled = true;
        }
        session.status = if report.cancelled {
            SessionStatus::Cancelled
        } else {
            SessionStatus::Completed
        };
        self.commit(session, base, &report, session_path)?;

        if report.cancelled {
            log::info!(
                "Indexing cancelled at {}/{}; resume with offset {}",
                report.next_offset,
                total,
                report.next_offset
            );
        } else {
            log::info!(
                "Indexing complete: {} files, {} fingerprinted, {} duplicates, {} unreadable",
                report.processed,
                report.found,
                report.duplicates,
                report.unreadable
            );
        }
        observer.on_finish(&report);
        Ok(report)
    }

    fn process(&self, path: &Path, report: &mut IndexReport) -> Result<(), StoreError> {
        report.processed += 1;
        let fingerprint = match self.engine.get_or_compute(path, false)? {
            Lookup::Cached(fp) => {
                report.cached += 1;
                fp
            }
            Lookup::Computed(fp) => fp,
            Lookup::Empty(_) => {
                report.skipped += 1;
                return Ok(());
            }
            Lookup::Unreadable(e) => {
                if matches!(e, crate::fingerprint::HashError::NotFound(_)) {
                    report.skipped += 1;
                } else {
                    report.unreadable += 1;
                }
                return Ok(());
            }
        };
        report.found += 1;

        let matched = self.grouper.detect_incremental(&fingerprint)?;
        if !matched.is_unique() {
            log::trace!(
                "{} duplicates {} known file(s)",
                path.display(),
                matched.duplicates.len()
            );
            report.duplicates += 1;
        }
        Ok(())
    }

    /// Fold the run's totals into `session` and persist it.
    fn commit(
        &self,
        session: &mut ScanSession,
        base: SessionCounters,
        report: &IndexReport,
        session_path: Option<&Path>,
    ) -> Result<(), SessionError> {
        session.counters = accumulate(base, report);
        session.resume_offset = report.next_offset;
        session.updated_at = self.clock.now();
        match session_path {
            Some(path) => session.save(path),
            None => Ok(()),
        }
    }

    fn progress(&self, report: &IndexReport, started: chrono::DateTime<chrono::Utc>) -> IndexProgress {
        let elapsed = (self.clock.now() - started).num_milliseconds().max(0) as f64 / 1000.0;
        let files_per_second = if elapsed > 0.0 {
            report.processed as f64 / elapsed
        } else {
            0.0
        };
        let left = report.total.saturating_sub(report.next_offset);
        let eta_seconds = if files_per_second > 0.0 {
            Some((left as f64 / files_per_second).ceil() as u64)
        } else if left == 0 {
            Some(0)
        } else {
            None
        };
        IndexProgress {
            processed: report.next_offset,
            total: report.total,
            found: report.found,
            duplicates: report.duplicates,
            eta_seconds,
            files_per_second,
        }
    }
}

fn accumulate(base: SessionCounters, report: &IndexReport) -> SessionCounters {
    SessionCounters {
        processed: base.processed + report.processed,
        found: base.found + report.found,
        cached: base.cached + report.cached,
        duplicates: base.duplicates + report.duplicates,
        unreadable: base.unreadable + report.unreadable,
        skipped: base.skipped + report.skipped,
    }
}
