//! Deletion executor.
//!
//! # Overview
//!
//! [`DeletionExecutor::preview`] builds and assesses groups without touching
//! anything. [`DeletionExecutor::execute`] walks the same groups and, for each
//! deletion candidate:
//!
//! 1. verifies the file still matches its fingerprint (TOCTOU check)
//! 2. writes a verified backup through the [`BackupSink`]
//! 3. removes the original only if the backup succeeded
//! 4. appends one immutable ledger record
//!
//! A failure at step 2 or 3 aborts that candidate only. Store failures abort
//! the whole run. Each group ends in one of the terminal [`GroupState`]s.
//!
//! The number of successful deletions per run is capped by
//! [`Policy::max_deletions_per_run`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;

use super::backup::{BackupError, BackupSink};
use super::lock::PathLocks;
use crate::canonical::CanonicalSelector;
use crate::clock::{system_clock, SharedClock};
use crate::duplicates::{DuplicateGroup, GroupMember, Grouper, GrouperStats};
use crate::policy::{Policy, PolicyError};
use crate::safety::SafetyScorer;
use crate::scanner::path_utils::{is_under_any, resolve_scope};
use crate::signal::KeepGoing;
use crate::store::{FingerprintStore, NewDeletion, StoreResult};

/// Per-candidate deletion failure.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// Candidate lies under a protected prefix.
    #[error("refusing to delete protected path: {0}")]
    ProtectedPath(PathBuf),

    /// Backup failed; the original was left in place.
    #[error("backup failed for {path}: {source}")]
    Backup {
        /// Candidate
        path: PathBuf,
        /// Underlying backup failure
        #[source]
        source: BackupError,
    },

    /// The original could not be removed after a successful backup.
    #[error("could not remove {path} (backup kept at {backup}): {source}")]
    RemoveFailed {
        /// Candidate
        path: PathBuf,
        /// Orphaned backup retained for manual recovery
        backup: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl DeleteError {
    /// The candidate path.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::ProtectedPath(p) | Self::Backup { path: p, .. } | Self::RemoveFailed { path: p, .. } => p,
        }
    }
}

/// Why a group or candidate was not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The group requires manual review.
    ManualReview,
    /// No canonical member could be chosen.
    NoCanonical,
    /// The canonical is gone or no longer matches the group.
    CanonicalChanged,
    /// The candidate changed or vanished since it was fingerprinted.
    Changed,
    /// The per-run deletion cap was reached.
    CapReached,
    /// The run was cancelled.
    Cancelled,
}

/// Result for one candidate.
#[derive(Debug)]
pub enum CandidateOutcome {
    /// Backed up, removed and recorded.
    Deleted {
        /// Ledger id
        record_id: i64,
        /// Verified backup
        backup_path: PathBuf,
    },
    /// Dry run: every check passed.
    WouldDelete,
    /// Not attempted.
    Skipped(SkipReason),
    /// Attempted and failed.
    Failed(DeleteError),
}

/// One candidate and what happened to it.
#[derive(Debug)]
pub struct CandidateResult {
    /// Candidate path
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Outcome
    pub outcome: CandidateOutcome,
}

/// Terminal state of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum GroupState {
    /// Nothing was deleted.
    Skipped(SkipReason),
    /// At least one candidate was deleted (or would be, in a dry run) and none failed.
    Deleted,
    /// At least one candidate failed.
    Failed,
}

/// Result for one group.
#[derive(Debug)]
pub struct GroupExecution {
    /// Group id
    pub group_id: String,
    /// Retained member
    pub canonical: Option<PathBuf>,
    /// Terminal state
    pub state: GroupState,
    /// Per-candidate results
    pub candidates: Vec<CandidateResult>,
}

impl GroupExecution {
    /// Candidates deleted (or planned, in a dry run).
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.candidates
            .iter()
            .filter(|c| matches!(c.outcome, CandidateOutcome::Deleted { .. } | CandidateOutcome::WouldDelete))
            .count()
    }

    /// Bytes freed (or that would be, in a dry run).
    #[must_use]
    pub fn freed_bytes(&self) -> u64 {
        self.candidates
            .iter()
            .filter(|c| matches!(c.outcome, CandidateOutcome::Deleted { .. } | CandidateOutcome::WouldDelete))
            .map(|c| c.size)
            .sum()
    }

    /// Failed candidates.
    #[must_use]
    pub fn failures(&self) -> Vec<&DeleteError> {
        self.candidates
            .iter()
            .filter_map(|c| match &c.outcome {
                CandidateOutcome::Failed(e) => Some(e),
                _ => None,
            })
            .collect()
    }
}

/// Result of an execute run.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Per-group results, in processing order.
    pub groups: Vec<GroupExecution>,
    /// Grouping counters.
    pub grouping: GrouperStats,
    /// Store rows dropped because their file had disappeared.
    pub pruned: usize,
}

impl ExecutionReport {
    /// Files deleted (or planned).
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.groups.iter().map(GroupExecution::deleted_count).sum()
    }

    /// Bytes freed (or that would be).
    #[must_use]
    pub fn freed_bytes(&self) -> u64 {
        self.groups.iter().map(GroupExecution::freed_bytes).sum()
    }

    /// Failed candidates across all groups.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.groups.iter().map(|g| g.failures().len()).sum()
    }

    /// Groups that ended skipped.
    #[must_use]
    pub fn skipped_groups(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| matches!(g.state, GroupState::Skipped(_)))
            .count()
    }

    /// Check if no candidate failed.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failure_count() == 0
    }

    /// Human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "Would delete" } else { "Deleted" };
        let freed = bytesize::ByteSize::b(self.freed_bytes());
        if self.all_succeeded() {
            format!(
                "{verb} {} file(s), freeing {freed}; {} group(s) skipped",
                self.deleted_count(),
                self.skipped_groups()
            )
        } else {
            format!(
                "{verb} {} file(s), {} failed, freeing {freed}; {} group(s) skipped",
                self.deleted_count(),
                self.failure_count(),
                self.skipped_groups()
            )
        }
    }
}

/// Side-effect-free view of what execute would consider.
#[derive(Debug, Default, Serialize)]
pub struct Preview {
    /// Assessed groups.
    pub groups: Vec<DuplicateGroup>,
    /// Bytes an execute run would free, honoring review flags and the cap.
    pub freed_bytes_estimate: u64,
    /// Candidates an execute run would delete.
    pub candidate_count: usize,
    /// Groups held back for manual review.
    pub review_groups: usize,
}

/// Receives per-candidate callbacks during execute.
pub trait ExecutionObserver: Send + Sync {
    /// Called before a candidate is processed.
    fn on_candidate(&self, group_id: &str, path: &Path);

    /// Called with each candidate's result.
    fn on_result(&self, group_id: &str, result: &CandidateResult);

    /// Called once the run completes.
    fn on_complete(&self, report: &ExecutionReport);
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {
    fn on_candidate(&self, _group_id: &str, _path: &Path) {}
    fn on_result(&self, _group_id: &str, _result: &CandidateResult) {}
    fn on_complete(&self, _report: &ExecutionReport) {}
}

/// File metadata snapshot for TOCTOU verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    /// Path
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Modification time
    pub mtime: Option<SystemTime>,
}

impl FileSnapshot {
    /// Capture the current state of a regular file. `None` if it is gone.
    #[must_use]
    pub fn capture(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok().filter(fs::Metadata::is_file)?;
        Some(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
            mtime: metadata.modified().ok(),
        })
    }

    /// Check that the file still has this size and mtime.
    #[must_use]
    pub fn still_matches(&self) -> bool {
        Self::capture(&self.path).is_some_and(|now| now == *self)
    }
}

/// Backup-then-delete driver.
pub struct DeletionExecutor {
    store: Arc<FingerprintStore>,
    grouper: Grouper,
    scorer: SafetyScorer,
    selector: CanonicalSelector,
    backup: Box<dyn BackupSink>,
    locks: Arc<PathLocks>,
    protected: Vec<PathBuf>,
    max_deletions: usize,
    clock: SharedClock,
    signal: KeepGoing,
}

impl std::fmt::Debug for DeletionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionExecutor")
            .field("max_deletions", &self.max_deletions)
            .field("protected", &self.protected)
            .finish_non_exhaustive()
    }
}

impl DeletionExecutor {
    /// Create an executor for `policy`, backing up through `backup`.
    ///
    /// # Errors
    ///
    /// [`PolicyError`] if the policy's patterns do not compile.
    pub fn new(
        store: Arc<FingerprintStore>,
        policy: &Policy,
        backup: Box<dyn BackupSink>,
    ) -> Result<Self, PolicyError> {
        Ok(Self {
            grouper: Grouper::new(Arc::clone(&store)),
            store,
            scorer: SafetyScorer::new(policy)?,
            selector: CanonicalSelector::new(policy)?,
            backup,
            locks: Arc::new(PathLocks::new()),
            protected: resolve_scope(&policy.protected_paths),
            max_deletions: policy.max_deletions_per_run,
            clock: system_clock(),
            signal: KeepGoing::new(),
        })
    }

    /// Use `clock` for scoring and ledger timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.scorer = self.scorer.with_clock(Arc::clone(&clock));
        self.selector = self.selector.with_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    /// Share a lock table with other mutating actors.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<PathLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Stop between candidates when `signal` is cancelled.
    #[must_use]
    pub fn with_signal(mut self, signal: KeepGoing) -> Self {
        self.signal = signal;
        self
    }

    /// Override the per-run cap.
    #[must_use]
    pub fn with_max_deletions(mut self, max: usize) -> Self {
        self.max_deletions = max;
        self
    }

    /// Choose a canonical and score `group`.
    pub fn assess(&self, group: &mut DuplicateGroup) {
        self.selector.apply(group);
        self.scorer.apply(group);
    }

    fn assessed_groups(&self, scope: &[PathBuf]) -> StoreResult<(Vec<DuplicateGroup>, GrouperStats)> {
        let (mut groups, stats) = self.grouper.build_groups(&resolve_scope(scope))?;
        for group in &mut groups {
            self.assess(group);
        }
        Ok((groups, stats))
    }

    /// Report what execute would do. Reads the store and the filesystem and
    /// writes nothing.
    ///
    /// # Errors
    ///
    /// [`StoreError`](crate::store::StoreError) if the store is unavailable.
    pub fn preview(&self, scope: &[PathBuf]) -> StoreResult<Preview> {
        let (groups, _) = self.assessed_groups(scope)?;
        let mut preview = Preview::default();
        let mut budget = self.max_deletions;

        for group in &groups {
            if group.requires_manual_review {
                preview.review_groups += 1;
                continue;
            }
            for candidate in group.candidates() {
                if budget == 0 || is_under_any(&candidate.path, &self.protected) {
                    continue;
                }
                budget -= 1;
                preview.candidate_count += 1;
                preview.freed_bytes_estimate += candidate.size;
            }
        }
        preview.groups = groups;
        Ok(preview)
    }

    /// Delete candidates in `scope`, or only check them when `dry_run`.
    ///
    /// # Errors
    ///
    /// [`StoreError`](crate::store::StoreError) if the store is unavailable.
    /// Per-file failures are reported in the [`ExecutionReport`].
    pub fn execute(&self, scope: &[PathBuf], dry_run: bool) -> StoreResult<ExecutionReport> {
        self.execute_with_observer(scope, dry_run, &NoopObserver)
    }

    /// [`execute`](Self::execute) with progress callbacks.
    ///
    /// # Errors
    ///
    /// [`StoreError`](crate::store::StoreError) if the store is unavailable.
    pub fn execute_with_observer(
        &self,
        scope: &[PathBuf],
        dry_run: bool,
        observer: &dyn ExecutionObserver,
    ) -> StoreResult<ExecutionReport> {
        let pruned = if dry_run { 0 } else { self.prune_stale(scope)? };
        let (groups, grouping) = self.assessed_groups(scope)?;
        let mut report = ExecutionReport {
            dry_run,
            groups: Vec::with_capacity(groups.len()),
            grouping,
            pruned,
        };
        let mut remaining = self.max_deletions;

        for group in &groups {
            let execution = self.execute_group(group, dry_run, &mut remaining, observer)?;
            report.groups.push(execution);
        }

        log::info!("{}", report.summary());
        observer.on_complete(&report);
        Ok(report)
    }

    /// Drop store rows under `scope` whose file is gone.
    fn prune_stale(&self, scope: &[PathBuf]) -> StoreResult<usize> {
        let mut pruned = 0;
        for path in self.grouper.stale_members(&resolve_scope(scope))? {
            let _guard = self.locks.lock(&path);
            if fs::symlink_metadata(&path).is_ok() {
                continue;
            }
            if self.store.remove(&path)? {
                log::debug!("Pruned stale fingerprint: {}", path.display());
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    fn execute_group(
        &self,
        group: &DuplicateGroup,
        dry_run: bool,
        remaining: &mut usize,
        observer: &dyn ExecutionObserver,
    ) -> StoreResult<GroupExecution> {
        let candidates = group.candidates();
        let group_skip = if !self.signal.should_continue() {
            Some(SkipReason::Cancelled)
        } else if group.requires_manual_review {
            Some(SkipReason::ManualReview)
        } else if group.canonical.is_none() {
            Some(SkipReason::NoCanonical)
        } else if !self.canonical_intact(group)? {
            Some(SkipReason::CanonicalChanged)
        } else if *remaining == 0 {
            Some(SkipReason::CapReached)
        } else {
            None
        };

        if let Some(reason) = group_skip {
            log::debug!("Skipping group {}: {:?}", group.group_id, reason);
            return Ok(GroupExecution {
                group_id: group.group_id.clone(),
                canonical: group.canonical.clone(),
                state: GroupState::Skipped(reason),
                candidates: candidates
                    .into_iter()
                    .map(|m| CandidateResult {
                        path: m.path.clone(),
                        size: m.size,
                        outcome: CandidateOutcome::Skipped(reason),
                    })
                    .collect(),
            });
        }

        let mut results = Vec::with_capacity(candidates.len());
        for member in candidates {
            observer.on_candidate(&group.group_id, &member.path);
            let outcome = if !self.signal.should_continue() {
                CandidateOutcome::Skipped(SkipReason::Cancelled)
            } else if *remaining == 0 {
                CandidateOutcome::Skipped(SkipReason::CapReached)
            } else {
                self.process_candidate(group, member, dry_run)?
            };
            if matches!(outcome, CandidateOutcome::Deleted { .. } | CandidateOutcome::WouldDelete) {
                *remaining -= 1;
            }
            let result = CandidateResult {
                path: member.path.clone(),
                size: member.size,
                outcome,
            };
            observer.on_result(&group.group_id, &result);
            results.push(result);
        }

        let state = if results.iter().any(|r| matches!(r.outcome, CandidateOutcome::Failed(_))) {
            GroupState::Failed
        } else if results
            .iter()
            .any(|r| matches!(r.outcome, CandidateOutcome::Deleted { .. } | CandidateOutcome::WouldDelete))
        {
            GroupState::Deleted
        } else {
            let reason = results
                .iter()
                .find_map(|r| match r.outcome {
                    CandidateOutcome::Skipped(reason) => Some(reason),
                    _ => None,
                })
                .unwrap_or(SkipReason::Changed);
            GroupState::Skipped(reason)
        };

        Ok(GroupExecution {
            group_id: group.group_id.clone(),
            canonical: group.canonical.clone(),
            state,
            candidates: results,
        })
    }

    /// The canonical still exists and still matches its stored fingerprint.
    fn canonical_intact(&self, group: &DuplicateGroup) -> StoreResult<bool> {
        let Some(canonical) = group.canonical_member() else {
            return Ok(false);
        };
        let Some(snapshot) = FileSnapshot::capture(&canonical.path) else {
            log::warn!("Canonical vanished: {}", canonical.path.display());
            return Ok(false);
        };
        let stored = self.store.get_by_path(&canonical.path)?;
        Ok(stored.is_some_and(|fp| {
            fp.secure_hash == group.secure_hash
                && Some(fp.modified) == snapshot.mtime
                && fp.size == snapshot.size
        }))
    }

    fn process_candidate(
        &self,
        group: &DuplicateGroup,
        member: &GroupMember,
        dry_run: bool,
    ) -> StoreResult<CandidateOutcome> {
        let path = &member.path;
        if is_under_any(path, &self.protected) {
            log::warn!("Refusing to delete protected path: {}", path.display());
            return Ok(CandidateOutcome::Failed(DeleteError::ProtectedPath(path.clone())));
        }

        let _guard = self.locks.lock(path);

        let Some(snapshot) = FileSnapshot::capture(path) else {
            log::debug!("Candidate vanished: {}", path.display());
            return Ok(CandidateOutcome::Skipped(SkipReason::Changed));
        };
        let stored = self.store.get_by_path(path)?;
        let matches_record = stored.is_some_and(|fp| {
            fp.secure_hash == group.secure_hash
                && fp.size == snapshot.size
                && Some(fp.modified) == snapshot.mtime
        });
        if !matches_record {
            log::warn!("File modified since fingerprinting: {}", path.display());
            return Ok(CandidateOutcome::Skipped(SkipReason::Changed));
        }

        if dry_run {
            log::debug!("Would delete {}", path.display());
            return Ok(CandidateOutcome::WouldDelete);
        }

        let now = self.clock.now();
        let backup_path = match self.backup.backup(path, &group.secure_hash, now) {
            Ok(p) => p,
            Err(source) => {
                log::warn!("Backup failed for {}: {}", path.display(), source);
                return Ok(CandidateOutcome::Failed(DeleteError::Backup {
                    path: path.clone(),
                    source,
                }));
            }
        };

        if !snapshot.still_matches() {
            log::warn!("File changed during backup: {}", path.display());
            if let Err(e) = fs::remove_file(&backup_path) {
                log::warn!("Could not remove backup {}: {}", backup_path.display(), e);
            }
            return Ok(CandidateOutcome::Skipped(SkipReason::Changed));
        }

        if let Err(source) = fs::remove_file(path) {
            log::warn!(
                "Could not remove {} (backup kept at {}): {}",
                path.display(),
                backup_path.display(),
                source
            );
            return Ok(CandidateOutcome::Failed(DeleteError::RemoveFailed {
                path: path.clone(),
                backup: backup_path,
                source,
            }));
        }

        let duplicate_of = group.canonical.clone().unwrap_or_default();
        let record = match self.store.append_deletion(&NewDeletion {
            deleted_path: path.clone(),
            backup_path: backup_path.clone(),
            secure_hash: group.secure_hash,
            size: member.size,
            deleted_at: now,
            duplicate_of,
        }) {
            Ok(record) => record,
            Err(e) => {
                log::error!(
                    "Deleted {} but could not record it; backup is at {}",
                    path.display(),
                    backup_path.display()
                );
                return Err(e);
            }
        };
        self.store.remove(path)?;

        log::info!(
            "Deleted {} (duplicate of {}), backup {}",
            path.display(),
            record.duplicate_of.display(),
            backup_path.display()
        );
        Ok(CandidateOutcome::Deleted {
            record_id: record.id,
            backup_path,
        })
    }
}
