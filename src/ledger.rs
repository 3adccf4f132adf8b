//! Audit and rollback.
//!
//! Every deletion made by the executor is an append-only record pointing at
//! a verified backup. [`Ledger::restore`] puts the bytes back and
//! [`Ledger::retention_sweep`] purges backups once they are both old and
//! superseded by an explicitly confirmed deletion in the same group.
//! Unconfirmed entries are never purged.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use thiserror::Error;

use crate::actions::copy::{copy_into, discard};
use crate::actions::PathLocks;
use crate::clock::{system_clock, SharedClock};
use crate::fingerprint::{hash_to_hex, HashError, Hasher};
use crate::store::{DeletionRecord, FingerprintStore, RecordError, StoreError};

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The record store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No record with this id.
    #[error("no deletion record with id {0}")]
    NotFound(i64),

    /// Already restored or purged.
    #[error("deletion record {0} is no longer restorable")]
    NotRestorable(i64),

    /// The backup file is gone.
    #[error("backup for record {id} is missing: {path}")]
    BackupMissing {
        /// Record id
        id: i64,
        /// Expected backup location
        path: PathBuf,
    },

    /// A stored record is malformed.
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordError),

    /// Copying or removing a file failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The restored file could not be hashed.
    #[error("cannot verify restored file: {0}")]
    Verify(#[from] HashError),

    /// The restored bytes are not the original content.
    #[error("restored file {path} does not match (expected {expected}, got {actual})")]
    HashMismatch {
        /// Restored copy (already removed)
        path: PathBuf,
        /// Expected secure hash
        expected: String,
        /// Actual secure hash
        actual: String,
    },

    /// CSV export failed.
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Result of a successful restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Record consumed
    pub record_id: i64,
    /// Where the content now lives
    pub restored_to: PathBuf,
    /// `true` if the original path was occupied and a new name was used
    pub renamed: bool,
}

/// Result of a retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records purged
    pub purged: usize,
    /// Backup bytes released
    pub purged_bytes: u64,
    /// Purged records whose backup had already disappeared
    pub missing_backups: usize,
    /// Records left in place because the backup could not be removed
    pub failures: Vec<(i64, String)>,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: i64,
    deleted_path: &'a str,
    backup_path: &'a str,
    group_id: &'a str,
    size: u64,
    deleted_at: String,
    duplicate_of: &'a str,
    restorable: bool,
}

/// Restore, confirm and sweep operations over the deletion ledger.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<FingerprintStore>,
    hasher: Hasher,
    locks: Arc<PathLocks>,
    clock: SharedClock,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

impl Ledger {
    /// Ledger over `store`.
    #[must_use]
    pub fn new(store: Arc<FingerprintStore>) -> Self {
        Self {
            store,
            hasher: Hasher::new(),
            locks: Arc::new(PathLocks::new()),
            clock: system_clock(),
        }
    }

    /// Share a lock table with the executor.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<PathLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Use `clock` for confirmations and sweep cutoffs.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Use `hasher` to verify restored content.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Put a deleted file back.
    ///
    /// The backup is copied to the original path, or to
    /// `<stem> (restored).<ext>` (then `(restored 2)`, ...) if that path is
    /// occupied. The copy is verified against the record's hash before the
    /// record is consumed and the backup removed.
    ///
    /// # Errors
    ///
    /// [`LedgerError`] if the record is unknown, consumed, its backup is
    /// missing, or the copy fails or does not verify.
    pub fn restore(&self, record_id: i64) -> Result<RestoreOutcome, LedgerError> {
        let record = self
            .store
            .deletion(record_id)?
            .ok_or(LedgerError::NotFound(record_id))?;
        if !record.restorable {
            return Err(LedgerError::NotRestorable(record_id));
        }
        if !record.backup_path.is_file() {
            return Err(LedgerError::BackupMissing {
                id: record_id,
                path: record.backup_path,
            });
        }
        let expected = record.secure_hash()?;

        let _guard = self.locks.lock(&record.deleted_path);
        if let Some(parent) = record.deleted_path.parent() {
            fs::create_dir_all(parent).map_err(|e| LedgerError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let (target, file) = create_restore_target(&record.deleted_path)?;
        let renamed = target != record.deleted_path;

        if let Err(e) = copy_into(&record.backup_path, file) {
            discard(&target);
            return Err(LedgerError::Io {
                path: target,
                source: e,
            });
        }

        let actual = match self.hasher.compute_secure(&target) {
            Ok(h) => h,
            Err(e) => {
                discard(&target);
                return Err(e.into());
            }
        };
        if actual != expected {
            discard(&target);
            return Err(LedgerError::HashMismatch {
                path: target,
                expected: record.group_id,
                actual: hash_to_hex(&actual),
            });
        }

        if !self.store.mark_consumed(record_id)? {
            // Lost a race with another restore or a sweep.
            discard(&target);
            return Err(LedgerError::NotRestorable(record_id));
        }
        discard(&record.backup_path);

        log::info!(
            "Restored record {} to {}{}",
            record_id,
            target.display(),
            if renamed { " (original path occupied)" } else { "" }
        );
        Ok(RestoreOutcome {
            record_id,
            restored_to: target,
            renamed,
        })
    }

    /// Record an explicit confirmation that a deletion was wanted.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown id, or a store failure.
    pub fn confirm(&self, record_id: i64) -> Result<(), LedgerError> {
        if self.store.deletion(record_id)?.is_none() {
            return Err(LedgerError::NotFound(record_id));
        }
        self.store.append_confirmation(record_id, self.clock.now())?;
        log::info!("Confirmed deletion record {}", record_id);
        Ok(())
    }

    /// Purge backups older than `max_age_days` whose group has a confirmed
    /// deletion at or after them.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Store`] if the store fails. Per-backup failures are
    /// reported in the [`SweepReport`].
    pub fn retention_sweep(&self, max_age_days: u32) -> Result<SweepReport, LedgerError> {
        let cutoff = self.clock.now() - Duration::days(i64::from(max_age_days));
        let mut report = SweepReport::default();

        for record in self.store.sweep_candidates(cutoff)? {
            match fs::remove_file(&record.backup_path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => report.missing_backups += 1,
                Err(e) => {
                    log::warn!(
                        "Could not purge backup {}: {}",
                        record.backup_path.display(),
                        e
                    );
                    report.failures.push((record.id, e.to_string()));
                    continue;
                }
            }
            if self.store.mark_consumed(record.id)? {
                report.purged += 1;
                report.purged_bytes += record.size;
                log::debug!("Purged backup for record {}", record.id);
            }
        }

        log::info!(
            "Retention sweep: purged {} backup(s), {} released",
            report.purged,
            bytesize::ByteSize::b(report.purged_bytes)
        );
        Ok(report)
    }

    /// Ledger records, newest first.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Store`] on store failure.
    pub fn history(&self, limit: Option<usize>) -> Result<Vec<DeletionRecord>, LedgerError> {
        Ok(self.store.deletions(limit)?)
    }

    /// Write the full ledger as CSV to `writer`.
    ///
    /// # Errors
    ///
    /// [`LedgerError`] on store or write failure.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<usize, LedgerError> {
        let records = self.store.deletions(None)?;
        let mut csv = csv::Writer::from_writer(writer);
        for r in &records {
            let deleted_path = r.deleted_path.to_string_lossy();
            let backup_path = r.backup_path.to_string_lossy();
            let duplicate_of = r.duplicate_of.to_string_lossy();
            csv.serialize(CsvRow {
                id: r.id,
                deleted_path: &deleted_path,
                backup_path: &backup_path,
                group_id: &r.group_id,
                size: r.size,
                deleted_at: r.deleted_at.to_rfc3339(),
                duplicate_of: &duplicate_of,
                restorable: r.restorable,
            })?;
        }
        csv.flush().map_err(|e| LedgerError::Csv(e.into()))?;
        Ok(records.len())
    }

    /// Write the full ledger as CSV to `path`.
    ///
    /// # Errors
    ///
    /// [`LedgerError`] on store or write failure.
    pub fn export_csv(&self, path: &Path) -> Result<usize, LedgerError> {
        let file = File::create(path).map_err(|e| LedgerError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.write_csv(BufWriter::new(file))
    }
}

fn create_restore_target(original: &Path) -> Result<(PathBuf, File), LedgerError> {
    let mut attempt = 0u32;
    loop {
        let candidate = restore_name(original, attempt);
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < 1000 => attempt += 1,
            Err(e) => {
                return Err(LedgerError::Io {
                    path: candidate,
                    source: e,
                })
            }
        }
    }
}

/// Path tried on the given restore attempt.
///
/// Attempt 0 is the original path; 1 is `<stem> (restored).<ext>`; N is
/// `<stem> (restored N).<ext>`.
#[must_use]
pub fn restore_name(original: &Path, attempt: u32) -> PathBuf {
    if attempt == 0 {
        return original.to_path_buf();
    }
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = if attempt == 1 {
        " (restored)".to_string()
    } else {
        format!(" (restored {attempt})")
    };
    let name = match original.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    original.with_file_name(name)
}
