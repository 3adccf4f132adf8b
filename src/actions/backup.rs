//! Backup-before-delete.
//!
//! A [`BackupSink`] copies a file somewhere safe and proves the copy is
//! byte-identical before the caller may delete the original.
//! [`DirectoryBackup`] writes into a single flat directory using names of the
//! form `<stem>.<hash12>.<YYYYmmddTHHMMSS.nnnnnnnnn>[.<ext>]`, adding `-N`
//! after the timestamp if that name is taken.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::copy::{copy_into, discard};
use crate::fingerprint::{hash_to_hex, Hash, HashError, Hasher};

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Reasons a backup could not be made. The original is never touched.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The backup directory could not be created.
    #[error("cannot create backup directory {path}: {source}")]
    CreateDir {
        /// Directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Copying failed part way.
    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        /// Original file
        from: PathBuf,
        /// Backup destination
        to: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// No free backup name was found.
    #[error("no free backup name for {0}")]
    NameExhausted(PathBuf),

    /// The copy does not hash to the expected content.
    #[error("backup {backup} failed integrity check (expected {expected}, got {actual})")]
    IntegrityMismatch {
        /// Backup file (already removed)
        backup: PathBuf,
        /// Expected secure hash (hex)
        expected: String,
        /// Hash of the copy (hex)
        actual: String,
    },

    /// The copy could not be re-hashed.
    #[error("cannot verify backup: {0}")]
    Verify(#[from] HashError),
}

/// Destination for pre-deletion copies.
pub trait BackupSink: Send + Sync {
    /// Copy `source` and verify it hashes to `secure_hash`.
    ///
    /// Returns the backup path. On error no backup is left behind.
    ///
    /// # Errors
    ///
    /// [`BackupError`] if the copy cannot be made or verified.
    fn backup(&self, source: &Path, secure_hash: &Hash, at: DateTime<Utc>) -> Result<PathBuf, BackupError>;
}

/// Backups in a flat directory.
#[derive(Debug, Clone)]
pub struct DirectoryBackup {
    root: PathBuf,
    hasher: Hasher,
}

impl DirectoryBackup {
    /// Back up into `root`, created on first use.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hasher: Hasher::new(),
        }
    }

    /// Use `hasher` for the integrity check.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Backup directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn create_unique(&self, source: &Path, secure_hash: &Hash, at: DateTime<Utc>) -> Result<(PathBuf, File), BackupError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = self.root.join(backup_file_name(source, secure_hash, at, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source_err) => {
                    return Err(BackupError::Copy {
                        from: source.to_path_buf(),
                        to: candidate,
                        source: source_err,
                    })
                }
            }
        }
        Err(BackupError::NameExhausted(source.to_path_buf()))
    }
}

impl BackupSink for DirectoryBackup {
    fn backup(&self, source: &Path, secure_hash: &Hash, at: DateTime<Utc>) -> Result<PathBuf, BackupError> {
        fs::create_dir_all(&self.root).map_err(|e| BackupError::CreateDir {
            path: self.root.clone(),
            source: e,
        })?;

        let (dest, file) = self.create_unique(source, secure_hash, at)?;
        if let Err(e) = copy_into(source, file) {
            discard(&dest);
            return Err(BackupError::Copy {
                from: source.to_path_buf(),
                to: dest,
                source: e,
            });
        }

        let actual = match self.hasher.compute_secure(&dest) {
            Ok(hash) => hash,
            Err(e) => {
                discard(&dest);
                return Err(e.into());
            }
        };
        if actual != *secure_hash {
            discard(&dest);
            return Err(BackupError::IntegrityMismatch {
                backup: dest,
                expected: hash_to_hex(secure_hash),
                actual: hash_to_hex(&actual),
            });
        }

        log::debug!("Backed up {} to {}", source.display(), dest.display());
        Ok(dest)
    }
}

/// Backup file name for `source`.
///
/// `attempt` 0 yields the plain name; later attempts append `-N` to the
/// timestamp.
#[must_use]
pub fn backup_file_name(source: &Path, secure_hash: &Hash, at: DateTime<Utc>, attempt: u32) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let hex = hash_to_hex(secure_hash);
    let mut name = format!("{stem}.{}.{}", &hex[..12], at.format("%Y%m%dT%H%M%S%.9f"));
    if attempt > 0 {
        name.push_str(&format!("-{attempt}"));
    }
    if let Some(ext) = source.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap()
    }

    #[test]
    fn test_backup_file_name_format() {
        let name = backup_file_name(Path::new("/x/report.pdf"), &[0xab; 32], at(), 0);
        assert_eq!(name, "report.abababababab.20231114T221320.123456789.pdf");
        let second = backup_file_name(Path::new("/x/report.pdf"), &[0xab; 32], at(), 2);
        assert_eq!(second, "report.abababababab.20231114T221320.123456789-2.pdf");
        let bare = backup_file_name(Path::new("/x/Makefile"), &[0xab; 32], at(), 0);
        assert_eq!(bare, "Makefile.abababababab.20231114T221320.123456789");
    }

    #[test]
    fn test_backup_copies_and_verifies() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, b"payload").unwrap();
        let hash = *blake3::hash(b"payload").as_bytes();

        let sink = DirectoryBackup::new(dir.path().join("backups"));
        let dest = sink.backup(&src, &hash, at()).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
        assert!(src.exists());
    }

    #[test]
    fn test_backup_name_collision() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, b"payload").unwrap();
        let hash = *blake3::hash(b"payload").as_bytes();

        let sink = DirectoryBackup::new(dir.path().join("backups"));
        let first = sink.backup(&src, &hash, at()).unwrap();
        let second = sink.backup(&src, &hash, at()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_integrity_mismatch_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, b"payload").unwrap();

        let backups = dir.path().join("backups");
        let sink = DirectoryBackup::new(&backups);
        let result = sink.backup(&src, &[0u8; 32], at());
        assert!(matches!(result, Err(BackupError::IntegrityMismatch { .. })));
        assert_eq!(fs::read_dir(&backups).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let sink = DirectoryBackup::new(dir.path().join("backups"));
        let result = sink.backup(&dir.path().join("nope"), &[0u8; 32], at());
        assert!(matches!(result, Err(BackupError::Copy { .. })));
    }
}
