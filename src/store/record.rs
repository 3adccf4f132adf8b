//! Persisted record types.
//!
//! Every row crossing the store boundary is decoded through a validating
//! constructor. A malformed row (wrong hash width, unknown version, empty
//! path) surfaces as [`StoreError::InvalidRecord`](super::StoreError) rather
//! than leaking half-valid data into grouping or deletion.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::{hash_to_hex, hex_to_hash, Hash};
use crate::scanner::path_utils::{path_bytes, path_from_bytes, path_key};

/// Schema version written with every record.
pub const RECORD_VERSION: u32 = 2;

/// Reason a stored row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Row written by an unknown schema version.
    #[error("unsupported record version {0}")]
    UnsupportedVersion(u32),
    /// A hash column does not hold 32 bytes.
    #[error("hash column has {0} bytes, expected 32")]
    BadHashWidth(usize),
    /// A group id is not 64 hex characters.
    #[error("malformed group id '{0}'")]
    BadGroupId(String),
    /// A path column is empty.
    #[error("empty path")]
    EmptyPath,
    /// A size column is negative.
    #[error("negative size {0}")]
    NegativeSize(i64),
}

/// Content identity of one file at one (size, mtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// Path exactly as found on disk.
    pub path: PathBuf,
    /// Size in bytes when hashed.
    pub size: u64,
    /// Modification time when hashed.
    pub modified: SystemTime,
    /// Sampled pre-filter hash.
    pub quick_hash: Hash,
    /// Full-content hash; the sole authority for identity.
    pub secure_hash: Hash,
    /// When the quick hash was computed.
    pub quick_computed_at: DateTime<Utc>,
    /// When the secure hash was computed.
    pub secure_computed_at: DateTime<Utc>,
}

impl FileFingerprint {
    /// Group id derived from the secure hash.
    #[must_use]
    pub fn group_id(&self) -> String {
        hash_to_hex(&self.secure_hash)
    }

    /// `true` when the record still describes a file with this size and mtime.
    #[must_use]
    pub fn is_fresh(&self, size: u64, modified: SystemTime) -> bool {
        self.size == size && self.modified == modified
    }

    /// Age of the file content relative to `now`, in fractional days.
    #[must_use]
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        age_days(self.modified, now)
    }

    /// Rebuild a fingerprint from raw column values.
    ///
    /// # Errors
    ///
    /// [`RecordError`] if any column fails validation.
    #[allow(clippy::too_many_arguments)]
    pub fn from_columns(
        version: u32,
        path: Vec<u8>,
        size: i64,
        mtime_ns: i64,
        quick_hash: &[u8],
        secure_hash: &[u8],
        quick_computed_at: DateTime<Utc>,
        secure_computed_at: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        if version != RECORD_VERSION {
            return Err(RecordError::UnsupportedVersion(version));
        }
        if path.is_empty() {
            return Err(RecordError::EmptyPath);
        }
        if size < 0 {
            return Err(RecordError::NegativeSize(size));
        }
        Ok(Self {
            path: path_from_bytes(path),
            size: size as u64,
            modified: nanos_to_system_time(mtime_ns),
            quick_hash: hash_from_slice(quick_hash)?,
            secure_hash: hash_from_slice(secure_hash)?,
            quick_computed_at,
            secure_computed_at,
        })
    }
}

/// One backup-then-delete event. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRecord {
    /// Ledger row id.
    pub id: i64,
    /// Where the file lived.
    pub deleted_path: PathBuf,
    /// Verified backup copy.
    pub backup_path: PathBuf,
    /// Secure hash (hex) shared with the retained copy.
    pub group_id: String,
    /// Size in bytes.
    pub size: u64,
    /// When the original was removed.
    pub deleted_at: DateTime<Utc>,
    /// The canonical member that was kept.
    pub duplicate_of: PathBuf,
    /// `false` once restored or purged by the retention sweep.
    pub restorable: bool,
}

impl DeletionRecord {
    /// Secure hash as bytes.
    ///
    /// # Errors
    ///
    /// [`RecordError::BadGroupId`] if the stored id is malformed.
    pub fn secure_hash(&self) -> Result<Hash, RecordError> {
        hex_to_hash(&self.group_id).ok_or_else(|| RecordError::BadGroupId(self.group_id.clone()))
    }

    /// Rebuild a ledger record from raw column values.
    ///
    /// # Errors
    ///
    /// [`RecordError`] if any column fails validation.
    #[allow(clippy::too_many_arguments)]
    pub fn from_columns(
        version: u32,
        id: i64,
        deleted_path: Vec<u8>,
        backup_path: Vec<u8>,
        group_id: String,
        size: i64,
        deleted_at: DateTime<Utc>,
        duplicate_of: Vec<u8>,
        restorable: bool,
    ) -> Result<Self, RecordError> {
        if version != RECORD_VERSION {
            return Err(RecordError::UnsupportedVersion(version));
        }
        if deleted_path.is_empty() || backup_path.is_empty() || duplicate_of.is_empty() {
            return Err(RecordError::EmptyPath);
        }
        if hex_to_hash(&group_id).is_none() {
            return Err(RecordError::BadGroupId(group_id));
        }
        if size < 0 {
            return Err(RecordError::NegativeSize(size));
        }
        Ok(Self {
            id,
            deleted_path: path_from_bytes(deleted_path),
            backup_path: path_from_bytes(backup_path),
            group_id,
            size: size as u64,
            deleted_at,
            duplicate_of: path_from_bytes(duplicate_of),
            restorable,
        })
    }
}

/// A ledger entry before it has been assigned an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeletion {
    /// Where the file lived.
    pub deleted_path: PathBuf,
    /// Verified backup copy.
    pub backup_path: PathBuf,
    /// Secure hash of the content.
    pub secure_hash: Hash,
    /// Size in bytes.
    pub size: u64,
    /// When the original was removed.
    pub deleted_at: DateTime<Utc>,
    /// The canonical member that was kept.
    pub duplicate_of: PathBuf,
}

fn hash_from_slice(bytes: &[u8]) -> Result<Hash, RecordError> {
    bytes
        .try_into()
        .map_err(|_| RecordError::BadHashWidth(bytes.len()))
}

/// Nanoseconds since the Unix epoch; negative before it.
#[must_use]
pub fn system_time_to_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_nanos()).unwrap_or(i64::MAX),
    }
}

/// Inverse of [`system_time_to_nanos`].
#[must_use]
pub fn nanos_to_system_time(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos as u64)
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}

/// Days between a file timestamp and `now`, clamped at zero.
#[must_use]
pub fn age_days(modified: SystemTime, now: DateTime<Utc>) -> f64 {
    let modified: DateTime<Utc> = modified.into();
    let secs = (now - modified).num_seconds().max(0);
    secs as f64 / 86_400.0
}

/// Path as stored in a blob column, byte for byte.
#[must_use]
pub fn path_column(path: &Path) -> Vec<u8> {
    path_bytes(path).into_owned()
}

/// Lookup key column; see [`path_key`].
#[must_use]
pub fn key_column(path: &Path) -> Vec<u8> {
    path_key(path)
}
