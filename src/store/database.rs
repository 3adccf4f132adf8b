//! SQLite-backed fingerprint store and deletion ledger.
//!
//! One database file holds three tables:
//!
//! * `fingerprints` - keyed by path, the cache of content identity
//! * `deletions` - append-only ledger of backup-then-delete events
//! * `confirmations` - append-only log of explicit user confirmations
//!
//! Paths are stored as blobs holding the exact bytes the OS reported, so
//! names that are not valid UTF-8 survive a round trip. Fingerprints are
//! looked up by a separate `path_key` column (NFC for UTF-8 names) so an
//! NFD spelling and an NFC spelling of one name share a row.
//!
//! The connection sits behind a mutex; per-path upserts are a single
//! `INSERT .. ON CONFLICT DO UPDATE`, so concurrent writers to the same path
//! cannot interleave (last writer wins, which is fine because fingerprinting
//! is deterministic).

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::record::{
    key_column, path_column, system_time_to_nanos, DeletionRecord, FileFingerprint, NewDeletion,
    RecordError, RECORD_VERSION,
};
use crate::fingerprint::{hash_to_hex, Hash};

/// Errors from the durable store. Always fatal for the enclosing operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying SQLite call failed.
    #[error("store unavailable: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("cannot create store directory {path}: {source}")]
    CreateDir {
        /// Directory that failed
        path: std::path::PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A row failed validation at the store boundary.
    #[error("invalid record '{key}': {source}")]
    InvalidRecord {
        /// Path or id of the offending row
        key: String,
        /// What was wrong with it
        #[source]
        source: RecordError,
    },

    /// The database was written with an incompatible layout.
    #[error("store schema version {found} is not supported (expected {expected})")]
    SchemaVersion {
        /// Version found in the file
        found: i64,
        /// Version this build writes
        expected: i64,
    },

    /// A thread panicked while holding the connection.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

const SCHEMA_VERSION: i64 = 2;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS fingerprints (
    path_key           BLOB PRIMARY KEY NOT NULL,
    path               BLOB NOT NULL,
    version            INTEGER NOT NULL,
    size               INTEGER NOT NULL,
    mtime_ns           INTEGER NOT NULL,
    quick_hash         BLOB NOT NULL,
    secure_hash        BLOB NOT NULL,
    quick_computed_at  INTEGER NOT NULL,
    secure_computed_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_fingerprints_quick ON fingerprints(quick_hash);
CREATE INDEX IF NOT EXISTS idx_fingerprints_secure ON fingerprints(secure_hash);

CREATE TABLE IF NOT EXISTS deletions (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    version      INTEGER NOT NULL,
    deleted_path BLOB NOT NULL,
    backup_path  BLOB NOT NULL,
    group_id     TEXT NOT NULL,
    size         INTEGER NOT NULL,
    deleted_at   INTEGER NOT NULL,
    duplicate_of BLOB NOT NULL,
    restorable   INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_deletions_group ON deletions(group_id);

CREATE TABLE IF NOT EXISTS confirmations (
    record_id    INTEGER NOT NULL REFERENCES deletions(id),
    confirmed_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_confirmations_record ON confirmations(record_id);
";

const FINGERPRINT_COLUMNS: &str = "version, path, size, mtime_ns, quick_hash, secure_hash, \
                                   quick_computed_at, secure_computed_at";

const DELETION_COLUMNS: &str = "version, id, deleted_path, backup_path, group_id, size, \
                                deleted_at, duplicate_of, restorable";

/// Durable path → fingerprint mapping plus the deletion ledger.
pub struct FingerprintStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for FingerprintStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintStore").finish_non_exhaustive()
    }
}

impl FingerprintStore {
    /// Open (or create) a store at `path`.
    ///
    /// # Errors
    ///
    /// [`StoreError`] if the directory or database cannot be created.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        log::debug!("Opened fingerprint store at {}", path.display());
        Self::init(conn)
    }

    /// Open a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// [`StoreError`] if SQLite cannot initialize the schema.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        let found: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if found == 0 {
            let legacy: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'fingerprints'",
                [],
                |row| row.get(0),
            )?;
            if legacy > 0 {
                return Err(StoreError::SchemaVersion {
                    found: 1,
                    expected: SCHEMA_VERSION,
                });
            }
        } else if found != SCHEMA_VERSION {
            return Err(StoreError::SchemaVersion {
                found,
                expected: SCHEMA_VERSION,
            });
        }
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // ── Fingerprints ─────────────────────────────────────────────

    /// Insert or replace the fingerprint for its path key.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on database failure.
    pub fn upsert(&self, fp: &FileFingerprint) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO fingerprints (version, path, size, mtime_ns, quick_hash, secure_hash, \
                                       quick_computed_at, secure_computed_at, path_key) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT(path_key) DO UPDATE SET \
                version = excluded.version, path = excluded.path, \
                size = excluded.size, mtime_ns = excluded.mtime_ns, \
                quick_hash = excluded.quick_hash, secure_hash = excluded.secure_hash, \
                quick_computed_at = excluded.quick_computed_at, \
                secure_computed_at = excluded.secure_computed_at",
            params![
                RECORD_VERSION,
                path_column(&fp.path),
                fp.size as i64,
                system_time_to_nanos(fp.modified),
                &fp.quick_hash[..],
                &fp.secure_hash[..],
                fp.quick_computed_at.timestamp_micros(),
                fp.secure_computed_at.timestamp_micros(),
                key_column(&fp.path),
            ],
        )?;
        log::trace!("Stored fingerprint for {}", fp.path.display());
        Ok(())
    }

    /// Look up the fingerprint stored under `path`'s key.
    ///
    /// The returned record carries the spelling that was stored, which may
    /// differ from `path` in Unicode normalization.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on database failure or an invalid row.
    pub fn get_by_path(&self, path: &Path) -> StoreResult<Option<FileFingerprint>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {FINGERPRINT_COLUMNS} FROM fingerprints WHERE path_key = ?1"),
                params![key_column(path)],
                fingerprint_from_row,
            )
            .optional()?;
        raw.map(|r| {
            r.map_err(|source| StoreError::InvalidRecord {
                key: path.display().to_string(),
                source,
            })
        })
        .transpose()
    }

    /// All fingerprints sharing a quick hash.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on database failure or an invalid row.
    pub fn find_by_quick_hash(&self, hash: &Hash) -> StoreResult<Vec<FileFingerprint>> {
        self.query_fingerprints(
            &format!(
                "SELECT {FINGERPRINT_COLUMNS} FROM fingerprints WHERE quick_hash = ?1 ORDER BY path"
            ),
            hash,
        )
    }

    /// All fingerprints sharing a secure hash.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on database failure or an invalid row.
    pub fn find_by_secure_hash(&self, hash: &Hash) -> StoreResult<Vec<FileFingerprint>> {
        self.query_fingerprints(
            &format!(
                "SELECT {FINGERPRINT_COLUMNS} FROM fingerprints WHERE secure_hash = ?1 ORDER BY path"
            ),
            hash,
        )
    }

    /// Every secure-hash bucket holding more than one record.
    ///
    /// Records are returned as stored; callers prune paths that have since
    /// disappeared from disk.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on database failure or an invalid row.
    pub fn multi_member_buckets(&self) -> StoreResult<Vec<(Hash, Vec<FileFingerprint>)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FINGERPRINT_COLUMNS} FROM fingerprints \
             WHERE secure_hash IN ( \
                 SELECT secure_hash FROM fingerprints GROUP BY secure_hash HAVING COUNT(*) > 1) \
             ORDER BY secure_hash, path"
        ))?;
        let rows = stmt.query_map([], fingerprint_from_row)?;

        let mut buckets: Vec<(Hash, Vec<FileFingerprint>)> = Vec::new();
        for row in rows {
            let fp = row?.map_err(|source| StoreError::InvalidRecord {
                key: "<bucket>".to_string(),
                source,
            })?;
            match buckets.last_mut() {
                Some((hash, members)) if *hash == fp.secure_hash => members.push(fp),
                _ => buckets.push((fp.secure_hash, vec![fp])),
            }
        }
        Ok(buckets)
    }

    /// Drop the record stored under `path`'s key. Returns whether a row existed.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on database failure.
    pub fn remove(&self, path: &Path) -> StoreResult<bool> {
        let removed = self.conn()?.execute(
            "DELETE FROM fingerprints WHERE path_key = ?1",
            params![key_column(path)],
        )?;
        Ok(removed > 0)
    }

    /// Number of stored fingerprints.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on database failure.
    pub fn fingerprint_count(&self) -> StoreResult<u64> {
        let count: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM fingerprints", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn query_fingerprints(&self, sql: &str, hash: &Hash) -> StoreResult<Vec<FileFingerprint>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![&hash[..]], fingerprint_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.map_err(|source| StoreError::InvalidRecord {
                key: hash_to_hex(hash),
                source,
            })?);
        }
        Ok(out)
    }

    // ── Deletion ledger ──────────────────────────────────────────

    /// Append a deletion record and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on database failure.
    pub fn append_deletion(&self, entry: &NewDeletion) -> StoreResult<DeletionRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO deletions (version, deleted_path, backup_path, group_id, size, \
                                    deleted_at, duplicate_of, restorable) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
            params![
                RECORD_VERSION,
                path_column(&entry.deleted_path),
                path_column(&entry.backup_path),
                hash_to_hex(&entry.secure_hash),
                entry.size as i64,
                entry.deleted_at.timestamp_micros(),
                path_column(&entry.duplicate_of),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(DeletionRecord {
            id,
            deleted_path: entry.deleted_path.clone(),
            backup_path: entry.backup_path.clone(),
            group_id: hash_to_hex(&entry.secure_hash),
            size: entry.size,
            deleted_at: truncate_to_micros(entry.deleted_at),
            duplicate_of: entry.duplicate_of.clone(),
            restorable: true,
        })
    }

    /// Fetch one ledger record.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on database failure or an invalid row.
    pub fn deletion(&self, id: i64) -> StoreResult<Option<DeletionRecord>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {DELETION_COLUMNS} FROM deletions WHERE id = ?1"),
                params![id],
                deletion_from_row,
            )
            .optional()?;
        raw.map(|r| {
            r.map_err(|source| StoreError::InvalidRecord {
                key: id.to_string(),
                source,
            })
        })
        .transpose()
    }

    /// Ledger records, newest first.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on database failure or an invalid row.
    pub fn deletions(&self, limit: Option<usize>) -> StoreResult<Vec<DeletionRecord>> {
        let limit = limit.map_or(-1, |l| l as i64);
        self.query_deletions(
            &format!("SELECT {DELETION_COLUMNS} FROM deletions ORDER BY id DESC LIMIT ?1"),
            params![limit],
        )
    }

    /// Flip `restorable` to false. Returns `false` if it already was.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on database failure.
    pub fn mark_consumed(&self, id: i64) -> StoreResult<bool> {
        let changed = self.conn()?.execute(
            "UPDATE deletions SET restorable = 0 WHERE id = ?1 AND restorable = 1",
            params![id],
        )?;
        Ok(changed > 0)
    }

    /// Record an explicit user confirmation of a deletion.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on database failure.
    pub fn append_confirmation(&self, record_id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO confirmations (record_id, confirmed_at) VALUES (?1, ?2)",
            params![record_id, at.timestamp_micros()],
        )?;
        Ok(())
    }

    /// Restorable records deleted before `cutoff` whose group has a confirmed
    /// deletion at or after them.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on database failure or an invalid row.
    pub fn sweep_candidates(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<DeletionRecord>> {
        self.query_deletions(
            &format!(
                "SELECT {DELETION_COLUMNS} FROM deletions d \
                 WHERE d.restorable = 1 AND d.deleted_at < ?1 \
                   AND EXISTS ( \
                       SELECT 1 FROM deletions later \
                       JOIN confirmations c ON c.record_id = later.id \
                       WHERE later.group_id = d.group_id AND later.deleted_at >= d.deleted_at) \
                 ORDER BY d.id"
            ),
            params![cutoff.timestamp_micros()],
        )
    }

    fn query_deletions(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Vec<DeletionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, deletion_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.map_err(|source| StoreError::InvalidRecord {
                key: "<deletion>".to_string(),
                source,
            })?);
        }
        Ok(out)
    }
}

type Decoded<T> = Result<T, RecordError>;

fn fingerprint_from_row(row: &Row<'_>) -> rusqlite::Result<Decoded<FileFingerprint>> {
    let quick: Vec<u8> = row.get(4)?;
    let secure: Vec<u8> = row.get(5)?;
    Ok(FileFingerprint::from_columns(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        &quick,
        &secure,
        micros_to_datetime(row.get(6)?),
        micros_to_datetime(row.get(7)?),
    ))
}

fn deletion_from_row(row: &Row<'_>) -> rusqlite::Result<Decoded<DeletionRecord>> {
    let restorable: i64 = row.get(8)?;
    Ok(DeletionRecord::from_columns(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        micros_to_datetime(row.get(6)?),
        row.get(7)?,
        restorable != 0,
    ))
}

fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

fn truncate_to_micros(at: DateTime<Utc>) -> DateTime<Utc> {
    micros_to_datetime(at.timestamp_micros())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    fn fp(path: &str, quick: u8, secure: u8) -> FileFingerprint {
        let now = truncate_to_micros(Utc::now());
        FileFingerprint {
            path: PathBuf::from(path),
            size: 42,
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            quick_hash: [quick; 32],
            secure_hash: [secure; 32],
            quick_computed_at: now,
            secure_computed_at: now,
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let store = FingerprintStore::open_in_memory().unwrap();
        let record = fp("/a.txt", 1, 1);
        store.upsert(&record).unwrap();
        assert_eq!(store.get_by_path(Path::new("/a.txt")).unwrap(), Some(record));
        assert_eq!(store.get_by_path(Path::new("/missing")).unwrap(), None);
    }

    #[test]
    fn test_upsert_is_idempotent_and_replaces() {
        let store = FingerprintStore::open_in_memory().unwrap();
        store.upsert(&fp("/a.txt", 1, 1)).unwrap();
        store.upsert(&fp("/a.txt", 1, 1)).unwrap();
        store.upsert(&fp("/a.txt", 2, 2)).unwrap();
        assert_eq!(store.fingerprint_count().unwrap(), 1);
        let stored = store.get_by_path(Path::new("/a.txt")).unwrap().unwrap();
        assert_eq!(stored.secure_hash, [2; 32]);
    }

    #[test]
    fn test_find_by_hashes() {
        let store = FingerprintStore::open_in_memory().unwrap();
        store.upsert(&fp("/a", 1, 10)).unwrap();
        store.upsert(&fp("/b", 1, 11)).unwrap();
        store.upsert(&fp("/c", 2, 10)).unwrap();

        assert_eq!(store.find_by_quick_hash(&[1; 32]).unwrap().len(), 2);
        let secure = store.find_by_secure_hash(&[10; 32]).unwrap();
        let paths: Vec<_> = secure.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/a"), PathBuf::from("/c")]);
    }

    #[test]
    fn test_multi_member_buckets() {
        let store = FingerprintStore::open_in_memory().unwrap();
        store.upsert(&fp("/a", 1, 10)).unwrap();
        store.upsert(&fp("/b", 1, 10)).unwrap();
        store.upsert(&fp("/c", 1, 11)).unwrap();
        store.upsert(&fp("/d", 3, 12)).unwrap();
        store.upsert(&fp("/e", 3, 12)).unwrap();
        store.upsert(&fp("/f", 3, 12)).unwrap();

        let buckets = store.multi_member_buckets().unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].0, [10; 32]);
        assert_eq!(buckets[0].1.len(), 2);
        assert_eq!(buckets[1].1.len(), 3);
    }

    #[test]
    fn test_remove() {
        let store = FingerprintStore::open_in_memory().unwrap();
        store.upsert(&fp("/a", 1, 1)).unwrap();
        assert!(store.remove(Path::new("/a")).unwrap());
        assert!(!store.remove(Path::new("/a")).unwrap());
    }

    #[test]
    fn test_nfd_and_nfc_share_a_row() {
        let store = FingerprintStore::open_in_memory().unwrap();
        store.upsert(&fp("/docs/cafe\u{0301}.txt", 1, 1)).unwrap();
        let stored = store.get_by_path(Path::new("/docs/café.txt")).unwrap().unwrap();
        assert_eq!(stored.path, PathBuf::from("/docs/cafe\u{0301}.txt"));
        assert_eq!(store.fingerprint_count().unwrap(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_paths_stay_distinct() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let store = FingerprintStore::open_in_memory().unwrap();
        let a = Path::new(OsStr::from_bytes(b"/raw/a\xff.bin"));
        let b = Path::new(OsStr::from_bytes(b"/raw/a\xfe.bin"));
        let mut first = fp("/placeholder", 1, 1);
        first.path = a.to_path_buf();
        let mut second = fp("/placeholder", 1, 1);
        second.path = b.to_path_buf();
        store.upsert(&first).unwrap();
        store.upsert(&second).unwrap();

        assert_eq!(store.fingerprint_count().unwrap(), 2);
        assert_eq!(store.get_by_path(a).unwrap().unwrap().path, a);
        let bucket = store.find_by_secure_hash(&[1; 32]).unwrap();
        assert!(bucket.iter().any(|f| f.path == b));
    }

    #[test]
    fn test_legacy_layout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE fingerprints (path TEXT PRIMARY KEY NOT NULL);")
            .unwrap();
        drop(conn);

        let result = FingerprintStore::open(&path);
        assert!(matches!(result, Err(StoreError::SchemaVersion { found: 1, .. })));
    }

    #[test]
    fn test_append_and_consume_deletion() {
        let store = FingerprintStore::open_in_memory().unwrap();
        let record = store
            .append_deletion(&NewDeletion {
                deleted_path: PathBuf::from("/dup.txt"),
                backup_path: PathBuf::from("/backups/dup.txt"),
                secure_hash: [5; 32],
                size: 9,
                deleted_at: Utc::now(),
                duplicate_of: PathBuf::from("/orig.txt"),
            })
            .unwrap();

        assert!(record.restorable);
        assert_eq!(store.deletion(record.id).unwrap(), Some(record.clone()));
        assert!(store.mark_consumed(record.id).unwrap());
        assert!(!store.mark_consumed(record.id).unwrap());
        assert!(!store.deletion(record.id).unwrap().unwrap().restorable);
    }

    #[test]
    fn test_sweep_candidates_require_confirmation() {
        let store = FingerprintStore::open_in_memory().unwrap();
        let old = Utc::now() - chrono::Duration::days(60);
        let entry = NewDeletion {
            deleted_path: PathBuf::from("/dup.txt"),
            backup_path: PathBuf::from("/backups/dup.txt"),
            secure_hash: [5; 32],
            size: 9,
            deleted_at: old,
            duplicate_of: PathBuf::from("/orig.txt"),
        };
        let record = store.append_deletion(&entry).unwrap();
        let cutoff = Utc::now() - chrono::Duration::days(30);

        assert!(store.sweep_candidates(cutoff).unwrap().is_empty());

        store.append_confirmation(record.id, Utc::now()).unwrap();
        let candidates = store.sweep_candidates(cutoff).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, record.id);
    }

    #[test]
    fn test_open_on_disk_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");
        let store = FingerprintStore::open(&path).unwrap();
        store.upsert(&fp("/a", 1, 1)).unwrap();
        drop(store);

        let reopened = FingerprintStore::open(&path).unwrap();
        assert_eq!(reopened.fingerprint_count().unwrap(), 1);
    }
}
