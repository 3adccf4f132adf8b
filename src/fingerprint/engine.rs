//! Cache-coherent fingerprinting.
//!
//! [`FingerprintEngine::get_or_compute`] returns the stored record while the
//! file's (size, mtime) are unchanged, and otherwise recomputes both hashes
//! and persists them. Unreadable and empty files produce no record, and any
//! row left over from an earlier state of the file is dropped; that outcome
//! is returned as a value so batch callers can count it and move on. Only
//! store failures are errors.
//!
//! Every store write for a path happens under that path's [`PathLocks`]
//! entry, the same table backup-then-delete and restore use.

use std::fs;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use super::hasher::{HashError, Hasher};
use crate::actions::PathLocks;
use crate::clock::{system_clock, SharedClock};
use crate::scanner::path_utils::absolutize;
use crate::store::{FileFingerprint, FingerprintStore, StoreResult};

/// Outcome of fingerprinting one path.
#[derive(Debug)]
pub enum Lookup {
    /// Stored record was still valid.
    Cached(FileFingerprint),
    /// Hashes were (re)computed and persisted.
    Computed(FileFingerprint),
    /// Zero-length file; never grouped.
    Empty(PathBuf),
    /// Identity unknown; excluded from grouping.
    Unreadable(HashError),
}

impl Lookup {
    /// The fingerprint, if one is available.
    #[must_use]
    pub fn fingerprint(&self) -> Option<&FileFingerprint> {
        match self {
            Self::Cached(fp) | Self::Computed(fp) => Some(fp),
            Self::Empty(_) | Self::Unreadable(_) => None,
        }
    }

    /// Consume into the fingerprint, if any.
    #[must_use]
    pub fn into_fingerprint(self) -> Option<FileFingerprint> {
        match self {
            Self::Cached(fp) | Self::Computed(fp) => Some(fp),
            Self::Empty(_) | Self::Unreadable(_) => None,
        }
    }
}

/// Snapshot of engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Lookups answered from the store.
    pub cache_hits: u64,
    /// Quick hashes computed.
    pub quick_computations: u64,
    /// Secure hashes computed.
    pub secure_computations: u64,
    /// Files whose identity could not be established.
    pub unreadable: u64,
    /// Zero-length files skipped.
    pub empty: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cache_hits: AtomicU64,
    quick: AtomicU64,
    secure: AtomicU64,
    unreadable: AtomicU64,
    empty: AtomicU64,
}

/// Fingerprints files against a shared [`FingerprintStore`].
///
/// ```no_run
/// use safedupe::fingerprint::FingerprintEngine;
/// use safedupe::store::FingerprintStore;
/// use std::path::Path;
/// use std::sync::Arc;
///
/// let store = Arc::new(FingerprintStore::open(Path::new("store.db")).unwrap());
/// let engine = FingerprintEngine::new(store);
/// let lookup = engine.get_or_compute(Path::new("report.pdf"), false).unwrap();
/// if let Some(fp) = lookup.fingerprint() {
///     println!("{} -> {}", fp.path.display(), fp.group_id());
/// }
/// ```
#[derive(Clone)]
pub struct FingerprintEngine {
    hasher: Hasher,
    store: Arc<FingerprintStore>,
    clock: SharedClock,
    locks: Arc<PathLocks>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for FingerprintEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintEngine")
            .field("hasher", &self.hasher)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl FingerprintEngine {
    /// Engine with the default hasher and the wall clock.
    #[must_use]
    pub fn new(store: Arc<FingerprintStore>) -> Self {
        Self {
            hasher: Hasher::new(),
            store,
            clock: system_clock(),
            locks: Arc::new(PathLocks::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Share a lock table with the actors that delete and restore files.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<PathLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Replace the hasher.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Replace the clock used for `computed_at` timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// The hasher in use.
    #[must_use]
    pub fn hasher(&self) -> &Hasher {
        &self.hasher
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<FingerprintStore> {
        &self.store
    }

    /// Current counter values.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            quick_computations: self.counters.quick.load(Ordering::Relaxed),
            secure_computations: self.counters.secure.load(Ordering::Relaxed),
            unreadable: self.counters.unreadable.load(Ordering::Relaxed),
            empty: self.counters.empty.load(Ordering::Relaxed),
        }
    }

    /// Return a valid fingerprint for `path`, computing it if needed.
    ///
    /// With `force_rehash` the stored record is ignored. Relative paths are
    /// resolved against the current directory. The file is opened by exactly
    /// the bytes given; a stored record is reused only when it was written
    /// for that same spelling.
    ///
    /// # Errors
    ///
    /// Only [`StoreError`](crate::store::StoreError); unreadable files are
    /// reported as [`Lookup::Unreadable`].
    pub fn get_or_compute(&self, path: &Path, force_rehash: bool) -> StoreResult<Lookup> {
        let path = resolve(path).into_owned();
        let _guard = self.locks.lock(&path);

        let (size, modified) = match stat(&path) {
            Ok(meta) => meta,
            Err(e) => return self.unreadable(e),
        };

        if size == 0 {
            self.counters.empty.fetch_add(1, Ordering::Relaxed);
            log::trace!("Skipping empty file: {}", path.display());
            self.drop_stale(&path)?;
            return Ok(Lookup::Empty(path));
        }

        if !force_rehash {
            if let Some(stored) = self.store.get_by_path(&path)? {
                if stored.path.as_os_str() != path.as_os_str() {
                    log::debug!(
                        "Fingerprint stored for {} not reused for {}",
                        stored.path.display(),
                        path.display()
                    );
                } else if stored.is_fresh(size, modified) {
                    self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    log::trace!("Fingerprint cache hit: {}", path.display());
                    return Ok(Lookup::Cached(stored));
                } else {
                    log::debug!("Fingerprint stale (size/mtime changed): {}", path.display());
                }
            }
        }

        let quick_hash = match self.hasher.compute_quick(&path) {
            Ok(h) => h,
            Err(e) => return self.unreadable(e),
        };
        self.counters.quick.fetch_add(1, Ordering::Relaxed);
        let quick_computed_at = self.clock.now();

        let secure_hash = match self.hasher.compute_secure(&path) {
            Ok(h) => h,
            Err(e) => return self.unreadable(e),
        };
        self.counters.secure.fetch_add(1, Ordering::Relaxed);

        let fingerprint = FileFingerprint {
            path,
            size,
            modified,
            quick_hash,
            secure_hash,
            quick_computed_at,
            secure_computed_at: self.clock.now(),
        };
        self.store.upsert(&fingerprint)?;
        log::trace!("Fingerprint computed: {}", fingerprint.path.display());
        Ok(Lookup::Computed(fingerprint))
    }

    /// Drop whatever is stored for `path`, e.g. after a deletion event.
    ///
    /// # Errors
    ///
    /// [`StoreError`](crate::store::StoreError) on database failure.
    pub fn forget(&self, path: &Path) -> StoreResult<bool> {
        let path = resolve(path);
        let _guard = self.locks.lock(&path);
        self.drop_stale(&path)
    }

    /// Caller holds the path lock.
    fn drop_stale(&self, path: &Path) -> StoreResult<bool> {
        let removed = self.store.remove(path)?;
        if removed {
            log::debug!("Dropped stored fingerprint for {}", path.display());
        }
        Ok(removed)
    }

    /// Caller holds the path lock.
    fn unreadable(&self, error: HashError) -> StoreResult<Lookup> {
        self.counters.unreadable.fetch_add(1, Ordering::Relaxed);
        log::warn!("Cannot fingerprint {}: {}", error.path().display(), error);
        self.drop_stale(error.path())?;
        Ok(Lookup::Unreadable(error))
    }
}

fn resolve(path: &Path) -> Cow<'_, Path> {
    if path.is_absolute() {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(absolutize(path))
    }
}

fn stat(path: &Path) -> Result<(u64, SystemTime), HashError> {
    let metadata = fs::metadata(path).map_err(|e| HashError::from_io(path, e))?;
    if !metadata.is_file() {
        return Err(HashError::NotAFile(path.to_path_buf()));
    }
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    Ok((metadata.len(), modified))
}
