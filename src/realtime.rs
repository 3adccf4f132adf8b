//! Real-time duplicate detection.
//!
//! A filesystem watcher (not part of this crate) calls
//! [`RealTimeDetector::on_file_observed`] for every event. The detector
//! fingerprints the file, checks it against the store and reports whether
//! it duplicates something already known.
//!
//! Bursts of events for the same path are absorbed by a [`DebounceCache`]
//! owned by the detector: a repeat inside the window is ignored as long as
//! the file's size and mtime have not moved.
//!
//! A deletion event, or an event for a path that has vanished, drops the
//! stored fingerprint so the file stops appearing in groups.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{system_clock, SharedClock};
use crate::duplicates::Grouper;
use crate::fingerprint::{FingerprintEngine, HashError, Lookup};
use crate::scanner::path_utils::path_key;
use crate::store::StoreResult;

/// Kind of filesystem notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A new file appeared.
    Created,
    /// Contents changed; forces a rehash.
    Modified,
    /// The file now lives at this path.
    Renamed,
    /// The file is gone.
    Deleted,
}

/// What the detector concluded about one event.
#[derive(Debug)]
pub enum Observation {
    /// No other file has this content.
    Unique,
    /// Existing files with identical content.
    DuplicateOf(Vec<PathBuf>),
    /// Ignored as a repeat inside the debounce window.
    Debounced,
    /// Not a candidate for grouping (empty file).
    Skipped,
    /// Could not be read; identity unknown.
    Unreadable(HashError),
    /// The file no longer exists.
    Gone,
}

#[derive(Debug, Clone, Copy)]
struct Seen {
    at: DateTime<Utc>,
    size: u64,
    modified: SystemTime,
}

/// Bounded record of recently processed paths.
#[derive(Debug)]
pub struct DebounceCache {
    window: chrono::Duration,
    capacity: usize,
    entries: HashMap<Vec<u8>, Seen>,
}

impl DebounceCache {
    /// Cache holding at most `capacity` paths for `window`.
    #[must_use]
    pub fn new(window: std::time::Duration, capacity: usize) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
            capacity: capacity.max(1),
            entries: HashMap::new(),
        }
    }

    /// Check whether an event for `key` at `now` repeats one already handled.
    #[must_use]
    pub fn is_repeat(&self, key: &[u8], size: u64, modified: SystemTime, now: DateTime<Utc>) -> bool {
        self.entries.get(key).is_some_and(|seen| {
            now - seen.at < self.window && seen.size == size && seen.modified == modified
        })
    }

    /// Remember that `key` was processed at `now`.
    pub fn record(&mut self, key: Vec<u8>, size: u64, modified: SystemTime, now: DateTime<Utc>) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let window = self.window;
            self.entries.retain(|_, seen| now - seen.at < window);
            if self.entries.len() >= self.capacity {
                if let Some(oldest) = self
                    .entries
                    .iter()
                    .min_by_key(|(_, seen)| seen.at)
                    .map(|(k, _)| k.clone())
                {
                    self.entries.remove(&oldest);
                }
            }
        }
        self.entries.insert(key, Seen { at: now, size, modified });
    }

    /// Drop `key`.
    pub fn forget(&mut self, key: &[u8]) {
        self.entries.remove(key);
    }

    /// Number of remembered paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Incremental duplicate check for single file events.
pub struct RealTimeDetector {
    engine: FingerprintEngine,
    grouper: Grouper,
    debounce: Mutex<DebounceCache>,
    clock: SharedClock,
}

impl std::fmt::Debug for RealTimeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealTimeDetector").finish_non_exhaustive()
    }
}

impl RealTimeDetector {
    /// Detector sharing `engine`'s store, with its own debounce cache.
    #[must_use]
    pub fn new(engine: FingerprintEngine, debounce: DebounceCache) -> Self {
        Self {
            grouper: Grouper::new(Arc::clone(engine.store())),
            engine,
            debounce: Mutex::new(debounce),
            clock: system_clock(),
        }
    }

    /// Use `clock` for the debounce window.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Handle one filesystem event.
    ///
    /// # Errors
    ///
    /// [`StoreError`](crate::store::StoreError) if the store is unavailable.
    pub fn on_file_observed(&self, path: &Path, kind: EventKind) -> StoreResult<Observation> {
        let key = path_key(path);

        if kind == EventKind::Deleted {
            log::trace!("Observed deletion: {}", path.display());
            return self.gone(path, &key);
        }

        let (size, modified) = match fs::metadata(path) {
            Ok(meta) => (meta.len(), meta.modified().unwrap_or(SystemTime::UNIX_EPOCH)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.gone(path, &key),
            Err(e) => return Ok(Observation::Unreadable(HashError::from_io(path, e))),
        };

        let now = self.clock.now();
        if self.with_cache(|cache| cache.is_repeat(&key, size, modified, now)) {
            log::trace!("Debounced {:?} for {}", kind, path.display());
            return Ok(Observation::Debounced);
        }

        let lookup = self
            .engine
            .get_or_compute(path, kind == EventKind::Modified)?;
        let fingerprint = match lookup {
            Lookup::Cached(fp) | Lookup::Computed(fp) => fp,
            Lookup::Empty(_) => return Ok(Observation::Skipped),
            Lookup::Unreadable(e) => return Ok(Observation::Unreadable(e)),
        };
        self.with_cache(|cache| cache.record(key, fingerprint.size, fingerprint.modified, now));

        let matched = self.grouper.detect_incremental(&fingerprint)?;
        if matched.is_unique() {
            Ok(Observation::Unique)
        } else {
            log::debug!(
                "{} duplicates {} existing file(s)",
                path.display(),
                matched.duplicates.len()
            );
            Ok(Observation::DuplicateOf(matched.paths()))
        }
    }

    fn gone(&self, path: &Path, key: &[u8]) -> StoreResult<Observation> {
        self.with_cache(|cache| cache.forget(key));
        self.engine.forget(path)?;
        Ok(Observation::Gone)
    }

    fn with_cache<T>(&self, f: impl FnOnce(&mut DebounceCache) -> T) -> T {
        let mut cache = self.debounce.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut cache)
    }
}
