//! Path-scoped mutual exclusion.
//!
//! Backup-then-delete, restore and fingerprint writes all hold a
//! [`PathGuard`] for the path they touch. One table is shared by every
//! component of a process, so no two of them can work on a path at once.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::scanner::path_utils::path_key;

/// Set of paths currently held.
#[derive(Debug, Default)]
pub struct PathLocks {
    held: Mutex<HashSet<Vec<u8>>>,
    released: Condvar,
}

impl PathLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<Vec<u8>>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until `path` is free, then hold it.
    pub fn lock(&self, path: &Path) -> PathGuard<'_> {
        let key = path_key(path);
        let mut held = self.held();
        while held.contains(&key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|e| e.into_inner());
        }
        held.insert(key.clone());
        PathGuard { locks: self, key }
    }

    /// Hold `path` if it is free.
    pub fn try_lock(&self, path: &Path) -> Option<PathGuard<'_>> {
        let key = path_key(path);
        let mut held = self.held();
        if held.contains(&key) {
            return None;
        }
        held.insert(key.clone());
        Some(PathGuard { locks: self, key })
    }

    /// Check whether `path` is currently held.
    #[must_use]
    pub fn is_locked(&self, path: &Path) -> bool {
        self.held().contains(&path_key(path))
    }
}

/// Exclusive hold on one path; released on drop.
#[derive(Debug)]
pub struct PathGuard<'a> {
    locks: &'a PathLocks,
    key: Vec<u8>,
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.locks.held().remove(&self.key);
        self.locks.released.notify_all();
    }
}
