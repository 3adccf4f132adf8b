//! Shared scratch tree and store for integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::FileTime;
use safedupe::actions::{DeletionExecutor, DirectoryBackup, PathLocks};
use safedupe::fingerprint::FingerprintEngine;
use safedupe::ledger::Ledger;
use safedupe::policy::Policy;
use safedupe::store::FingerprintStore;
use tempfile::TempDir;

/// Sept 2001; old enough to saturate every age factor.
pub const OLD: i64 = 1_000_000_000;

pub struct Fixture {
    pub dir: TempDir,
    pub store: Arc<FingerprintStore>,
    pub engine: FingerprintEngine,
    pub locks: Arc<PathLocks>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store =
            Arc::new(FingerprintStore::open(&dir.path().join("state").join("store.db")).unwrap());
        let locks = Arc::new(PathLocks::new());
        Self {
            engine: FingerprintEngine::new(Arc::clone(&store)).with_locks(Arc::clone(&locks)),
            store,
            locks,
            dir,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("files")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.path().join("backups")
    }

    /// Write a file under the scratch root without fingerprinting it.
    pub fn write(&self, rel: &str, content: &[u8], mtime: i64) -> PathBuf {
        let path = self.root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        set_mtime(&path, mtime);
        path
    }

    /// Write and fingerprint a file.
    pub fn file(&self, rel: &str, content: &[u8], mtime: i64) -> PathBuf {
        let path = self.write(rel, content, mtime);
        assert!(self
            .engine
            .get_or_compute(&path, false)
            .unwrap()
            .fingerprint()
            .is_some());
        path
    }

    pub fn executor(&self, policy: &Policy) -> DeletionExecutor {
        DeletionExecutor::new(
            Arc::clone(&self.store),
            policy,
            Box::new(DirectoryBackup::new(self.backup_dir())),
        )
        .unwrap()
        .with_locks(Arc::clone(&self.locks))
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(Arc::clone(&self.store)).with_locks(Arc::clone(&self.locks))
    }
}

pub fn set_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}
