//! Destructive actions and their safeguards.
//!
//! - [`backup`]: verified copies made before anything is removed
//! - `copy`: streaming copy and cleanup shared with restore
//! - [`lock`]: path-scoped mutual exclusion for backup+delete and restore
//! - [`executor`]: the preview/execute state machine
//!
//! ```no_run
//! use safedupe::actions::{DeletionExecutor, DirectoryBackup};
//! use safedupe::policy::Policy;
//! use safedupe::store::FingerprintStore;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let store = Arc::new(FingerprintStore::open(Path::new("store.db")).unwrap());
//! let backup = DirectoryBackup::new("/var/backups/safedupe");
//! let executor = DeletionExecutor::new(store, &Policy::default(), Box::new(backup)).unwrap();
//!
//! let preview = executor.preview(&[]).unwrap();
//! println!("{} bytes reclaimable", preview.freed_bytes_estimate);
//! let report = executor.execute(&[], true).unwrap();
//! println!("{}", report.summary());
//! ```

pub mod backup;
pub(crate) mod copy;
pub mod executor;
pub mod lock;

pub use backup::{backup_file_name, BackupError, BackupSink, DirectoryBackup};
pub use executor::{
    CandidateOutcome, CandidateResult, DeleteError, DeletionExecutor, ExecutionObserver,
    ExecutionReport, FileSnapshot, GroupExecution, GroupState, NoopObserver, Preview, SkipReason,
};
pub use lock::{PathGuard, PathLocks};
