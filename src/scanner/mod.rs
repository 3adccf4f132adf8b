//! Scanner module for directory traversal.
//!
//! - [`walker`]: parallel enumeration of regular files under a root
//! - [`path_utils`]: path keys, scope resolution and prefix matching

pub mod path_utils;
pub mod walker;

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub use walker::Walker;

/// Metadata for a discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path as reported by the OS
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl FileEntry {
    /// Create a new FileEntry.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Files smaller than this are skipped.
    pub min_size: Option<u64>,

    /// Gitignore-style patterns, applied in addition to the root's .gitignore.
    pub ignore_patterns: Vec<String>,
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    pub(crate) fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => {
                log::warn!("Permission denied: {}", path.display());
                Self::PermissionDenied(path.to_path_buf())
            }
            io::ErrorKind::NotFound => {
                log::debug!("File not found (may have been deleted): {}", path.display());
                Self::NotFound(path.to_path_buf())
            }
            _ => {
                log::warn!("I/O error for {}: {}", path.display(), error);
                Self::Io {
                    path: path.to_path_buf(),
                    source: error,
                }
            }
        }
    }
}
