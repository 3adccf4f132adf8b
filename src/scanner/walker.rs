//! Directory walker using jwalk for parallel traversal.
//!
//! # Overview
//!
//! [`Walker`] enumerates the regular files under one root for the batch
//! indexer. Symlinks are never followed and never reported, so a file is
//! only fingerprinted at its real location. Empty files are dropped here
//! since they can never form a meaningful group.
//!
//! # Example
//!
//! ```no_run
//! use safedupe::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig {
//!     ignore_patterns: vec!["node_modules/".to_string()],
//!     ..Default::default()
//! };
//! let walker = Walker::new(Path::new("/home/user"), config);
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;

use super::{FileEntry, ScanError, WalkerConfig};
use crate::signal::KeepGoing;

/// Directory walker for parallel file discovery.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    signal: Option<KeepGoing>,
}

impl Walker {
    /// Create a walker for `path`.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            signal: None,
        }
    }

    /// Stop iteration once `signal` is cancelled.
    #[must_use]
    pub fn with_signal(mut self, signal: KeepGoing) -> Self {
        self.signal = Some(signal);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.signal.as_ref().is_some_and(KeepGoing::is_cancelled)
    }

    /// Build the matcher from config patterns and the root's .gitignore.
    fn build_gitignore(&self) -> Option<Gitignore> {
        let mut builder = GitignoreBuilder::new(&self.root);

        let gitignore_path = self.root.join(".gitignore");
        if gitignore_path.exists() {
            if let Some(e) = builder.add(&gitignore_path) {
                log::warn!(
                    "Failed to load .gitignore from {}: {}",
                    gitignore_path.display(),
                    e
                );
            } else {
                log::debug!("Loaded .gitignore from {}", gitignore_path.display());
            }
        }

        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        match builder.build() {
            Ok(gitignore) if gitignore.is_empty() => None,
            Ok(gitignore) => Some(gitignore),
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    /// Check `path` and its parents against the ignore patterns.
    fn should_ignore(&self, path: &Path, gitignore: Option<&Gitignore>) -> bool {
        let Some(gi) = gitignore else {
            return false;
        };
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        gi.matched_path_or_any_parents(relative, false).is_ignore()
    }

    /// Walk the tree, yielding files in a deterministic order.
    ///
    /// Errors are yielded as [`ScanError`] values rather than stopping the walk.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, ScanError>> + '_ {
        let gitignore = self.build_gitignore();

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(false)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(|_depth, _path, _state, children| {
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_cancelled() {
                log::debug!("Walker: cancellation requested, stopping");
                return None;
            }

            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), Path::to_path_buf);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    return Some(Err(ScanError::Io {
                        path,
                        source: std::io::Error::other(e.to_string()),
                    }));
                }
            };

            let file_type = entry.file_type();
            if !file_type.is_file() {
                return None;
            }
            let path = entry.path();
            if self.should_ignore(&path, gitignore.as_ref()) {
                log::trace!("Ignoring file: {}", path.display());
                return None;
            }

            let metadata = match std::fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(e) => return Some(Err(ScanError::from_io(&path, e))),
            };
            let size = metadata.len();
            if size == 0 {
                log::trace!("Skipping empty file: {}", path.display());
                return None;
            }
            if self.config.min_size.is_some_and(|min| size < min) {
                return None;
            }

            Some(Ok(FileEntry::new(
                path,
                size,
                metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            )))
        })
    }
}
