//! The ordered set of files a batch index run visits.
//!
//! Files are enumerated under every root, deduplicated across overlapping
//! roots and sorted by (tier, size descending, path). The order only
//! depends on the tree, so an offset saved by one run names the same
//! position in the next.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::scanner::path_utils::{extension_lower, is_under_any};
use crate::scanner::{FileEntry, Walker, WalkerConfig};
use crate::signal::KeepGoing;

/// Which files are indexed first.
#[derive(Debug, Clone, Default)]
pub struct Priority {
    /// Directories whose contents come first.
    pub dirs: Vec<PathBuf>,
    /// Lowercase extensions without the dot.
    pub extensions: Vec<String>,
}

impl Priority {
    /// 0 when both the directory and the extension are prioritized, 1 when
    /// either is, 2 otherwise.
    #[must_use]
    pub fn tier(&self, path: &Path) -> u8 {
        let in_dir = is_under_any(path, &self.dirs);
        let ext = extension_lower(path);
        let by_ext = !ext.is_empty() && self.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext));
        match (in_dir, by_ext) {
            (true, true) => 0,
            (true, false) | (false, true) => 1,
            (false, false) => 2,
        }
    }
}

/// One file in the universe with its tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseEntry {
    /// The file.
    pub file: FileEntry,
    /// Scheduling tier, lower first.
    pub tier: u8,
}

/// Ordered file universe.
#[derive(Debug, Clone, Default)]
pub struct Universe {
    /// Files in processing order.
    pub entries: Vec<UniverseEntry>,
    /// Entries the walker could not read.
    pub scan_errors: usize,
}

impl Universe {
    /// Enumerate and order every file under `roots`.
    ///
    /// Stops early, returning what was found so far, once `signal` is
    /// cancelled.
    #[must_use]
    pub fn enumerate(
        roots: &[PathBuf],
        config: &WalkerConfig,
        priority: &Priority,
        signal: &KeepGoing,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut universe = Self::default();

        for root in roots {
            let walker = Walker::new(root, config.clone()).with_signal(signal.clone());
            for result in walker.walk() {
                match result {
                    Ok(file) => {
                        if seen.insert(file.path.clone()) {
                            let tier = priority.tier(&file.path);
                            universe.entries.push(UniverseEntry { file, tier });
                        }
                    }
                    Err(e) => {
                        log::debug!("Skipping during enumeration: {}", e);
                        universe.scan_errors += 1;
                    }
                }
            }
        }

        universe.entries.sort_by(|a, b| {
            a.tier
                .cmp(&b.tier)
                .then_with(|| b.file.size.cmp(&a.file.size))
                .then_with(|| a.file.path.cmp(&b.file.path))
        });
        log::debug!(
            "Universe: {} files under {} root(s), {} scan errors",
            universe.entries.len(),
            roots.len(),
            universe.scan_errors
        );
        universe
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there is nothing to index.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
