//! Duplicate grouping over the fingerprint store.
//!
//! Identity is decided by the secure hash alone. The quick hash only
//! nominates candidates in [`Grouper::detect_incremental`]; a quick match
//! whose secure hash differs is counted as a collision and discarded.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::groups::{DuplicateGroup, GroupMember};
use crate::scanner::path_utils::{is_under_any, path_key};
use crate::store::{FileFingerprint, FingerprintStore, StoreResult};

/// Counters from one [`Grouper::build_groups`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrouperStats {
    /// Secure-hash buckets with two or more records
    pub buckets_examined: usize,
    /// Records left out because their path no longer exists
    pub stale_skipped: usize,
    /// Groups with two or more live members
    pub groups_built: usize,
    /// Groups skipped because no member lies in scope
    pub out_of_scope: usize,
}

/// Result of an incremental duplicate check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncrementalMatch {
    /// Existing files with identical content
    pub duplicates: Vec<FileFingerprint>,
    /// Quick-hash matches rejected by the secure hash
    pub quick_collisions: usize,
}

impl IncrementalMatch {
    /// Check if no duplicate was confirmed.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.duplicates.is_empty()
    }

    /// Paths of the confirmed duplicates.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.duplicates.iter().map(|fp| fp.path.clone()).collect()
    }
}

/// Builds verified duplicate groups from stored fingerprints.
#[derive(Debug, Clone)]
pub struct Grouper {
    store: Arc<FingerprintStore>,
}

impl Grouper {
    /// Create a grouper over `store`.
    #[must_use]
    pub fn new(store: Arc<FingerprintStore>) -> Self {
        Self { store }
    }

    /// Build every duplicate group with at least one member under `scope`.
    ///
    /// An empty scope means everything. Members whose path no longer exists
    /// are left out of the group; the store is only read.
    ///
    /// # Errors
    ///
    /// [`StoreError`](crate::store::StoreError) if the store cannot be read.
    pub fn build_groups(&self, scope: &[PathBuf]) -> StoreResult<(Vec<DuplicateGroup>, GrouperStats)> {
        let mut stats = GrouperStats::default();
        let mut groups = Vec::new();

        for (hash, records) in self.store.multi_member_buckets()? {
            stats.buckets_examined += 1;

            let mut live = Vec::with_capacity(records.len());
            for fp in &records {
                if still_exists(&fp.path) {
                    live.push(GroupMember::from(fp));
                } else {
                    stats.stale_skipped += 1;
                    log::debug!("Skipping stale fingerprint: {}", fp.path.display());
                }
            }

            if live.len() < 2 {
                continue;
            }
            if !scope.is_empty() && !live.iter().any(|m| is_under_any(&m.path, scope)) {
                stats.out_of_scope += 1;
                continue;
            }
            groups.push(DuplicateGroup::new(hash, live));
        }

        groups.sort_by(|a, b| {
            b.total_size()
                .cmp(&a.total_size())
                .then_with(|| a.group_id.cmp(&b.group_id))
        });
        stats.groups_built = groups.len();

        log::debug!(
            "Grouping complete: {} buckets, {} groups, {} stale skipped",
            stats.buckets_examined,
            stats.groups_built,
            stats.stale_skipped
        );
        Ok((groups, stats))
    }

    /// Stored paths in multi-member buckets that no longer exist on disk.
    ///
    /// Only paths under `scope` are listed; an empty scope means everything.
    ///
    /// # Errors
    ///
    /// [`StoreError`](crate::store::StoreError) if the store cannot be read.
    pub fn stale_members(&self, scope: &[PathBuf]) -> StoreResult<Vec<PathBuf>> {
        let mut stale = Vec::new();
        for (_, records) in self.store.multi_member_buckets()? {
            stale.extend(
                records
                    .into_iter()
                    .map(|fp| fp.path)
                    .filter(|p| scope.is_empty() || is_under_any(p, scope))
                    .filter(|p| !still_exists(p)),
            );
        }
        Ok(stale)
    }

    /// Confirmed duplicates of a freshly fingerprinted file.
    ///
    /// Candidates come from the quick hash; each is accepted only if its
    /// secure hash and size match and it still exists.
    ///
    /// # Errors
    ///
    /// [`StoreError`](crate::store::StoreError) if the store cannot be read.
    pub fn detect_incremental(&self, fp: &FileFingerprint) -> StoreResult<IncrementalMatch> {
        let own_key = path_key(&fp.path);
        let mut result = IncrementalMatch::default();

        for candidate in self.store.find_by_quick_hash(&fp.quick_hash)? {
            if path_key(&candidate.path) == own_key {
                continue;
            }
            if candidate.secure_hash != fp.secure_hash || candidate.size != fp.size {
                result.quick_collisions += 1;
                log::debug!(
                    "Quick-hash collision: {} vs {}",
                    fp.path.display(),
                    candidate.path.display()
                );
                continue;
            }
            if still_exists(&candidate.path) {
                result.duplicates.push(candidate);
            }
        }

        log::trace!(
            "Incremental check for {}: {} duplicate(s)",
            fp.path.display(),
            result.duplicates.len()
        );
        Ok(result)
    }
}

fn still_exists(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file())
}
