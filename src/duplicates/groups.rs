//! Duplicate group data type.
//!
//! A [`DuplicateGroup`] is derived on demand from the fingerprint store and
//! never persisted. Its id is the hex secure hash shared by every member.
//!
//! The canonical member is chosen after grouping. Until then the group has
//! no deletion candidates at all, and once chosen the canonical is excluded
//! from [`DuplicateGroup::candidates`] by construction.
//!
//! # Example
//!
//! ```
//! use safedupe::duplicates::{DuplicateGroup, GroupMember};
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let now = SystemTime::now();
//! let mut group = DuplicateGroup::new(
//!     [7u8; 32],
//!     vec![
//!         GroupMember::new(PathBuf::from("/a/report.pdf"), 100, now),
//!         GroupMember::new(PathBuf::from("/b/report.pdf"), 100, now),
//!     ],
//! );
//! assert!(group.candidates().is_empty());
//!
//! group.set_canonical(PathBuf::from("/a/report.pdf"));
//! assert_eq!(group.candidates().len(), 1);
//! assert_eq!(group.reclaimable_bytes(), 100);
//! ```

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::fingerprint::{hash_to_hex, Hash};
use crate::scanner::path_utils::path_key;
use crate::store::FileFingerprint;

/// One existing file in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    /// Path on disk
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Modification time recorded with the fingerprint
    pub modified: SystemTime,
}

impl GroupMember {
    /// Create a member.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }
}

impl From<&FileFingerprint> for GroupMember {
    fn from(fp: &FileFingerprint) -> Self {
        Self::new(fp.path.clone(), fp.size, fp.modified)
    }
}

/// Files sharing one secure hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Hex secure hash.
    pub group_id: String,
    /// Secure hash bytes.
    pub secure_hash: Hash,
    /// Members that existed when the group was built, sorted by path.
    pub members: Vec<GroupMember>,
    /// The member to keep, once chosen.
    pub canonical: Option<PathBuf>,
    /// Conservative safety estimate in [0, 1].
    pub safety_score: f64,
    /// Automatic deletion is forbidden while set.
    pub requires_manual_review: bool,
}

impl DuplicateGroup {
    /// Create an unassessed group. Unassessed groups always require review.
    #[must_use]
    pub fn new(secure_hash: Hash, mut members: Vec<GroupMember>) -> Self {
        members.sort_by(|a, b| a.path.cmp(&b.path));
        members.dedup_by(|a, b| path_key(&a.path) == path_key(&b.path));
        Self {
            group_id: hash_to_hex(&secure_hash),
            secure_hash,
            members,
            canonical: None,
            safety_score: 0.0,
            requires_manual_review: true,
        }
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Size of one copy.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.members.first().map_or(0, |m| m.size)
    }

    /// Bytes occupied by every member.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.members.iter().map(|m| m.size).sum()
    }

    /// Record the member to keep.
    ///
    /// Ignored if `path` is not a member.
    pub fn set_canonical(&mut self, path: PathBuf) {
        if self.member(&path).is_some() {
            self.canonical = Some(path);
        } else {
            log::warn!(
                "Refusing canonical {} not in group {}",
                path.display(),
                self.group_id
            );
        }
    }

    /// The canonical member, if chosen.
    #[must_use]
    pub fn canonical_member(&self) -> Option<&GroupMember> {
        self.canonical.as_deref().and_then(|p| self.member(p))
    }

    /// Members other than the canonical. Empty until a canonical is chosen.
    #[must_use]
    pub fn candidates(&self) -> Vec<&GroupMember> {
        let Some(canonical) = self.canonical.as_deref() else {
            return Vec::new();
        };
        let canonical = path_key(canonical);
        self.members
            .iter()
            .filter(|m| path_key(&m.path) != canonical)
            .collect()
    }

    /// Bytes freed if every candidate were removed.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.candidates().iter().map(|m| m.size).sum()
    }

    /// Look up a member by path.
    #[must_use]
    pub fn member(&self, path: &Path) -> Option<&GroupMember> {
        let key = path_key(path);
        self.members.iter().find(|m| path_key(&m.path) == key)
    }

    /// Member paths.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.members.iter().map(|m| m.path.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn member(path: &str, size: u64) -> GroupMember {
        GroupMember::new(PathBuf::from(path), size, SystemTime::UNIX_EPOCH + Duration::from_secs(1))
    }

    fn group() -> DuplicateGroup {
        DuplicateGroup::new(
            [1u8; 32],
            vec![member("/z/c.txt", 10), member("/a/a.txt", 10), member("/m/b.txt", 10)],
        )
    }

    #[test]
    fn test_new_group_sorted_and_unassessed() {
        let g = group();
        assert_eq!(g.len(), 3);
        assert_eq!(g.members[0].path, PathBuf::from("/a/a.txt"));
        assert_eq!(g.group_id, "01".repeat(32));
        assert!(g.requires_manual_review);
        assert!(g.canonical.is_none());
    }

    #[test]
    fn test_no_candidates_without_canonical() {
        assert!(group().candidates().is_empty());
        assert_eq!(group().reclaimable_bytes(), 0);
    }

    #[test]
    fn test_canonical_excluded_from_candidates() {
        let mut g = group();
        g.set_canonical(PathBuf::from("/m/b.txt"));
        let candidates: Vec<_> = g.candidates().iter().map(|m| m.path.clone()).collect();
        assert_eq!(candidates, vec![PathBuf::from("/a/a.txt"), PathBuf::from("/z/c.txt")]);
        assert_eq!(g.reclaimable_bytes(), 20);
        assert_eq!(g.total_size(), 30);
    }

    #[test]
    fn test_non_member_canonical_ignored() {
        let mut g = group();
        g.set_canonical(PathBuf::from("/elsewhere.txt"));
        assert!(g.canonical.is_none());
    }

    #[test]
    fn test_duplicate_paths_collapsed() {
        let g = DuplicateGroup::new([2u8; 32], vec![member("/a.txt", 1), member("/a.txt", 1)]);
        assert_eq!(g.len(), 1);
    }
}
