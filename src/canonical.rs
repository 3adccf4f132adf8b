//! Canonical member selection.
//!
//! Each member gets an additive score; the highest wins and ties go to the
//! earliest modification time (then path, so the choice is deterministic).
//!
//! | Signal | Points |
//! |---|---|
//! | under a preferred prefix | +100 |
//! | age | up to +30 |
//! | disposable parent (downloads, tmp, ...) | -20 |
//! | "copy" / "(n)" file name | -15 |
//! | descriptive file name | +5 |
//! | organizing parent (documents, photos, ...) | +10 |

use std::cmp::Ordering;
use std::path::Path;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::clock::{system_clock, SharedClock};
use crate::duplicates::{DuplicateGroup, GroupMember};
use crate::policy::{compile, CanonicalHints, Policy, PolicyError};
use crate::scanner::path_utils::{is_under_any, parent_dir_name};
use crate::store::record::age_days;

const PREFERRED_BONUS: f64 = 100.0;
const AGE_BONUS_MAX: f64 = 30.0;
const DISPOSABLE_PENALTY: f64 = 20.0;
const COPY_PENALTY: f64 = 15.0;
const DESCRIPTIVE_BONUS: f64 = 5.0;
const ORGANIZING_BONUS: f64 = 10.0;

/// Chooses the member of a group to keep.
pub struct CanonicalSelector {
    preferred: Vec<std::path::PathBuf>,
    hints: CanonicalHints,
    copy_pattern: Regex,
    clock: SharedClock,
}

impl std::fmt::Debug for CanonicalSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanonicalSelector")
            .field("preferred", &self.preferred)
            .finish_non_exhaustive()
    }
}

impl CanonicalSelector {
    /// Build a selector from the policy's preferred prefixes and hints.
    ///
    /// # Errors
    ///
    /// [`PolicyError::BadPattern`] if the copy pattern is invalid.
    pub fn new(policy: &Policy) -> Result<Self, PolicyError> {
        Ok(Self {
            preferred: policy.preferred_paths.clone(),
            copy_pattern: compile(&policy.canonical.copy_pattern)?,
            hints: policy.canonical.clone(),
            clock: system_clock(),
        })
    }

    /// Use `clock` for the age bonus.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Score of a single member.
    #[must_use]
    pub fn score(&self, member: &GroupMember) -> f64 {
        self.score_at(member, self.clock.now())
    }

    fn score_at(&self, member: &GroupMember, now: DateTime<Utc>) -> f64 {
        let path = &member.path;
        let mut score = 0.0;

        if is_under_any(path, &self.preferred) {
            score += PREFERRED_BONUS;
        }

        if self.hints.age_cap_days > 0.0 {
            let age = age_days(member.modified, now);
            score += (age / self.hints.age_cap_days).min(1.0) * AGE_BONUS_MAX;
        }

        if let Some(parent) = parent_dir_name(path) {
            if self.hints.disposable_dirs.iter().any(|d| *d == parent) {
                score -= DISPOSABLE_PENALTY;
            }
            if self.hints.organizing_dirs.iter().any(|d| *d == parent) {
                score += ORGANIZING_BONUS;
            }
        }

        let stem = stem(path);
        if self.copy_pattern.is_match(&stem) {
            score -= COPY_PENALTY;
        }
        if stem.chars().filter(|c| c.is_alphanumeric()).count() >= self.hints.descriptive_min_chars {
            score += DESCRIPTIVE_BONUS;
        }

        score
    }

    /// Pick the member to keep. `None` only for an empty slice.
    #[must_use]
    pub fn choose_canonical<'a>(&self, members: &'a [GroupMember]) -> Option<&'a GroupMember> {
        let now = self.clock.now();
        members
            .iter()
            .map(|m| (m, self.score_at(m, now)))
            .min_by(|(a, sa), (b, sb)| {
                sb.partial_cmp(sa)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.modified.cmp(&b.modified))
                    .then_with(|| a.path.cmp(&b.path))
            })
            .map(|(m, score)| {
                log::trace!("Canonical {} (score {:.1})", m.path.display(), score);
                m
            })
    }

    /// Choose and record the canonical member of `group`.
    pub fn apply(&self, group: &mut DuplicateGroup) {
        if let Some(path) = self.choose_canonical(&group.members).map(|m| m.path.clone()) {
            group.set_canonical(path);
        }
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
