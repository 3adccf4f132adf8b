//! Safety scoring.
//!
//! # Overview
//!
//! A group's score is the **minimum** of five independent factors, so the
//! weakest signal always dominates:
//!
//! | Factor | Value |
//! |---|---|
//! | age | `min(mean_age_days / 30, 1)` |
//! | location diversity | `min(distinct_parent_dirs / 3, 1)` |
//! | protection | `0.3` if any member is protected, else `1.0` |
//! | size | `max(1 - mean_size_mb / 100, 0.2)` |
//! | type | weakest [`TrustLevel`](crate::policy::TrustLevel) factor among member extensions |
//!
//! Policy boosters then add to that base, capped at `1.0`. Manual review is
//! forced when the boosted score is below the review threshold, when the
//! group is larger than the byte ceiling, or when any member is protected.
//! Boosters can only clear the first of those three.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::clock::{system_clock, SharedClock};
use crate::duplicates::DuplicateGroup;
use crate::policy::{compile, Policy, PolicyError, ScoreBooster};
use crate::scanner::path_utils::{extension_lower, is_under_any, path_key};
use crate::store::record::age_days;

const AGE_SATURATION_DAYS: f64 = 30.0;
const DIVERSITY_SATURATION: f64 = 3.0;
const PROTECTED_FACTOR: f64 = 0.3;
const SIZE_SATURATION_MB: f64 = 100.0;
const SIZE_FLOOR: f64 = 0.2;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// The five base factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SafetyFactors {
    /// Older groups are safer to thin out.
    pub age: f64,
    /// Copies spread over several directories are likely accidental.
    pub diversity: f64,
    /// Protected locations drag the score down.
    pub protection: f64,
    /// Large files are riskier to remove.
    pub size: f64,
    /// File type trust.
    pub file_type: f64,
}

impl SafetyFactors {
    /// The weakest factor.
    #[must_use]
    pub fn min(&self) -> f64 {
        [self.age, self.diversity, self.protection, self.size, self.file_type]
            .into_iter()
            .fold(1.0, f64::min)
    }
}

/// Why a group needs a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    /// Score below the review threshold.
    LowScore,
    /// Group byte size over the ceiling.
    Oversized,
    /// A member lives under a protected prefix.
    Protected,
}

/// Full scoring result for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyAssessment {
    /// Base factors.
    pub factors: SafetyFactors,
    /// Total boost applied (before capping).
    pub boost: f64,
    /// Final score in [0, 1].
    pub score: f64,
    /// Reasons manual review is required; empty if automatic deletion is allowed.
    pub reasons: Vec<ReviewReason>,
}

impl SafetyAssessment {
    /// Check if any review condition holds.
    #[must_use]
    pub fn requires_manual_review(&self) -> bool {
        !self.reasons.is_empty()
    }
}

enum CompiledBooster {
    NamePattern { regex: Regex, boost: f64 },
    Staleness { min_age_days: f64, boost: f64 },
}

/// Scores duplicate groups against a [`Policy`].
pub struct SafetyScorer {
    policy: Policy,
    boosters: Vec<CompiledBooster>,
    clock: SharedClock,
}

impl std::fmt::Debug for SafetyScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyScorer")
            .field("review_threshold", &self.policy.review_threshold)
            .field("boosters", &self.boosters.len())
            .finish_non_exhaustive()
    }
}

impl SafetyScorer {
    /// Build a scorer, compiling booster patterns.
    ///
    /// # Errors
    ///
    /// [`PolicyError::BadPattern`] if a booster regex is invalid.
    pub fn new(policy: &Policy) -> Result<Self, PolicyError> {
        let boosters = policy
            .boosters
            .iter()
            .map(|b| match b {
                ScoreBooster::NamePattern { pattern, boost } => Ok(CompiledBooster::NamePattern {
                    regex: compile(pattern)?,
                    boost: *boost,
                }),
                ScoreBooster::Staleness {
                    min_age_days,
                    boost,
                } => Ok(CompiledBooster::Staleness {
                    min_age_days: *min_age_days,
                    boost: *boost,
                }),
            })
            .collect::<Result<Vec<_>, PolicyError>>()?;
        Ok(Self {
            policy: policy.clone(),
            boosters,
            clock: system_clock(),
        })
    }

    /// Use `clock` for age computations.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Score `group` without modifying it.
    #[must_use]
    pub fn calculate_safety(&self, group: &DuplicateGroup) -> SafetyAssessment {
        let now = self.clock.now();
        let factors = self.factors(group, now);
        let base = factors.min();
        let boost = self.boost(group, now);
        let score = (base + boost).clamp(0.0, 1.0);

        let mut reasons = Vec::new();
        if score < self.policy.review_threshold {
            reasons.push(ReviewReason::LowScore);
        }
        if group.total_size() > self.policy.max_group_bytes {
            reasons.push(ReviewReason::Oversized);
        }
        if self.any_protected(group) {
            reasons.push(ReviewReason::Protected);
        }

        log::trace!(
            "Group {}: factors {:?}, boost {:.2}, score {:.2}, review {:?}",
            group.group_id,
            factors,
            boost,
            score,
            reasons
        );
        SafetyAssessment {
            factors,
            boost,
            score,
            reasons,
        }
    }

    /// Score `group` and store the result on it.
    pub fn apply(&self, group: &mut DuplicateGroup) -> SafetyAssessment {
        let assessment = self.calculate_safety(group);
        group.safety_score = assessment.score;
        group.requires_manual_review = assessment.requires_manual_review();
        assessment
    }

    fn factors(&self, group: &DuplicateGroup, now: DateTime<Utc>) -> SafetyFactors {
        if group.is_empty() {
            return SafetyFactors {
                age: 0.0,
                diversity: 0.0,
                protection: 1.0,
                size: 1.0,
                file_type: 1.0,
            };
        }
        let n = group.len() as f64;

        let mean_age = group
            .members
            .iter()
            .map(|m| age_days(m.modified, now))
            .sum::<f64>()
            / n;
        let age = (mean_age / AGE_SATURATION_DAYS).min(1.0);

        let parents: HashSet<Vec<u8>> = group
            .members
            .iter()
            .map(|m| m.path.parent().map(path_key).unwrap_or_default())
            .collect();
        let diversity = (parents.len() as f64 / DIVERSITY_SATURATION).min(1.0);

        let protection = if self.any_protected(group) {
            PROTECTED_FACTOR
        } else {
            1.0
        };

        let mean_mb = group.total_size() as f64 / n / BYTES_PER_MB;
        let size = (1.0 - mean_mb / SIZE_SATURATION_MB).max(SIZE_FLOOR);

        let file_type = group
            .members
            .iter()
            .map(|m| self.policy.trust_for(&extension_lower(&m.path)).factor())
            .fold(1.0, f64::min);

        SafetyFactors {
            age,
            diversity,
            protection,
            size,
            file_type,
        }
    }

    fn boost(&self, group: &DuplicateGroup, now: DateTime<Utc>) -> f64 {
        let candidates = group.candidates();
        self.boosters
            .iter()
            .filter(|b| match b {
                CompiledBooster::NamePattern { regex, .. } => {
                    !candidates.is_empty()
                        && candidates.iter().all(|m| {
                            m.path
                                .file_name()
                                .is_some_and(|name| regex.is_match(&name.to_string_lossy()))
                        })
                }
                CompiledBooster::Staleness { min_age_days, .. } => {
                    let youngest = group
                        .members
                        .iter()
                        .map(|m| age_days(m.modified, now))
                        .fold(f64::INFINITY, f64::min);
                    !group.is_empty() && youngest > *min_age_days
                }
            })
            .map(|b| match b {
                CompiledBooster::NamePattern { boost, .. }
                | CompiledBooster::Staleness { boost, .. } => *boost,
            })
            .sum()
    }

    fn any_protected(&self, group: &DuplicateGroup) -> bool {
        group
            .members
            .iter()
            .any(|m| is_under_any(&m.path, &self.policy.protected_paths))
    }
}
