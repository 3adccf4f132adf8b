//! Deletion policy.
//!
//! A [`Policy`] is a plain value handed to the scorer, selector, executor
//! and indexer. Folder-specific behavior (for example a "downloads" profile)
//! is expressed by a different value, never by a different scorer type.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fingerprint::{HasherConfig, DEFAULT_QUICK_SAMPLE, DEFAULT_QUICK_THRESHOLD};

/// Errors found by [`Policy::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// A ratio field outside [0, 1].
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange {
        /// Offending field
        field: &'static str,
        /// Value supplied
        value: f64,
    },
    /// A field that must be positive is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    /// A booster or hint regex does not compile.
    #[error("invalid pattern '{pattern}': {message}")]
    BadPattern {
        /// Pattern as written
        pattern: String,
        /// Compiler message
        message: String,
    },
}

/// How safe it is to discard copies of a file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    /// Documents and media.
    Safe,
    /// Anything unlisted.
    Neutral,
    /// Executables and installers.
    Risky,
}

impl TrustLevel {
    /// Type factor contributed to the safety score.
    #[must_use]
    pub fn factor(self) -> f64 {
        match self {
            Self::Safe => 1.0,
            Self::Neutral => 0.6,
            Self::Risky => 0.2,
        }
    }
}

/// Additive score adjustment applied on top of the base safety score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreBooster {
    /// Every deletion candidate's file name matches `pattern`.
    NamePattern {
        /// Regex matched against the file name
        pattern: String,
        /// Amount added to the score
        boost: f64,
    },
    /// The youngest member is older than `min_age_days`.
    Staleness {
        /// Age threshold in days
        min_age_days: f64,
        /// Amount added to the score
        boost: f64,
    },
}

impl ScoreBooster {
    /// Amount this booster adds when it applies.
    #[must_use]
    pub fn boost(&self) -> f64 {
        match self {
            Self::NamePattern { boost, .. } | Self::Staleness { boost, .. } => *boost,
        }
    }
}

/// Hints used by the canonical selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalHints {
    /// Parent directory names that mark transient locations (lowercase).
    pub disposable_dirs: Vec<String>,
    /// Parent directory names that mark a curated location (lowercase).
    pub organizing_dirs: Vec<String>,
    /// Regex identifying "copy" style file names.
    pub copy_pattern: String,
    /// Minimum number of word characters in the stem for a descriptive name.
    pub descriptive_min_chars: usize,
    /// Age in days that earns the full age bonus.
    pub age_cap_days: f64,
}

impl Default for CanonicalHints {
    fn default() -> Self {
        Self {
            disposable_dirs: to_strings(&[
                "downloads", "download", "tmp", "temp", "inbox", "desktop", "cache", "trash",
            ]),
            organizing_dirs: to_strings(&[
                "documents", "pictures", "photos", "music", "videos", "archive", "projects",
                "library",
            ]),
            copy_pattern: r"(?i)(\bcopy\b|copy of |\(\d+\)| - \d+$|[-_]copy\d*$)".to_string(),
            descriptive_min_chars: 8,
            age_cap_days: 365.0,
        }
    }
}

/// Everything the engine needs to know about the user's intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Prefixes under which nothing is ever deleted automatically.
    pub protected_paths: Vec<PathBuf>,
    /// Prefixes whose members are preferred as the retained copy.
    pub preferred_paths: Vec<PathBuf>,
    /// Groups scoring below this require manual review.
    pub review_threshold: f64,
    /// Groups larger than this many bytes require manual review.
    pub max_group_bytes: u64,
    /// Successful deletions allowed per execute run.
    pub max_deletions_per_run: usize,
    /// Backups older than this may be purged once superseded.
    pub retention_days: u32,
    /// Lowercase extension → trust level.
    pub trust: BTreeMap<String, TrustLevel>,
    /// Canonical selection hints.
    pub canonical: CanonicalHints,
    /// Additive score boosters.
    pub boosters: Vec<ScoreBooster>,
    /// Window in which repeated real-time events for a path are ignored.
    #[serde(with = "duration_secs")]
    pub debounce_window: Duration,
    /// Maximum entries held by the debounce cache.
    pub debounce_capacity: usize,
    /// Quick hash sampling threshold in bytes.
    pub quick_threshold: u64,
    /// Bytes sampled from each end of large files.
    pub quick_sample: u64,
    /// Per-read stall guard.
    #[serde(with = "duration_secs")]
    pub stall_timeout: Duration,
    /// Files fingerprinted per indexer batch.
    pub batch_size: usize,
    /// Pause between indexer batches.
    #[serde(with = "duration_millis")]
    pub batch_pause: Duration,
    /// Directories indexed first.
    pub priority_dirs: Vec<PathBuf>,
    /// Extensions indexed first (lowercase, no dot).
    pub priority_extensions: Vec<String>,
    /// Gitignore-style patterns excluded from indexing.
    pub ignore_patterns: Vec<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            protected_paths: Vec::new(),
            preferred_paths: Vec::new(),
            review_threshold: 0.7,
            max_group_bytes: 1024 * 1024 * 1024,
            max_deletions_per_run: 100,
            retention_days: 30,
            trust: default_trust_table(),
            canonical: CanonicalHints::default(),
            boosters: Vec::new(),
            debounce_window: Duration::from_secs(5 * 60),
            debounce_capacity: 4096,
            quick_threshold: DEFAULT_QUICK_THRESHOLD,
            quick_sample: DEFAULT_QUICK_SAMPLE,
            stall_timeout: Duration::from_secs(30),
            batch_size: 256,
            batch_pause: Duration::from_millis(200),
            priority_dirs: Vec::new(),
            priority_extensions: to_strings(&["pdf", "jpg", "jpeg", "png", "mp4", "zip", "docx"]),
            ignore_patterns: to_strings(&[".git/", "node_modules/"]),
        }
    }
}

impl Policy {
    /// Preset for download folders: browser duplicate names and stale files
    /// earn a higher score.
    #[must_use]
    pub fn downloads_profile() -> Self {
        Self {
            boosters: vec![
                ScoreBooster::NamePattern {
                    pattern: r"^.+ \(\d+\)(\.[^.]+)?$".to_string(),
                    boost: 0.2,
                },
                ScoreBooster::NamePattern {
                    pattern: r"^.+-\d+(\.[^.]+)?$".to_string(),
                    boost: 0.1,
                },
                ScoreBooster::NamePattern {
                    pattern: r"(?i)^copy of .+".to_string(),
                    boost: 0.2,
                },
                ScoreBooster::Staleness {
                    min_age_days: 90.0,
                    boost: 0.1,
                },
            ],
            ..Self::default()
        }
    }

    /// Check ranges and compile every pattern.
    ///
    /// # Errors
    ///
    /// The first [`PolicyError`] found.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !(0.0..=1.0).contains(&self.review_threshold) {
            return Err(PolicyError::OutOfRange {
                field: "review_threshold",
                value: self.review_threshold,
            });
        }
        if self.batch_size == 0 {
            return Err(PolicyError::Zero("batch_size"));
        }
        if self.debounce_capacity == 0 {
            return Err(PolicyError::Zero("debounce_capacity"));
        }
        if self.quick_sample == 0 {
            return Err(PolicyError::Zero("quick_sample"));
        }
        for booster in &self.boosters {
            let boost = booster.boost();
            if !(0.0..=1.0).contains(&boost) {
                return Err(PolicyError::OutOfRange {
                    field: "boosters.boost",
                    value: boost,
                });
            }
            if let ScoreBooster::NamePattern { pattern, .. } = booster {
                compile(pattern)?;
            }
        }
        compile(&self.canonical.copy_pattern)?;
        Ok(())
    }

    /// Trust level for a lowercase extension.
    #[must_use]
    pub fn trust_for(&self, extension: &str) -> TrustLevel {
        self.trust
            .get(extension)
            .copied()
            .unwrap_or(TrustLevel::Neutral)
    }

    /// Hasher tuning derived from this policy.
    #[must_use]
    pub fn hasher_config(&self) -> HasherConfig {
        HasherConfig {
            quick_threshold: self.quick_threshold,
            quick_sample: self.quick_sample,
            stall_timeout: self.stall_timeout,
        }
    }
}

pub(crate) fn compile(pattern: &str) -> Result<Regex, PolicyError> {
    Regex::new(pattern).map_err(|e| PolicyError::BadPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn default_trust_table() -> BTreeMap<String, TrustLevel> {
    const SAFE: &[&str] = &[
        "txt", "md", "pdf", "doc", "docx", "odt", "rtf", "xls", "xlsx", "ods", "csv", "ppt",
        "pptx", "jpg", "jpeg", "png", "gif", "bmp", "webp", "heic", "tif", "tiff", "svg", "mp3",
        "flac", "wav", "ogg", "m4a", "mp4", "mov", "mkv", "avi", "webm",
    ];
    const RISKY: &[&str] = &[
        "exe", "msi", "dmg", "pkg", "app", "deb", "rpm", "bat", "cmd", "sh", "ps1", "dll", "so",
        "dylib", "jar", "apk",
    ];
    SAFE.iter()
        .map(|e| ((*e).to_string(), TrustLevel::Safe))
        .chain(RISKY.iter().map(|e| ((*e).to_string(), TrustLevel::Risky)))
        .collect()
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
