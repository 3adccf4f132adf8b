//! Resumable scan sessions.
//!
//! A [`ScanSession`] records how far a batch index run got through its
//! ordered file universe. It is rewritten after every batch inside a
//! checksum envelope so a truncated or hand-edited file is rejected on load.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Current session file format.
pub const SESSION_VERSION: u32 = 1;

/// Errors reading or writing a session file.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Reading or writing the file failed.
    #[error("Session file {path}: {source}")]
    Io {
        /// Session file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The file is not a session envelope.
    #[error("Failed to parse session file {path}: {source}")]
    Parse {
        /// Session file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Serializing the session failed.
    #[error("Failed to serialize session: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The stored checksum does not match the contents.
    #[error("Session integrity check failed for {0}: checksum mismatch")]
    ChecksumMismatch(PathBuf),

    /// Written by an incompatible version.
    #[error("Unsupported session version: {found}. Current version is {expected}.")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Version this build writes
        expected: u32,
    },
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Batches remain.
    Running,
    /// Stopped by the keep-going signal; resumable.
    Cancelled,
    /// Every file in the universe was processed.
    Completed,
}

/// Running totals for a session, accumulated across resumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    /// Files visited, whatever the outcome.
    pub processed: u64,
    /// Files with a fingerprint (cached or computed).
    pub found: u64,
    /// Fingerprints served from the store.
    pub cached: u64,
    /// Files that matched an already known file.
    pub duplicates: u64,
    /// Files that could not be read.
    pub unreadable: u64,
    /// Zero-length or vanished files.
    pub skipped: u64,
}

/// Persistent state of one batch index run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    /// Format version.
    pub version: u32,
    /// Stable identifier, derived from scope and start time.
    pub id: String,
    /// Roots being indexed.
    pub scope: Vec<PathBuf>,
    /// Position in the ordered universe of the next file to process.
    pub resume_offset: usize,
    /// Size of the universe at the last run.
    pub total: usize,
    /// Totals so far.
    pub counters: SessionCounters,
    /// Current status.
    pub status: SessionStatus,
    /// When the session started.
    pub created_at: DateTime<Utc>,
    /// Last time a batch was committed.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionEnvelope {
    checksum: String,
    session: ScanSession,
}

impl ScanSession {
    /// Fresh session over `scope`, starting at `resume_offset`.
    #[must_use]
    pub fn new(scope: Vec<PathBuf>, resume_offset: usize, now: DateTime<Utc>) -> Self {
        let mut hasher = Sha256::new();
        for root in &scope {
            hasher.update(root.to_string_lossy().as_bytes());
            hasher.update([0u8]);
        }
        let digest = format!("{:x}", hasher.finalize());
        Self {
            version: SESSION_VERSION,
            id: format!("{}-{}", now.format("%Y%m%dT%H%M%S"), &digest[..8]),
            scope,
            resume_offset,
            total: 0,
            counters: SessionCounters::default(),
            status: SessionStatus::Running,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether there is nothing left to do.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    fn checksum(&self) -> Result<String, SessionError> {
        let compact = serde_json::to_string(self).map_err(SessionError::Serialize)?;
        let mut hasher = Sha256::new();
        hasher.update(compact.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Serialize inside a checksum envelope.
    ///
    /// # Errors
    ///
    /// [`SessionError::Serialize`] if serialization fails.
    pub fn to_json(&self) -> Result<String, SessionError> {
        let envelope = SessionEnvelope {
            checksum: self.checksum()?,
            session: self.clone(),
        };
        serde_json::to_string_pretty(&envelope).map_err(SessionError::Serialize)
    }

    /// Write the session to `path`, replacing it atomically.
    ///
    /// # Errors
    ///
    /// [`SessionError::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let json = self.to_json()?;
        let io_err = |source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        };

        let tmp = path.with_extension("tmp");
        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        std::fs::rename(&tmp, path).map_err(io_err)?;
        log::trace!("Saved session {} at offset {}", self.id, self.resume_offset);
        Ok(())
    }

    /// Read and verify a session file.
    ///
    /// # Errors
    ///
    /// Fails on unreadable or malformed files, checksum mismatches and
    /// unsupported versions.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let content = std::fs::read_to_string(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let envelope: SessionEnvelope =
            serde_json::from_str(&content).map_err(|source| SessionError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if envelope.session.checksum()? != envelope.checksum {
            return Err(SessionError::ChecksumMismatch(path.to_path_buf()));
        }
        let session = envelope.session;
        if session.version != SESSION_VERSION {
            return Err(SessionError::UnsupportedVersion {
                found: session.version,
                expected: SESSION_VERSION,
            });
        }
        Ok(session)
    }
}
