//! BLAKE3 quick and secure fingerprints.
//!
//! # Overview
//!
//! Two hashes are computed per file:
//!
//! * **Quick** - for files above [`HasherConfig::quick_threshold`], the first
//!   and last [`HasherConfig::quick_sample`] bytes plus the file size. Cost is
//!   bounded regardless of file size. Smaller files hash their full content.
//!   A quick match only nominates candidates, it never proves identity.
//! * **Secure** - full content, streamed through a fixed-size buffer.
//!
//! Reads are guarded: the file is opened and read on a worker thread that
//! hands chunks over a bounded channel, and every message must arrive within
//! [`HasherConfig::stall_timeout`]. A read or open that never returns (a
//! dead network mount, a FIFO) fails that one file instead of hanging the
//! batch; the stuck worker is abandoned and exits once it can notice the
//! channel is closed. The byte count must also match the size reported when
//! the file was opened.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

/// A 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Default size above which the quick hash samples instead of reading everything.
pub const DEFAULT_QUICK_THRESHOLD: u64 = 1024 * 1024;

/// Default number of bytes sampled from each end of a large file.
pub const DEFAULT_QUICK_SAMPLE: u64 = 64 * 1024;

/// Read buffer for streamed hashing.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between the reader thread and the hasher.
const CHANNEL_DEPTH: usize = 4;

/// Errors that make a file's identity unknown.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The file does not exist (any more).
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// The file cannot be opened for reading.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The path is a directory or special file.
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    /// An open or read took longer than the stall timeout.
    #[error("Read stalled for {path} after {waited:?}")]
    Stalled {
        /// File being read
        path: PathBuf,
        /// Time waited before giving up
        waited: Duration,
    },

    /// The bytes read do not match the size seen at open.
    #[error("Size changed while reading {path}: expected {expected} bytes, read {actual}")]
    SizeMismatch {
        /// File being read
        path: PathBuf,
        /// Size from metadata
        expected: u64,
        /// Bytes actually read
        actual: u64,
    },

    /// Any other I/O failure.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl HashError {
    pub(crate) fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Path of the file that failed.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) | Self::NotAFile(p) => p,
            Self::Stalled { path, .. }
            | Self::SizeMismatch { path, .. }
            | Self::Io { path, .. } => path,
        }
    }
}

/// Tuning for [`Hasher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HasherConfig {
    /// Files strictly larger than this are sampled for the quick hash.
    pub quick_threshold: u64,
    /// Bytes taken from each end of a sampled file.
    pub quick_sample: u64,
    /// Maximum wait for the open or for any single chunk.
    pub stall_timeout: Duration,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            quick_threshold: DEFAULT_QUICK_THRESHOLD,
            quick_sample: DEFAULT_QUICK_SAMPLE,
            stall_timeout: Duration::from_secs(30),
        }
    }
}

/// Stateless fingerprint calculator.
///
/// ```no_run
/// use safedupe::fingerprint::Hasher;
/// use std::path::Path;
///
/// let hasher = Hasher::new();
/// let quick = hasher.compute_quick(Path::new("photo.jpg")).unwrap();
/// let secure = hasher.compute_secure(Path::new("photo.jpg")).unwrap();
/// println!("{} {}", safedupe::fingerprint::hash_to_hex(&quick), safedupe::fingerprint::hash_to_hex(&secure));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Hasher {
    config: HasherConfig,
}

impl Hasher {
    /// Hasher with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hasher with explicit thresholds.
    #[must_use]
    pub fn with_config(config: HasherConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &HasherConfig {
        &self.config
    }

    /// Compute the quick (pre-filter) fingerprint.
    ///
    /// # Errors
    ///
    /// Any [`HashError`]; the caller treats the file as unknown identity.
    pub fn compute_quick(&self, path: &Path) -> Result<Hash, HashError> {
        let plan = Plan::Quick {
            threshold: self.config.quick_threshold,
            sample: self.config.quick_sample,
        };
        self.hash_file(path, plan)
    }

    /// Compute the secure (full-content) fingerprint.
    ///
    /// # Errors
    ///
    /// Any [`HashError`]; the caller treats the file as unknown identity.
    pub fn compute_secure(&self, path: &Path) -> Result<Hash, HashError> {
        self.hash_file(path, Plan::Whole)
    }

    /// Check whether a file's full content hashes to `expected`.
    ///
    /// # Errors
    ///
    /// Any [`HashError`] raised while reading.
    pub fn matches_secure(&self, path: &Path, expected: &Hash) -> Result<bool, HashError> {
        Ok(&self.compute_secure(path)? == expected)
    }

    fn hash_file(&self, path: &Path, plan: Plan) -> Result<Hash, HashError> {
        let owned = path.to_path_buf();
        self.hash_guarded(path, plan, move || open_regular(&owned))
    }

    /// Hash what `open` yields, with the open and every read on a worker
    /// thread bounded by the stall timeout.
    fn hash_guarded<R, F>(&self, path: &Path, plan: Plan, open: F) -> Result<Hash, HashError>
    where
        R: Read + Seek,
        F: FnOnce() -> Result<(R, u64), HashError> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        let worker_path = path.to_path_buf();
        thread::Builder::new()
            .name("safedupe-read".to_string())
            .spawn(move || feed(&worker_path, open, plan, &tx))
            .map_err(|e| HashError::from_io(path, e))?;

        let mut hasher = blake3::Hasher::new();
        let mut opened = None;
        let mut total: u64 = 0;
        loop {
            match self.receive(path, &rx)? {
                Message::Opened { size, sample } => opened = Some((size, sample)),
                Message::Chunk(bytes) => {
                    hasher.update(&bytes);
                    total += bytes.len() as u64;
                }
                Message::Done => break,
                Message::Failed(e) => return Err(e),
            }
        }

        let Some((size, sample)) = opened else {
            return Err(HashError::Io {
                path: path.to_path_buf(),
                source: io::Error::other("reader finished without opening the file"),
            });
        };
        let expected = sample.map_or(size, |n| 2 * n);
        if total != expected {
            return Err(HashError::SizeMismatch {
                path: path.to_path_buf(),
                expected,
                actual: total,
            });
        }
        if sample.is_some() {
            hasher.update(&size.to_le_bytes());
        }
        Ok(*hasher.finalize().as_bytes())
    }

    fn receive(&self, path: &Path, rx: &Receiver<Message>) -> Result<Message, HashError> {
        let waited = self.config.stall_timeout;
        match rx.recv_timeout(waited) {
            Ok(message) => Ok(message),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Read stalled for {} ({:?})", path.display(), waited);
                Err(HashError::Stalled {
                    path: path.to_path_buf(),
                    waited,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(HashError::Io {
                path: path.to_path_buf(),
                source: io::Error::other("reader thread exited unexpectedly"),
            }),
        }
    }
}

/// Which bytes a hash covers.
#[derive(Debug, Clone, Copy)]
enum Plan {
    /// Everything.
    Whole,
    /// Head and tail samples of files above `threshold`, else everything.
    Quick { threshold: u64, sample: u64 },
}

impl Plan {
    /// Bytes taken from each end, or `None` to read the whole file.
    fn sample_for(self, size: u64) -> Option<u64> {
        match self {
            Self::Whole => None,
            Self::Quick { threshold, sample } => (size > threshold).then(|| sample.min(size / 2)),
        }
    }
}

enum Message {
    Opened { size: u64, sample: Option<u64> },
    Chunk(Vec<u8>),
    Done,
    Failed(HashError),
}

enum Stop {
    /// The hasher stopped listening.
    Abandoned,
    Failed(HashError),
}

/// Worker side of [`Hasher::hash_guarded`].
fn feed<R, F>(path: &Path, open: F, plan: Plan, tx: &SyncSender<Message>)
where
    R: Read + Seek,
    F: FnOnce() -> Result<(R, u64), HashError>,
{
    let result = open().map_err(Stop::Failed).and_then(|(mut source, size)| {
        let sample = plan.sample_for(size);
        tx.send(Message::Opened { size, sample })
            .map_err(|_| Stop::Abandoned)?;
        match sample {
            None => send_range(path, &mut source, None, tx),
            Some(n) => {
                send_range(path, &mut source, Some(n), tx)?;
                let offset = i64::try_from(n).unwrap_or(i64::MAX);
                source
                    .seek(SeekFrom::End(-offset))
                    .map_err(|e| Stop::Failed(HashError::from_io(path, e)))?;
                send_range(path, &mut source, Some(n), tx)
            }
        }
    });
    let last = match result {
        Ok(()) => Message::Done,
        Err(Stop::Failed(e)) => Message::Failed(e),
        Err(Stop::Abandoned) => return,
    };
    // The receiver may already have given up.
    let _ = tx.send(last);
}

/// Send up to `limit` bytes (or everything) from `source`, stopping at EOF.
fn send_range<R: Read>(
    path: &Path,
    source: &mut R,
    limit: Option<u64>,
    tx: &SyncSender<Message>,
) -> Result<(), Stop> {
    let mut remaining = limit;
    loop {
        let want = remaining.map_or(CHUNK_SIZE, |r| r.min(CHUNK_SIZE as u64) as usize);
        if want == 0 {
            return Ok(());
        }
        let mut buffer = vec![0u8; want];
        let n = match source.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Stop::Failed(HashError::from_io(path, e))),
        };
        buffer.truncate(n);
        if let Some(r) = remaining.as_mut() {
            *r -= n as u64;
        }
        tx.send(Message::Chunk(buffer)).map_err(|_| Stop::Abandoned)?;
    }
}

fn open_regular(path: &Path) -> Result<(File, u64), HashError> {
    let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
    let metadata = file.metadata().map_err(|e| HashError::from_io(path, e))?;
    if !metadata.is_file() {
        return Err(HashError::NotAFile(path.to_path_buf()));
    }
    Ok((file, metadata.len()))
}

/// Lowercase hex rendering of a hash.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parse a 64-character hex string back into a hash.
#[must_use]
pub fn hex_to_hash(hex: &str) -> Option<Hash> {
    if hex.len() != 64 || !hex.is_ascii() {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}
