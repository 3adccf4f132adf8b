//! Path identity and prefix matching.
//!
//! Files are always opened by the exact bytes the OS handed us. For
//! comparison and as the store key, a path is reduced to a [`path_key`]:
//! NFC for UTF-8 names, so macOS (NFD) and other sources (NFC) agree, and
//! the raw bytes for names that are not UTF-8, so distinct names never
//! collapse onto one key.
//!
//! ```
//! use safedupe::scanner::path_utils::path_key;
//! use std::path::Path;
//!
//! let nfc = Path::new("/photos/café.jpg");
//! let nfd = Path::new("/photos/cafe\u{0301}.jpg");
//! assert_eq!(path_key(nfc), path_key(nfd));
//! ```

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Normalize a path to NFC for comparison, preserving non-UTF-8 paths unchanged.
///
/// Never use the result for I/O: on most Unix filesystems the NFC spelling
/// of an NFD name is a different (usually missing) file.
#[must_use]
pub fn normalize_pathbuf(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) if !is_nfc(s) => PathBuf::from(s.nfc().collect::<String>()),
        _ => path.to_path_buf(),
    }
}

/// Comparison and store key: NFC bytes for UTF-8 names, raw bytes otherwise.
#[must_use]
pub fn path_key(path: &Path) -> Vec<u8> {
    match path.to_str() {
        Some(s) if is_nfc(s) => s.as_bytes().to_vec(),
        Some(s) => s.nfc().collect::<String>().into_bytes(),
        None => path_bytes(path).into_owned(),
    }
}

/// The path exactly as the OS reported it.
#[cfg(unix)]
#[must_use]
pub fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

/// The path as UTF-8; unpaired surrogates are replaced.
#[cfg(not(unix))]
#[must_use]
pub fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    match path.to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

/// Inverse of [`path_bytes`].
#[cfg(unix)]
#[must_use]
pub fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(std::ffi::OsString::from_vec(bytes))
}

/// Inverse of [`path_bytes`].
#[cfg(not(unix))]
#[must_use]
pub fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}

/// Make `path` absolute against the current directory and fold `.` and
/// `..` lexically. No filesystem access; symlinks are left alone.
#[must_use]
pub fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        Cow::Borrowed(path)
    } else {
        match std::env::current_dir() {
            Ok(cwd) => Cow::Owned(cwd.join(path)),
            Err(_) => Cow::Borrowed(path),
        }
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Absolute form of a scope root: resolved through the filesystem when it
/// exists, lexically otherwise.
#[must_use]
pub fn resolve_root(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| absolutize(path))
}

/// [`resolve_root`] over a whole scope.
#[must_use]
pub fn resolve_scope(scope: &[PathBuf]) -> Vec<PathBuf> {
    scope.iter().map(|p| resolve_root(p)).collect()
}

/// Check whether `path` lies at or below `prefix`.
///
/// Component-wise, so `/data/photos2` is not under `/data/photos`.
/// Case-insensitive on Windows.
#[must_use]
pub fn is_under(path: &Path, prefix: &Path) -> bool {
    if cfg!(windows) {
        let p = PathBuf::from(normalize_pathbuf(path).to_string_lossy().to_lowercase());
        let r = PathBuf::from(normalize_pathbuf(prefix).to_string_lossy().to_lowercase());
        p.starts_with(r)
    } else {
        normalize_pathbuf(path).starts_with(normalize_pathbuf(prefix))
    }
}

/// Check whether `path` lies under any of `prefixes`.
#[must_use]
pub fn is_under_any(path: &Path, prefixes: &[PathBuf]) -> bool {
    prefixes.iter().any(|prefix| is_under(path, prefix))
}

/// Lowercased name of the immediate parent directory, if any.
#[must_use]
pub fn parent_dir_name(path: &Path) -> Option<String> {
    path.parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().to_lowercase())
}

/// Lowercased extension without the dot, or an empty string.
#[must_use]
pub fn extension_lower(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
