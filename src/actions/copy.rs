//! File copy helpers shared by backup and restore.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

/// Stream `source` into the already created `dest` and sync it to disk.
pub(crate) fn copy_into(source: &Path, dest: File) -> io::Result<()> {
    let mut reader = BufReader::new(File::open(source)?);
    let mut writer = BufWriter::new(dest);
    io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

/// Remove a partial or superseded copy, logging instead of failing.
pub(crate) fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        log::warn!("Could not remove {}: {}", path.display(), e);
    }
}
