//! Atomic snapshot writes shared by the dedup gate and the queue proxy.

use crate::error::CoreResult;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Writes `data` to `path` atomically: temp file, fsync, rename, directory
/// fsync. A crash mid-write leaves the previous snapshot intact.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> CoreResult<()> {
    let tmp_path = path.with_extension("tmp");

    let mut file = File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    sync_parent_dir(path)?;
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> CoreResult<()> {
    // NTFS journaling covers metadata durability for the rename.
    Ok(())
}
