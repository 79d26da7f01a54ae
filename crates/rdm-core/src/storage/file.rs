//! Destination file setup and per-chunk handles.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Create (or reuse) the destination for a chunked download.
///
/// With `fresh`, existing content is discarded. The file is then preallocated
/// to `total` bytes so chunks can be written at any offset.
pub fn prepare_destination(path: &Path, total: u64, fresh: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let file = File::options()
        .write(true)
        .create(true)
        .truncate(fresh)
        .open(path)
        .with_context(|| format!("open destination {}", path.display()))?;
    if file.metadata()?.len() < total {
        preallocate(&file, total)?;
    }
    Ok(())
}

/// Preallocate `size` bytes. On Unix tries `posix_fallocate` for real block
/// allocation; falls back to `set_len` on failure or non-Unix.
pub fn preallocate(file: &File, size: u64) -> Result<()> {
    #[cfg(unix)]
    {
        let fd = file.as_raw_fd();
        // SAFETY: fd is a valid open descriptor owned by `file` for the duration of the call.
        let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
        if r == 0 {
            return Ok(());
        }
        tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
    }
    file.set_len(size).context("failed to preallocate file")?;
    Ok(())
}

/// Open a worker's own handle on the destination: write access, no truncation.
pub fn open_chunk_writer(path: &Path) -> std::io::Result<File> {
    File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}
