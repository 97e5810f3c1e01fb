//! Cache directory teardown
//!
//! Kill-before-delete: every writer must have released its file handle
//! before any delete is attempted. Safe to call at any time, including
//! mid-write.

use crate::error::{CacheError, Result};
use crate::store::CacheStore;
use crate::writer::WriterHandle;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Stop every writer, delete every tracked file, and remove the cache
/// directory itself.
///
/// `extra_files` carries paths tracked outside the store (the bulk-retrieved
/// set). Files already gone are fine; any other delete error means something
/// still held the file open and is surfaced as
/// [`CacheError::TeardownConflict`].
pub async fn teardown_directory(
    dir: &Path,
    store: &CacheStore,
    writers: &[Arc<WriterHandle>],
    extra_files: impl IntoIterator<Item = PathBuf>,
) -> Result<()> {
    // Writers first: kill() only returns once the task has exited and its
    // handle is closed, so the deletes below cannot race an open file.
    for writer in writers {
        writer.kill().await;
    }

    let entries = store.drain();
    debug!(
        dir = %dir.display(),
        entries = entries.len(),
        writers = writers.len(),
        "Tearing down cache directory"
    );

    for entry in entries {
        remove_file_checked(&entry.path).await?;
    }
    for path in extra_files {
        remove_file_checked(&path).await?;
    }

    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(CacheError::TeardownConflict(dir.to_path_buf(), Box::new(err))),
    }

    info!(dir = %dir.display(), "Cache directory removed");
    Ok(())
}

async fn remove_file_checked(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(CacheError::TeardownConflict(
            path.to_path_buf(),
            Box::new(err),
        )),
    }
}
