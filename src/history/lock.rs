//! Advisory cross-process lock for the history file.
//!
//! The lock file is an empty marker next to `history.json`. Holding an
//! exclusive `flock`-style lock on it signals that a run is in progress.
//! Nothing stops a process that ignores the lock, so losing the race is
//! reported, never enforced.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

/// A held advisory lock. Released on drop.
#[derive(Debug)]
pub struct HistoryLock {
    file: File,
    path: PathBuf,
}

impl HistoryLock {
    /// Try to take the lock without blocking.
    ///
    /// Returns `Ok(None)` when another holder already has it.
    pub fn try_acquire(path: &Path) -> io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        // UFCS: std grew inherent `File::try_lock_exclusive` with a different signature.
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!(path = %path.display(), "acquired history lock");
                Ok(Some(Self {
                    file,
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for HistoryLock {
    fn drop(&mut self) {
        match FileExt::unlock(&self.file) {
            Ok(()) => debug!(path = %self.path.display(), "released history lock"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to release history lock"),
        }
    }
}
