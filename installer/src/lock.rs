//! Exclusive per-prefix lock serialising concurrent runs.

use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use log::{debug, info};
use std::fs::{File, OpenOptions};

/// Errors acquiring the prefix lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock file could not be created or opened.
    #[error("failed to open lock file {path}: {source}")]
    Open {
        /// Lock file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Acquiring the exclusive lock failed.
    #[error("failed to lock {path}: {source}")]
    Acquire {
        /// Lock file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Held exclusive lock; released when dropped.
#[derive(Debug)]
pub struct PrefixLock {
    file: File,
    path: Utf8PathBuf,
}

impl PrefixLock {
    /// Acquire the lock at `path`, waiting if another run holds it.
    ///
    /// Creates the lock file and its parent directory when missing.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] if the file cannot be opened or locked.
    pub fn acquire(path: &Utf8Path) -> Result<Self, LockError> {
        let file = open_lock_file(path)?;
        if file.try_lock_exclusive().is_err() {
            info!("waiting for another keg run to release {path}");
            file.lock_exclusive().map_err(|source| LockError::Acquire {
                path: path.to_owned(),
                source,
            })?;
        }
        debug!("acquired {path}");
        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    /// Try to acquire the lock without waiting.
    ///
    /// Returns `Ok(None)` when another holder has it.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Open`] if the file cannot be opened.
    pub fn try_acquire(path: &Utf8Path) -> Result<Option<Self>, LockError> {
        let file = open_lock_file(path)?;
        if file.try_lock_exclusive().is_err() {
            return Ok(None);
        }
        Ok(Some(Self {
            file,
            path: path.to_owned(),
        }))
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for PrefixLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!("failed to unlock {}: {err}", self.path);
        }
    }
}

fn open_lock_file(path: &Utf8Path) -> Result<File, LockError> {
    let open_err = |source| LockError::Open {
        path: path.to_owned(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(open_err)?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(open_err)
}
