//! Journalled application of install steps.
//!
//! Steps run in declared order. Every filesystem effect is recorded in a
//! journal so a failed or cancelled run can be replayed backwards, leaving
//! the prefix exactly as it was. Replaced files are moved aside rather than
//! overwritten and only deleted when the transaction commits.

use crate::artefact::StagedArtifact;
use crate::cancel::CancelToken;
use crate::layout::InstallLayout;
use crate::manifest::{DestinationCategory, InstallStep};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

/// Permission bits for installed executables.
pub const EXECUTABLE_MODE: u32 = 0o755;
/// Permission bits for other installed files.
pub const DATA_MODE: u32 = 0o644;

const BACKUP_SUFFIX: &str = ".keg-backup";
const PARTIAL_SUFFIX: &str = ".keg-partial";

/// One file placed by an install step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledFile {
    /// Zero-based index of the step that placed the file.
    pub step: usize,
    /// Destination category of the step.
    pub category: DestinationCategory,
    /// Absolute destination path.
    pub path: Utf8PathBuf,
}

/// Errors applying install steps. Step indices are zero-based and reported
/// one-based.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// The step's source is not a file inside the staged artefact.
    #[error("install step {} failed: {path} not found in the artefact", .step + 1)]
    MissingSource {
        /// Failing step index.
        step: usize,
        /// Source path from the manifest.
        path: Utf8PathBuf,
    },

    /// A directory occupies the destination path.
    #[error("install step {} failed: {path} is a directory", .step + 1)]
    DestinationIsDirectory {
        /// Failing step index.
        step: usize,
        /// Destination path.
        path: Utf8PathBuf,
    },

    /// A filesystem operation failed.
    #[error("install step {} failed at {path}: {source}", .step + 1)]
    Io {
        /// Failing step index.
        step: usize,
        /// Path being written.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Cancellation was requested before the step ran.
    #[error("cancelled before install step {}", .step + 1)]
    Cancelled {
        /// Step that did not run.
        step: usize,
    },

    /// A file from the previous install could not be moved aside.
    #[error("failed to remove stale file {path}: {source}")]
    Retire {
        /// File recorded by the previous receipt.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl InstallError {
    /// Return the zero-based index of the failing step, if a step failed.
    #[must_use]
    pub const fn step(&self) -> Option<usize> {
        match self {
            Self::MissingSource { step, .. }
            | Self::DestinationIsDirectory { step, .. }
            | Self::Io { step, .. }
            | Self::Cancelled { step } => Some(*step),
            Self::Retire { .. } => None,
        }
    }
}

#[derive(Debug)]
enum JournalEntry {
    CreatedDir(Utf8PathBuf),
    CreatedFile(Utf8PathBuf),
    ReplacedFile { path: Utf8PathBuf, backup: Utf8PathBuf },
}

/// Ordered record of filesystem effects.
#[derive(Debug, Default)]
struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    fn record(&mut self, entry: JournalEntry) {
        trace!("journal {entry:?}");
        self.entries.push(entry);
    }

    /// Undo every effect, newest first. Failures are logged and skipped so
    /// the remaining entries are still replayed.
    fn rollback(&mut self) {
        while let Some(entry) = self.entries.pop() {
            let outcome = match &entry {
                JournalEntry::CreatedFile(path) => std::fs::remove_file(path),
                JournalEntry::CreatedDir(path) => std::fs::remove_dir(path),
                JournalEntry::ReplacedFile { path, backup } => std::fs::rename(backup, path),
            };
            if let Err(err) = outcome {
                warn!("rollback of {entry:?} failed: {err}");
            }
        }
    }

    /// Discard backups of replaced files.
    fn commit(&mut self) {
        for entry in self.entries.drain(..) {
            if let JournalEntry::ReplacedFile { backup, .. } = entry
                && let Err(err) = std::fs::remove_file(&backup)
            {
                warn!("failed to remove backup {backup}: {err}");
            }
        }
    }
}

/// Applied but uncommitted install.
///
/// Dropping the transaction without calling [`InstallTransaction::commit`]
/// rolls it back.
#[derive(Debug)]
pub struct InstallTransaction {
    journal: Journal,
    files: Vec<InstalledFile>,
}

impl InstallTransaction {
    /// Return the files placed so far.
    #[must_use]
    pub fn files(&self) -> &[InstalledFile] {
        &self.files
    }

    /// Keep every effect and delete the backups of replaced files.
    #[must_use]
    pub fn commit(mut self) -> Vec<InstalledFile> {
        self.journal.commit();
        std::mem::take(&mut self.files)
    }

    /// Revert every effect in reverse order.
    pub fn rollback(mut self) {
        self.journal.rollback();
    }

    /// Move aside `path`, a file an earlier install placed that this one no
    /// longer provides. It is deleted on commit and restored on rollback.
    ///
    /// Returns `false` when there is nothing to retire at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Retire`] when the file cannot be moved.
    pub fn retire(&mut self, path: &Utf8Path) -> Result<bool, InstallError> {
        match path.symlink_metadata() {
            Ok(meta) if meta.is_dir() => {
                warn!("not retiring {path}: it is a directory");
                return Ok(false);
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(InstallError::Retire {
                    path: path.to_owned(),
                    source,
                });
            }
        }
        let backup = sibling(path, &format!("{BACKUP_SUFFIX}-stale"));
        std::fs::rename(path, &backup).map_err(|source| InstallError::Retire {
            path: path.to_owned(),
            source,
        })?;
        debug!("retired {path}");
        self.journal.record(JournalEntry::ReplacedFile {
            path: path.to_owned(),
            backup,
        });
        Ok(true)
    }
}

impl Drop for InstallTransaction {
    fn drop(&mut self) {
        if !self.journal.entries.is_empty() {
            debug!("rolling back uncommitted install");
            self.journal.rollback();
        }
    }
}

/// Apply `steps` from `staged` into `layout`.
///
/// `on_file` is called after each file is placed. `cancel` is checked
/// before every step.
///
/// # Errors
///
/// Returns [`InstallError`] naming the failing step. By the time the error
/// is returned every effect of earlier steps has been reverted.
pub fn apply(
    staged: &StagedArtifact,
    steps: &[InstallStep],
    layout: &InstallLayout,
    cancel: &CancelToken,
    on_file: &mut dyn FnMut(&InstalledFile),
) -> Result<InstallTransaction, InstallError> {
    let mut transaction = InstallTransaction {
        journal: Journal::default(),
        files: Vec::with_capacity(steps.len()),
    };

    for (index, step) in steps.iter().enumerate() {
        if cancel.is_cancelled() {
            transaction.rollback();
            return Err(InstallError::Cancelled { step: index });
        }
        match apply_step(index, step, staged, layout, &mut transaction.journal) {
            Ok(file) => {
                on_file(&file);
                transaction.files.push(file);
            }
            Err(err) => {
                transaction.rollback();
                return Err(err);
            }
        }
    }

    Ok(transaction)
}

fn apply_step(
    index: usize,
    step: &InstallStep,
    staged: &StagedArtifact,
    layout: &InstallLayout,
    journal: &mut Journal,
) -> Result<InstalledFile, InstallError> {
    let source = staged
        .resolve(step.source())
        .ok_or_else(|| InstallError::MissingSource {
            step: index,
            path: step.source().to_owned(),
        })?;

    let dir = layout.dir(step.category());
    create_dirs(index, &dir, journal)?;
    let dest = dir.join(step.destination_name());

    if let Ok(meta) = dest.symlink_metadata() {
        if meta.is_dir() {
            return Err(InstallError::DestinationIsDirectory {
                step: index,
                path: dest,
            });
        }
        let backup = sibling(&dest, &format!("{BACKUP_SUFFIX}-{index}"));
        std::fs::rename(&dest, &backup).map_err(|source| io_err(index, &dest, source))?;
        journal.record(JournalEntry::ReplacedFile {
            path: dest.clone(),
            backup,
        });
    }

    let mode = if step.category().is_executable() {
        EXECUTABLE_MODE
    } else {
        DATA_MODE
    };
    place_file(&source, &dest, mode).map_err(|source| io_err(index, &dest, source))?;
    journal.record(JournalEntry::CreatedFile(dest.clone()));
    debug!("installed {} -> {dest}", step.source());

    Ok(InstalledFile {
        step: index,
        category: step.category(),
        path: dest,
    })
}

/// Create `dir` and any missing ancestors, journalling each one created.
fn create_dirs(index: usize, dir: &Utf8Path, journal: &mut Journal) -> Result<(), InstallError> {
    let missing: Vec<&Utf8Path> = dir
        .ancestors()
        .take_while(|ancestor| !ancestor.as_str().is_empty() && !ancestor.exists())
        .collect();
    for created in missing.into_iter().rev() {
        std::fs::create_dir(created).map_err(|source| io_err(index, created, source))?;
        journal.record(JournalEntry::CreatedDir(created.to_owned()));
    }
    Ok(())
}

/// Copy through a partial sibling and rename, so `dest` never holds a
/// half-written file.
fn place_file(source: &Utf8Path, dest: &Utf8Path, mode: u32) -> std::io::Result<()> {
    let partial = sibling(dest, PARTIAL_SUFFIX);
    let result = std::fs::copy(source, &partial)
        .and_then(|_| set_mode(&partial, mode))
        .and_then(|()| std::fs::rename(&partial, dest));
    if result.is_err()
        && partial.exists()
        && let Err(err) = std::fs::remove_file(&partial)
    {
        warn!("failed to remove {partial}: {err}");
    }
    result
}

#[cfg(unix)]
fn set_mode(path: &Utf8Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Utf8Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

fn sibling(path: &Utf8Path, suffix: &str) -> Utf8PathBuf {
    let name = path.file_name().unwrap_or_default();
    path.with_file_name(format!(".{name}{suffix}"))
}

fn io_err(step: usize, path: &Utf8Path, source: std::io::Error) -> InstallError {
    InstallError::Io {
        step,
        path: path.to_owned(),
        source,
    }
}

#[cfg(test)]
#[path = "install_tests.rs"]
mod tests;
