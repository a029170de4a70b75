//! Archive extraction into a temporary staging area.
//!
//! Unpacks verified `.tar.gz`, `.tar.zst`, `.tar` and `.zip` artefacts with
//! path traversal protection: entries that are absolute, climb out through
//! `..`, or are links pointing outside the staging root abort the
//! extraction instead of being clamped or skipped. Link targets are checked
//! lexically as they arrive and again on disk once the tree is complete, so
//! a chain of individually harmless links cannot reach outside either.

use super::verification::VerifiedArtefact;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, trace};
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

/// Prefix of staging directories created under the temporary directory.
const STAGING_PREFIX: &str = "keg-staging-";

/// Trait for extracting verified artefacts, enabling test injection.
pub trait ArtefactExtractor {
    /// Unpack `artefact` into a fresh staging area.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PathTraversal`],
    /// [`ExtractionError::LinkEscape`] or [`ExtractionError::ThroughLink`]
    /// if any entry attempts to escape the staging root, [`ExtractionError::UnknownFormat`] for unrecognised
    /// input, [`ExtractionError::EmptyArchive`] if no files are found, and
    /// [`ExtractionError::Io`] on I/O failures.
    fn extract(&self, artefact: &VerifiedArtefact) -> Result<StagedArtifact, ExtractionError>;
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The zip container is malformed.
    #[error("malformed zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// A link entry points outside the staging root.
    #[error("link {path} points outside the archive: {target}")]
    LinkEscape {
        /// The link entry's path.
        path: String,
        /// The link target.
        target: String,
    },

    /// An entry would be written beneath an earlier symlink entry.
    #[error("archive entry {path} passes through symlink {link}")]
    ThroughLink {
        /// The offending entry path.
        path: String,
        /// The symlink already present on the way to it.
        link: String,
    },

    /// The bytes are not a recognised archive format.
    #[error("unrecognised archive format")]
    UnknownFormat,

    /// The archive contains no files.
    #[error("archive contains no files")]
    EmptyArchive,

    /// The staging directory path is not valid UTF-8.
    #[error("staging path {0} is not valid UTF-8")]
    NonUtf8Path(PathBuf),
}

/// Archive container formats recognised by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Gzip-compressed tar.
    TarGz,
    /// Zstandard-compressed tar.
    TarZst,
    /// Uncompressed tar.
    Tar,
    /// Zip.
    Zip,
}

impl ArchiveFormat {
    /// Detect the format from the leading bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use keg::artefact::extraction::ArchiveFormat;
    ///
    /// assert_eq!(ArchiveFormat::detect(&[0x1f, 0x8b, 0x08]), Some(ArchiveFormat::TarGz));
    /// assert_eq!(ArchiveFormat::detect(b"plain text"), None);
    /// ```
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x1f, 0x8b]) {
            return Some(Self::TarGz);
        }
        if bytes.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            return Some(Self::TarZst);
        }
        if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06") {
            return Some(Self::Zip);
        }
        if bytes.get(257..262) == Some(b"ustar".as_slice()) {
            return Some(Self::Tar);
        }
        None
    }
}

/// Temporary extracted copy of a verified artefact.
///
/// Owns its temporary directory; dropping the value deletes the tree on
/// every exit path.
#[derive(Debug)]
pub struct StagedArtifact {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
    file_count: usize,
}

impl StagedArtifact {
    /// Return the staging root install steps resolve against.
    ///
    /// When the archive unpacks to exactly one top-level directory, that
    /// directory is the root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Return the number of regular files extracted.
    #[must_use]
    pub const fn file_count(&self) -> usize {
        self.file_count
    }

    /// Resolve `relative` to an existing regular file inside the staging
    /// root.
    ///
    /// Returns `None` when the path does not exist, is not a file, or
    /// resolves (through links) outside the root.
    #[must_use]
    pub fn resolve(&self, relative: &Utf8Path) -> Option<Utf8PathBuf> {
        let candidate = self.root.join(relative);
        if !candidate.is_file() {
            return None;
        }
        let canonical_root = self.root.canonicalize().ok()?;
        let canonical = candidate.canonicalize().ok()?;
        canonical.starts_with(&canonical_root).then_some(candidate)
    }
}

/// Default extractor using the `tar`, `flate2`, `zstd` and `zip` crates.
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor {
    staging_parent: Option<PathBuf>,
}

impl ArchiveExtractor {
    /// Create staging directories under `parent` instead of the system
    /// temporary directory.
    #[must_use]
    pub fn in_dir(parent: impl Into<PathBuf>) -> Self {
        Self {
            staging_parent: Some(parent.into()),
        }
    }

    fn staging_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        match &self.staging_parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
    }
}

impl ArtefactExtractor for ArchiveExtractor {
    fn extract(&self, artefact: &VerifiedArtefact) -> Result<StagedArtifact, ExtractionError> {
        extract_bytes_with(artefact.bytes(), || self.staging_dir())
    }
}

/// Unpack raw archive bytes into a new staging area in the system temporary
/// directory.
///
/// Callers in the install pipeline go through [`ArtefactExtractor`], which
/// only accepts verified artefacts.
///
/// # Errors
///
/// See [`ArtefactExtractor::extract`].
pub fn extract_bytes(bytes: &[u8]) -> Result<StagedArtifact, ExtractionError> {
    extract_bytes_with(bytes, || {
        tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir()
    })
}

fn extract_bytes_with(
    bytes: &[u8],
    make_dir: impl FnOnce() -> std::io::Result<tempfile::TempDir>,
) -> Result<StagedArtifact, ExtractionError> {
    let format = ArchiveFormat::detect(bytes).ok_or(ExtractionError::UnknownFormat)?;
    let temp = make_dir()?;
    debug!("extracting {format:?} archive into {}", temp.path().display());

    let file_count = match format {
        ArchiveFormat::TarGz => unpack_tar(flate2::read::GzDecoder::new(bytes), temp.path())?,
        ArchiveFormat::TarZst => unpack_tar(zstd::Decoder::new(bytes)?, temp.path())?,
        ArchiveFormat::Tar => unpack_tar(bytes, temp.path())?,
        ArchiveFormat::Zip => unpack_zip(bytes, temp.path())?,
    };
    if file_count == 0 {
        return Err(ExtractionError::EmptyArchive);
    }
    ensure_links_stay_inside(temp.path())?;

    let root = staging_root(temp.path())?;
    let root = Utf8PathBuf::try_from(root)
        .map_err(|e| ExtractionError::NonUtf8Path(e.into_path_buf()))?;
    Ok(StagedArtifact {
        _temp: temp,
        root,
        file_count,
    })
}

fn unpack_tar(reader: impl Read, dest: &Path) -> Result<usize, ExtractionError> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    let mut files = 0;

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_path = entry.path()?.into_owned();
        validate_entry_path(&entry_path)?;
        ensure_no_linked_parent(dest, &entry_path)?;

        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            let target = entry
                .link_name()?
                .ok_or_else(|| ExtractionError::PathTraversal {
                    path: entry_path.display().to_string(),
                })?
                .into_owned();
            let escapes = if kind.is_symlink() {
                link_escapes(&entry_path, &target)
            } else {
                validate_entry_path(&target).is_err()
                    || ensure_no_linked_parent(dest, &target).is_err()
            };
            if escapes {
                return Err(ExtractionError::LinkEscape {
                    path: entry_path.display().to_string(),
                    target: target.display().to_string(),
                });
            }
        } else if !(kind.is_file() || kind.is_dir()) {
            trace!("skipping special entry {}", entry_path.display());
            continue;
        }

        if !entry.unpack_in(dest)? {
            return Err(ExtractionError::PathTraversal {
                path: entry_path.display().to_string(),
            });
        }
        if !kind.is_dir() {
            files += 1;
        }
    }

    Ok(files)
}

const UNIX_FILE_TYPE_MASK: u32 = 0o170_000;
const UNIX_SYMLINK: u32 = 0o120_000;

fn unpack_zip(bytes: &[u8], dest: &Path) -> Result<usize, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut files = 0;

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let Some(relative) = file.enclosed_name() else {
            return Err(ExtractionError::PathTraversal {
                path: file.name().to_owned(),
            });
        };
        validate_entry_path(&relative)?;
        ensure_no_linked_parent(dest, &relative)?;
        let out_path = dest.join(&relative);

        if file.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        let mode = file.unix_mode();
        if mode.is_some_and(|m| m & UNIX_FILE_TYPE_MASK == UNIX_SYMLINK) {
            let mut target = String::new();
            file.read_to_string(&mut target)?;
            return Err(ExtractionError::LinkEscape {
                path: relative.display().to_string(),
                target,
            });
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&out_path)?;
        std::io::copy(&mut file, &mut out)?;
        apply_mode(&out_path, mode)?;
        files += 1;
    }

    Ok(files)
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        Some(mode) => std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o777)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> std::io::Result<()> {
    Ok(())
}

/// Validate that an entry path does not escape the destination directory
/// via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Return whether a symlink at `link_path` pointing to `target` resolves
/// outside the archive root, evaluated lexically.
fn link_escapes(link_path: &Path, target: &Path) -> bool {
    if target.is_absolute() {
        return true;
    }
    let mut depth = link_path
        .parent()
        .map_or(0, |parent| {
            parent
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .count()
        });
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

/// Reject `relative` when a directory on the way to it already exists in
/// `dest` as a symlink, so no entry is ever written through a link.
fn ensure_no_linked_parent(dest: &Path, relative: &Path) -> Result<(), ExtractionError> {
    let Some(parent) = relative.parent() else {
        return Ok(());
    };
    let mut current = dest.to_path_buf();
    for component in parent.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(ExtractionError::ThroughLink {
                    path: relative.display().to_string(),
                    link: current.strip_prefix(dest).unwrap_or(&current).display().to_string(),
                });
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Resolve every symlink under `root` on disk and fail if any lands outside
/// it. Dangling links are left alone; they cannot be read through.
fn ensure_links_stay_inside(root: &Path) -> Result<(), ExtractionError> {
    let canonical_root = root.canonicalize()?;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_symlink() {
                continue;
            }
            match path.canonicalize() {
                Ok(resolved) if !resolved.starts_with(&canonical_root) => {
                    let target = std::fs::read_link(&path)?;
                    return Err(ExtractionError::LinkEscape {
                        path: path.strip_prefix(root).unwrap_or(&path).display().to_string(),
                        target: target.display().to_string(),
                    });
                }
                Ok(_) => {}
                Err(err) => trace!("leaving dangling link {}: {err}", path.display()),
            }
        }
    }
    Ok(())
}

/// Hoist a single top-level directory to be the staging root.
fn staging_root(extracted: &Path) -> std::io::Result<PathBuf> {
    let mut children = std::fs::read_dir(extracted)?.collect::<std::io::Result<Vec<_>>>()?;
    if children.len() == 1
        && let Some(only) = children.pop()
        && only.file_type()?.is_dir()
    {
        debug!("using single top-level directory {} as root", only.path().display());
        return Ok(only.path());
    }
    Ok(extracted.to_path_buf())
}

#[cfg(test)]
#[path = "extraction_tests.rs"]
mod tests;
