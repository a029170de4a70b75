//! Per-package install receipts.
//!
//! A receipt records what a successful install placed under the prefix. It
//! is stored as pretty-printed JSON at
//! `<prefix>/var/keg/receipts/<name>.json` and is the only input uninstall
//! and listing trust.

use crate::install::InstalledFile;
use crate::layout::InstallLayout;
use crate::manifest::{ArtefactDigest, Manifest};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Receipt schema version written by this build.
pub const RECEIPT_SCHEMA_VERSION: u32 = 1;

/// Record of one installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    schema_version: u32,
    name: String,
    version: String,
    source_url: String,
    digest: ArtefactDigest,
    installed_at: u64,
    files: Vec<InstalledFile>,
}

impl InstallReceipt {
    /// Build a receipt for `manifest` covering `files`, stamped now.
    #[must_use]
    pub fn new(manifest: &Manifest, files: Vec<InstalledFile>) -> Self {
        let installed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        Self {
            schema_version: RECEIPT_SCHEMA_VERSION,
            name: manifest.name().to_owned(),
            version: manifest.version().to_owned(),
            source_url: manifest.source_url().to_owned(),
            digest: manifest.digest().clone(),
            installed_at,
            files,
        }
    }

    /// Return the package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the installed version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Return the artefact URL the files came from.
    #[must_use]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Return the verified artefact digest.
    #[must_use]
    pub const fn digest(&self) -> &ArtefactDigest {
        &self.digest
    }

    /// Return the install time in seconds since the Unix epoch.
    #[must_use]
    pub const fn installed_at(&self) -> u64 {
        self.installed_at
    }

    /// Return the installed files in step order.
    #[must_use]
    pub fn files(&self) -> &[InstalledFile] {
        &self.files
    }
}

/// Errors reading or writing receipts.
#[derive(Debug, thiserror::Error)]
pub enum ReceiptError {
    /// No receipt exists for the package.
    #[error("{name} is not installed")]
    NotInstalled {
        /// Package name.
        name: String,
    },

    /// Reading a receipt failed.
    #[error("failed to read receipt {path}: {source}")]
    Read {
        /// Receipt path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A receipt is not valid JSON of the expected shape.
    #[error("malformed receipt {path}: {source}")]
    Malformed {
        /// Receipt path.
        path: Utf8PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A receipt was written by a newer keg.
    #[error("receipt {path} has unsupported schema version {found}")]
    UnsupportedSchema {
        /// Receipt path.
        path: Utf8PathBuf,
        /// Version found in the file.
        found: u32,
    },

    /// Creating the receipts directory or writing the file failed.
    #[error("failed to write receipt {path}: {source}")]
    Write {
        /// Receipt path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serializing the receipt failed.
    #[error("failed to serialize receipt: {source}")]
    Serialize {
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}

/// Write `receipt` into the layout's receipts directory.
///
/// The JSON is written to a temporary sibling and renamed into place so a
/// crash never leaves a truncated receipt.
///
/// # Errors
///
/// Returns [`ReceiptError::Write`] or [`ReceiptError::Serialize`].
pub fn write_receipt(
    layout: &InstallLayout,
    receipt: &InstallReceipt,
) -> Result<Utf8PathBuf, ReceiptError> {
    let path = layout.receipt_path(receipt.name());
    let write_err = |source| ReceiptError::Write {
        path: path.clone(),
        source,
    };
    let dir = layout.receipts_dir();
    std::fs::create_dir_all(&dir).map_err(write_err)?;

    let json = serde_json::to_string_pretty(receipt)
        .map_err(|source| ReceiptError::Serialize { source })?;
    let staging = dir.join(format!(".{}.json.tmp", receipt.name()));
    std::fs::write(&staging, json).map_err(write_err)?;
    std::fs::rename(&staging, &path).map_err(write_err)?;
    debug!("wrote receipt {path}");
    Ok(path)
}

/// Read the receipt for package `name`.
///
/// # Errors
///
/// Returns [`ReceiptError::NotInstalled`] when no receipt exists, otherwise
/// read or parse errors.
pub fn read_receipt(layout: &InstallLayout, name: &str) -> Result<InstallReceipt, ReceiptError> {
    let path = layout.receipt_path(name);
    if !path.is_file() {
        return Err(ReceiptError::NotInstalled {
            name: name.to_owned(),
        });
    }
    load(&path)
}

/// Read every receipt under the layout, sorted by package name.
///
/// Malformed receipts are logged and skipped so one bad file does not hide
/// the rest of the prefix.
///
/// # Errors
///
/// Returns [`ReceiptError::Read`] if the receipts directory exists but
/// cannot be listed.
pub fn read_all(layout: &InstallLayout) -> Result<Vec<InstallReceipt>, ReceiptError> {
    let dir = layout.receipts_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let read_err = |source| ReceiptError::Read {
        path: dir.clone(),
        source,
    };

    let mut receipts = Vec::new();
    for entry in dir.read_dir_utf8().map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let path = entry.path();
        if path.extension() != Some("json") || entry.file_name().starts_with('.') {
            continue;
        }
        match load(path) {
            Ok(receipt) => receipts.push(receipt),
            Err(err) => warn!("skipping {path}: {err}"),
        }
    }
    receipts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(receipts)
}

/// Delete the receipt for package `name`.
///
/// # Errors
///
/// Returns [`ReceiptError::Write`] if the file cannot be removed.
pub fn remove_receipt(layout: &InstallLayout, name: &str) -> Result<(), ReceiptError> {
    let path = layout.receipt_path(name);
    std::fs::remove_file(&path).map_err(|source| ReceiptError::Write { path, source })
}

fn load(path: &Utf8Path) -> Result<InstallReceipt, ReceiptError> {
    let content = std::fs::read_to_string(path).map_err(|source| ReceiptError::Read {
        path: path.to_owned(),
        source,
    })?;
    let receipt: InstallReceipt =
        serde_json::from_str(&content).map_err(|source| ReceiptError::Malformed {
            path: path.to_owned(),
            source,
        })?;
    if receipt.schema_version > RECEIPT_SCHEMA_VERSION {
        return Err(ReceiptError::UnsupportedSchema {
            path: path.to_owned(),
            found: receipt.schema_version,
        });
    }
    Ok(receipt)
}
