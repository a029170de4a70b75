//! Removal of installed packages using their receipts.

use crate::error::Result;
use crate::layout::InstallLayout;
use crate::lock::PrefixLock;
use crate::receipt::{read_receipt, remove_receipt};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};

/// Outcome of removing one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallReport {
    /// Package name.
    pub name: String,
    /// Version that was installed.
    pub version: String,
    /// Files that were deleted.
    pub removed: Vec<Utf8PathBuf>,
    /// Recorded files that were already gone.
    pub missing: Vec<Utf8PathBuf>,
}

/// Remove every file recorded for `name`, prune emptied directories and
/// delete the receipt.
///
/// Runs under the prefix lock.
///
/// # Errors
///
/// Returns [`crate::error::InstallerError::Receipt`] when the package is not
/// installed or its receipt is unreadable, and
/// [`crate::error::InstallerError::Io`] when a recorded file cannot be
/// removed.
pub fn uninstall(name: &str, layout: &InstallLayout) -> Result<UninstallReport> {
    let _lock = PrefixLock::acquire(&layout.lock_path())?;
    let receipt = read_receipt(layout, name)?;

    let mut removed = Vec::new();
    let mut missing = Vec::new();
    for file in receipt.files() {
        match std::fs::remove_file(&file.path) {
            Ok(()) => {
                debug!("removed {}", file.path);
                removed.push(file.path.clone());
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} was already removed", file.path);
                missing.push(file.path.clone());
            }
            Err(err) => return Err(err.into()),
        }
    }

    for path in removed.iter().chain(&missing) {
        if let Some(parent) = path.parent() {
            prune_empty_dirs(parent, layout.prefix());
        }
    }
    remove_receipt(layout, name)?;
    prune_empty_dirs(&layout.receipts_dir(), layout.prefix());

    Ok(UninstallReport {
        name: receipt.name().to_owned(),
        version: receipt.version().to_owned(),
        removed,
        missing,
    })
}

/// Remove `dir` and its ancestors while they are empty, stopping at `root`.
pub(crate) fn prune_empty_dirs(dir: &Utf8Path, root: &Utf8Path) {
    for ancestor in dir.ancestors() {
        if ancestor == root || !ancestor.starts_with(root) {
            break;
        }
        // `remove_dir` refuses non-empty directories, which ends the walk.
        if std::fs::remove_dir(ancestor).is_err() {
            break;
        }
        debug!("pruned empty directory {ancestor}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InstallerError;
    use crate::install::InstalledFile;
    use crate::manifest::{DestinationCategory, parse};
    use crate::receipt::{InstallReceipt, ReceiptError, write_receipt};
    use crate::test_utils::{manifest_toml, utf8_temp_dir};

    fn seed(prefix: &Utf8Path, layout: &InstallLayout) {
        let raw = manifest_toml(
            "tool",
            "https://example.test/tool-1.0.0.tar.gz",
            &"c".repeat(64),
            &[("tool", "bin"), ("tool.1", "man1")],
        );
        let manifest = parse(&raw).expect("valid manifest");
        let bin = prefix.join("bin/tool");
        let man = prefix.join("share/man/man1/tool.1");
        for path in [&bin, &man] {
            std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            std::fs::write(path, b"x").expect("write");
        }
        let files = vec![
            InstalledFile {
                step: 0,
                category: DestinationCategory::Binary,
                path: bin,
            },
            InstalledFile {
                step: 1,
                category: DestinationCategory::ManPage { section: 1 },
                path: man,
            },
        ];
        write_receipt(layout, &InstallReceipt::new(&manifest, files)).expect("receipt");
    }

    #[test]
    fn removes_recorded_files_and_receipt() {
        let (_dir, root) = utf8_temp_dir();
        let prefix = root.join("prefix");
        let layout = InstallLayout::new(prefix.clone());
        seed(&prefix, &layout);
        std::fs::write(prefix.join("bin/other"), b"keep").expect("unrelated file");

        let report = uninstall("tool", &layout).expect("uninstall");

        assert_eq!(report.removed.len(), 2);
        assert!(report.missing.is_empty());
        assert!(prefix.join("bin/other").is_file());
        assert!(!prefix.join("share").exists());
        assert!(!layout.receipt_path("tool").exists());
        assert!(!prefix.join("var").exists());
    }

    #[test]
    fn already_deleted_files_are_skipped() {
        let (_dir, root) = utf8_temp_dir();
        let prefix = root.join("prefix");
        let layout = InstallLayout::new(prefix.clone());
        seed(&prefix, &layout);
        std::fs::remove_file(prefix.join("bin/tool")).expect("remove by hand");

        let report = uninstall("tool", &layout).expect("uninstall");
        assert_eq!(report.missing, vec![prefix.join("bin/tool")]);
        assert_eq!(report.removed, vec![prefix.join("share/man/man1/tool.1")]);
    }

    #[test]
    fn unknown_package_is_not_installed() {
        let (_dir, root) = utf8_temp_dir();
        let prefix = root.join("prefix");
        let layout = InstallLayout::new(prefix);
        assert!(matches!(
            uninstall("tool", &layout),
            Err(InstallerError::Receipt(ReceiptError::NotInstalled { .. }))
        ));
    }
}
