//! Output formatting for package listing.
//!
//! This module formats installed package receipts for human-readable or
//! JSON output.

use crate::receipt::InstallReceipt;
use serde::Serialize;

/// Format installed packages for human-readable output.
///
/// # Examples
///
/// ```
/// use keg::list_output::format_human;
///
/// let output = format_human(&[]);
/// assert!(output.contains("No packages installed"));
/// ```
#[must_use]
pub fn format_human(receipts: &[InstallReceipt]) -> String {
    if receipts.is_empty() {
        return String::from(
            "No packages installed.\n\nRun `keg install <manifest>` to install a package.",
        );
    }

    let width = receipts
        .iter()
        .map(|receipt| receipt.name().len())
        .max()
        .unwrap_or_default();
    let mut output = String::from("Installed packages:\n\n");
    for receipt in receipts {
        let count = receipt.files().len();
        let plural = if count == 1 { "file" } else { "files" };
        output.push_str(&format!(
            "  {:<width$}  {}  ({count} {plural})\n",
            receipt.name(),
            receipt.version(),
        ));
    }
    output
}

/// Format installed packages as a JSON array.
///
/// # Examples
///
/// ```
/// use keg::list_output::format_json;
///
/// assert_eq!(format_json(&[]), "[]");
/// ```
#[must_use]
pub fn format_json(receipts: &[InstallReceipt]) -> String {
    let entries: Vec<PackageEntry<'_>> = receipts.iter().map(PackageEntry::from).collect();
    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_owned())
}

/// JSON entry for one installed package.
#[derive(Debug, Serialize)]
pub struct PackageEntry<'a> {
    /// Package name.
    pub name: &'a str,
    /// Installed version.
    pub version: &'a str,
    /// Verified artefact digest, `algorithm:hex`.
    pub digest: String,
    /// Install time in seconds since the Unix epoch.
    pub installed_at: u64,
    /// Installed file paths in step order.
    pub files: Vec<&'a str>,
}

impl<'a> From<&'a InstallReceipt> for PackageEntry<'a> {
    fn from(receipt: &'a InstallReceipt) -> Self {
        Self {
            name: receipt.name(),
            version: receipt.version(),
            digest: receipt.digest().to_string(),
            installed_at: receipt.installed_at(),
            files: receipt.files().iter().map(|f| f.path.as_str()).collect(),
        }
    }
}
