//! Destination layout under an install prefix.
//!
//! Every destination category maps to a fixed directory below the prefix, so
//! installs, uninstalls and listings agree on where files live.

use crate::manifest::{DestinationCategory, Shell};
use camino::{Utf8Path, Utf8PathBuf};

/// Suffix of the lock file held for the duration of a run.
///
/// The lock sits beside the prefix rather than inside it, so a run that fails
/// before installing anything leaves the prefix absent.
pub const LOCK_SUFFIX: &str = ".keg.lock";

/// Explicit mapping from destination categories to directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    prefix: Utf8PathBuf,
}

impl InstallLayout {
    /// Create a layout rooted at `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<Utf8PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Return the prefix root.
    #[must_use]
    pub fn prefix(&self) -> &Utf8Path {
        &self.prefix
    }

    /// Return the directory files of `category` are installed into.
    ///
    /// # Examples
    ///
    /// ```
    /// use keg::layout::InstallLayout;
    /// use keg::manifest::DestinationCategory;
    ///
    /// let layout = InstallLayout::new("/opt/keg");
    /// assert_eq!(layout.dir(DestinationCategory::Binary), "/opt/keg/bin");
    /// assert_eq!(
    ///     layout.dir(DestinationCategory::ManPage { section: 1 }),
    ///     "/opt/keg/share/man/man1"
    /// );
    /// ```
    #[must_use]
    pub fn dir(&self, category: DestinationCategory) -> Utf8PathBuf {
        match category {
            DestinationCategory::Binary => self.prefix.join("bin"),
            DestinationCategory::ManPage { section } => self
                .prefix
                .join("share")
                .join("man")
                .join(format!("man{section}")),
            DestinationCategory::ShellCompletion(Shell::Bash) => {
                self.prefix.join("etc").join("bash_completion.d")
            }
            DestinationCategory::ShellCompletion(Shell::Zsh) => {
                self.prefix.join("share").join("zsh").join("site-functions")
            }
            DestinationCategory::ShellCompletion(Shell::Fish) => self
                .prefix
                .join("share")
                .join("fish")
                .join("vendor_completions.d"),
        }
    }

    /// Return the directory holding install receipts.
    #[must_use]
    pub fn receipts_dir(&self) -> Utf8PathBuf {
        self.prefix.join("var").join("keg").join("receipts")
    }

    /// Return the receipt path for package `name`.
    #[must_use]
    pub fn receipt_path(&self, name: &str) -> Utf8PathBuf {
        self.receipts_dir().join(format!("{name}.json"))
    }

    /// Return the path of the prefix lock file: `.<prefix name>.keg.lock` in
    /// the prefix's parent directory.
    ///
    /// A prefix with no parent or no final component (such as `/`) keeps its
    /// lock inside itself.
    #[must_use]
    pub fn lock_path(&self) -> Utf8PathBuf {
        match (self.prefix.parent(), self.prefix.file_name()) {
            (Some(parent), Some(name)) => parent.join(format!(".{name}{LOCK_SUFFIX}")),
            _ => self.prefix.join(LOCK_SUFFIX),
        }
    }
}

/// Return the default prefix for the current platform.
///
/// The base directory comes from `directories_next::BaseDirs::data_local_dir()`
/// (for example `~/.local/share` on Linux); keg appends `keg` under it.
#[must_use]
pub fn default_prefix() -> Option<Utf8PathBuf> {
    directories_next::BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::try_from(dirs.data_local_dir().to_path_buf()).ok())
        .map(|p| p.join("keg"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::bin("bin", "bin")]
    #[case::man1("man1", "share/man/man1")]
    #[case::man5("man5", "share/man/man5")]
    #[case::bash("bash_completion", "etc/bash_completion.d")]
    #[case::zsh("zsh_completion", "share/zsh/site-functions")]
    #[case::fish("fish_completion", "share/fish/vendor_completions.d")]
    fn categories_map_below_prefix(#[case] category: &str, #[case] relative: &str) {
        let layout = InstallLayout::new("/opt/keg");
        let category: DestinationCategory = category.parse().expect("known category");
        assert_eq!(layout.dir(category), Utf8Path::new("/opt/keg").join(relative));
    }

    #[test]
    fn receipts_live_under_prefix() {
        let layout = InstallLayout::new("/opt/keg");
        assert_eq!(
            layout.receipt_path("hurl"),
            Utf8PathBuf::from("/opt/keg/var/keg/receipts/hurl.json")
        );
    }

    #[rstest]
    #[case::nested("/opt/keg", "/opt/.keg.keg.lock")]
    #[case::trailing_slash("/srv/tools/", "/srv/.tools.keg.lock")]
    #[case::root("/", "/.keg.lock")]
    fn lock_lives_beside_prefix(#[case] prefix: &str, #[case] expected: &str) {
        let layout = InstallLayout::new(prefix);
        assert_eq!(layout.lock_path(), Utf8PathBuf::from(expected));
    }

    #[test]
    fn default_prefix_ends_with_keg() {
        // Containers without a home directory have no default.
        let Some(prefix) = default_prefix() else {
            return;
        };
        assert_eq!(prefix.file_name(), Some("keg"));
    }
}
