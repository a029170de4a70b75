//! In-memory manifest types.
//!
//! A [`Manifest`] is immutable once parsed: every field is validated by the
//! parser and exposed through accessors only.

use super::digest::ArtefactDigest;
use super::error::{ManifestError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Shells that accept completion scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shell {
    /// GNU Bash.
    Bash,
    /// Z shell.
    Zsh,
    /// Friendly interactive shell.
    Fish,
}

impl Shell {
    /// Return the lowercase shell name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Fish => "fish",
        }
    }
}

/// Where an install step places its file.
///
/// The literal manifest spellings are `bin`, `man1`..`man8`,
/// `bash_completion`, `zsh_completion` and `fish_completion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DestinationCategory {
    /// An executable placed in the binary directory.
    Binary,
    /// A manual page in the given section directory.
    ManPage {
        /// Manual section, 1 through 8.
        section: u8,
    },
    /// A completion script for one shell.
    ShellCompletion(Shell),
}

impl DestinationCategory {
    /// Return whether files in this category are made executable.
    #[must_use]
    pub const fn is_executable(self) -> bool {
        matches!(self, Self::Binary)
    }
}

impl FromStr for DestinationCategory {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "bin" => Ok(Self::Binary),
            "bash_completion" => Ok(Self::ShellCompletion(Shell::Bash)),
            "zsh_completion" => Ok(Self::ShellCompletion(Shell::Zsh)),
            "fish_completion" => Ok(Self::ShellCompletion(Shell::Fish)),
            other => other
                .strip_prefix("man")
                .and_then(|section| section.parse::<u8>().ok())
                .filter(|section| (1..=8).contains(section))
                .map(|section| Self::ManPage { section })
                .ok_or_else(|| format!("unknown destination category \"{other}\"")),
        }
    }
}

impl TryFrom<String> for DestinationCategory {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DestinationCategory> for String {
    fn from(value: DestinationCategory) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DestinationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => f.write_str("bin"),
            Self::ManPage { section } => write!(f, "man{section}"),
            Self::ShellCompletion(shell) => write!(f, "{}_completion", shell.as_str()),
        }
    }
}

/// One declarative instruction mapping a staged file to a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    source: Utf8PathBuf,
    category: DestinationCategory,
    destination_name: Option<String>,
}

impl InstallStep {
    /// Build a step, validating the source path and destination name.
    ///
    /// The source must be relative and must not contain `..`; the
    /// destination name must be a single file name.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidStep`] describing the first problem.
    pub fn new(
        index: usize,
        source: impl Into<Utf8PathBuf>,
        category: DestinationCategory,
        destination_name: Option<String>,
    ) -> Result<Self> {
        let source = source.into();
        let invalid = |reason: String| ManifestError::InvalidStep { index, reason };

        if source.as_str().trim().is_empty() {
            return Err(invalid("source path is empty".to_owned()));
        }
        if source.is_absolute() || source.as_str().starts_with('/') {
            return Err(invalid(format!("source path {source} must be relative")));
        }
        if source
            .components()
            .any(|c| matches!(c, camino::Utf8Component::ParentDir))
        {
            return Err(invalid(format!("source path {source} escapes the archive")));
        }
        if source.file_name().is_none() {
            return Err(invalid(format!("source path {source} names no file")));
        }
        if let Some(name) = destination_name.as_deref() {
            validate_file_name(name).map_err(invalid)?;
        }

        Ok(Self {
            source,
            category,
            destination_name,
        })
    }

    /// Return the path of the file inside the staged artefact.
    #[must_use]
    pub fn source(&self) -> &Utf8Path {
        &self.source
    }

    /// Return the destination category.
    #[must_use]
    pub const fn category(&self) -> DestinationCategory {
        self.category
    }

    /// Return the destination file name: the override, else the source's
    /// base name.
    #[must_use]
    pub fn destination_name(&self) -> &str {
        self.destination_name
            .as_deref()
            .or_else(|| self.source.file_name())
            .unwrap_or(self.source.as_str())
    }
}

fn validate_file_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(format!("destination name \"{name}\" is not a file name"));
    }
    if name.contains(['/', '\\']) {
        return Err(format!(
            "destination name \"{name}\" must not contain path separators"
        ));
    }
    Ok(())
}

/// Whether a dependency is needed to build or to run the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// Needed only while building (`:build`).
    Build,
    /// Needed at run time (`:run`).
    Run,
}

/// Descriptive metadata that does not affect installation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    /// One-line description (`desc`).
    pub desc: Option<String>,
    /// Project homepage.
    pub homepage: Option<String>,
    /// License identifiers, deduplicated, in declared order.
    pub license: Vec<String>,
    /// Build-time dependencies in declared order.
    pub build_dependencies: Vec<String>,
    /// Run-time dependencies in declared order.
    pub run_dependencies: Vec<String>,
}

/// Post-install smoke test definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeTest {
    /// Destination name of the binary to run.
    pub binary: String,
    /// Fixed argument list.
    pub args: Vec<String>,
}

/// Declarative description of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub(super) name: String,
    pub(super) version: String,
    pub(super) source_url: String,
    pub(super) digest: ArtefactDigest,
    pub(super) info: PackageInfo,
    pub(super) install_steps: Vec<InstallStep>,
    pub(super) smoke_test: Option<SmokeTest>,
}

impl Manifest {
    /// Return the package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the package version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Return the artefact URL (`url`).
    #[must_use]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Return the declared artefact digest.
    #[must_use]
    pub const fn digest(&self) -> &ArtefactDigest {
        &self.digest
    }

    /// Return descriptive metadata.
    #[must_use]
    pub const fn info(&self) -> &PackageInfo {
        &self.info
    }

    /// Return the license identifiers.
    #[must_use]
    pub fn license(&self) -> &[String] {
        &self.info.license
    }

    /// Return the build-time dependencies.
    #[must_use]
    pub fn build_dependencies(&self) -> &[String] {
        &self.info.build_dependencies
    }

    /// Return the ordered install steps.
    #[must_use]
    pub fn install_steps(&self) -> &[InstallStep] {
        &self.install_steps
    }

    /// Return the smoke test, if the manifest installs a binary.
    #[must_use]
    pub const fn smoke_test(&self) -> Option<&SmokeTest> {
        self.smoke_test.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("bin", DestinationCategory::Binary)]
    #[case("man1", DestinationCategory::ManPage { section: 1 })]
    #[case("man8", DestinationCategory::ManPage { section: 8 })]
    #[case("bash_completion", DestinationCategory::ShellCompletion(Shell::Bash))]
    #[case("zsh_completion", DestinationCategory::ShellCompletion(Shell::Zsh))]
    #[case("fish_completion", DestinationCategory::ShellCompletion(Shell::Fish))]
    fn category_round_trips_through_manifest_spelling(
        #[case] spelling: &str,
        #[case] expected: DestinationCategory,
    ) {
        let parsed: DestinationCategory = spelling.parse().expect("known category");
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), spelling);
    }

    #[rstest]
    #[case("lib")]
    #[case("man0")]
    #[case("man9")]
    #[case("powershell_completion")]
    fn rejects_unknown_category(#[case] spelling: &str) {
        assert!(spelling.parse::<DestinationCategory>().is_err());
    }

    #[test]
    fn destination_name_defaults_to_base_name() {
        let step = InstallStep::new(0, "man/hurl.1", DestinationCategory::ManPage { section: 1 }, None)
            .expect("valid step");
        assert_eq!(step.destination_name(), "hurl.1");
    }

    #[test]
    fn destination_name_override_wins() {
        let step = InstallStep::new(
            0,
            "completions/hurl.zsh",
            DestinationCategory::ShellCompletion(Shell::Zsh),
            Some("_hurl".to_owned()),
        )
        .expect("valid step");
        assert_eq!(step.destination_name(), "_hurl");
    }

    #[rstest]
    #[case::absolute("/etc/passwd", None)]
    #[case::parent("../hurl", None)]
    #[case::nested_parent("bin/../../hurl", None)]
    #[case::empty("", None)]
    #[case::separator_in_name("hurl", Some("sub/hurl"))]
    #[case::dot_name("hurl", Some(".."))]
    fn rejects_unsafe_steps(#[case] source: &str, #[case] name: Option<&str>) {
        let result = InstallStep::new(
            3,
            source,
            DestinationCategory::Binary,
            name.map(str::to_owned),
        );
        assert!(matches!(result, Err(ManifestError::InvalidStep { index: 3, .. })));
    }
}
