//! Error types for manifest parsing and validation.
//!
//! Each variant names the offending field or install step so that a user
//! can find the problem in the manifest without rerunning with `-v`.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors arising from reading or validating a package manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read manifest {path}: {source}")]
    Read {
        /// Path of the manifest file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML document is syntactically invalid or has unknown keys.
    #[error("invalid manifest TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// The JSON document is syntactically invalid or has unknown keys.
    #[error("invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required key is absent or blank.
    #[error("manifest is missing required field `{field}`")]
    MissingField {
        /// The literal manifest key.
        field: &'static str,
    },

    /// The package name contains characters that cannot form a file name.
    #[error("invalid package name \"{value}\": {reason}")]
    InvalidName {
        /// The rejected name.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The source URL is malformed or uses an unsupported scheme.
    #[error("invalid url \"{url}\": {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The declared digest is not valid hex of the algorithm's length.
    #[error("invalid {algorithm} digest: {reason}")]
    InvalidDigest {
        /// Name of the digest algorithm (the manifest key).
        algorithm: &'static str,
        /// Description of the validation failure.
        reason: String,
    },

    /// More than one digest key was declared.
    #[error("manifest declares both `sha256` and `sha512`; keep exactly one")]
    ConflictingDigests,

    /// No version was declared and none could be derived from the URL.
    #[error("no `version` declared and none could be derived from {url}")]
    UndeterminedVersion {
        /// The URL the derivation was attempted on.
        url: String,
    },

    /// A `depends_on` entry names an unknown dependency kind.
    #[error("dependency {name} has unknown kind \"{kind}\"; expected build or run")]
    InvalidDependencyKind {
        /// The dependency name.
        name: String,
        /// The rejected kind string.
        kind: String,
    },

    /// The manifest declares no install steps.
    #[error("manifest declares no install steps")]
    EmptyInstall,

    /// An install step is malformed.
    #[error("install step {index}: {reason}")]
    InvalidStep {
        /// Zero-based position of the step in the `install` list.
        index: usize,
        /// Description of the validation failure.
        reason: String,
    },

    /// The smoke-test section names a binary no install step provides.
    #[error("test binary \"{binary}\" is not installed by any `bin` step")]
    UnknownTestBinary {
        /// The binary named by `test.binary`.
        binary: String,
    },
}

/// Result type alias using [`ManifestError`].
pub type Result<T> = std::result::Result<T, ManifestError>;
