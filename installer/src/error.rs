//! Error types for the keg CLI.
//!
//! Each subsystem has its own error enum; this module rolls them up into
//! [`InstallerError`] and assigns every failure class a distinct process
//! exit code so scripts can tell a bad manifest from a tampered download.

use crate::artefact::{ExtractionError, FetchError};
use crate::config::ConfigError;
use crate::install::InstallError;
use crate::lock::LockError;
use crate::manifest::{ArtefactDigest, ManifestError};
use crate::phase::{IllegalTransition, InstallPhase};
use crate::receipt::ReceiptError;
use thiserror::Error;

/// Exit code for configuration and other failures.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for manifest parse failures.
pub const EXIT_PARSE: i32 = 2;
/// Exit code for network and retrieval failures.
pub const EXIT_NETWORK: i32 = 3;
/// Exit code for digest mismatches.
pub const EXIT_DIGEST_MISMATCH: i32 = 4;
/// Exit code for extraction failures.
pub const EXIT_EXTRACTION: i32 = 5;
/// Exit code for install, lock and receipt failures.
pub const EXIT_INSTALL: i32 = 6;
/// Exit code after cancellation (128 + SIGINT).
pub const EXIT_CANCELLED: i32 = 130;

/// Errors that can occur while running a keg command.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The manifest is missing or invalid.
    #[error("invalid manifest: {0}")]
    Manifest(#[from] ManifestError),

    /// The artefact could not be retrieved.
    #[error("{name}: download failed: {source}")]
    Fetch {
        /// Package name.
        name: String,
        /// Underlying fetch error.
        #[source]
        source: FetchError,
    },

    /// The artefact's digest did not match the manifest.
    #[error("{name}: digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Package name.
        name: String,
        /// Digest declared by the manifest.
        expected: ArtefactDigest,
        /// Digest of the downloaded bytes.
        actual: ArtefactDigest,
    },

    /// The verified artefact could not be unpacked.
    #[error("{name}: extraction failed: {source}")]
    Extraction {
        /// Package name.
        name: String,
        /// Underlying extraction error.
        #[source]
        source: ExtractionError,
    },

    /// An install step failed; earlier steps were rolled back.
    #[error("{name}: {source}; changes were rolled back")]
    Install {
        /// Package name.
        name: String,
        /// Underlying install error, naming the step.
        #[source]
        source: InstallError,
    },

    /// The install receipt could not be written; installed files were
    /// rolled back.
    #[error("{name}: failed to record install: {source}; changes were rolled back")]
    Record {
        /// Package name.
        name: String,
        /// Underlying receipt error.
        #[source]
        source: ReceiptError,
    },

    /// The prefix lock could not be taken.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Reading or writing a receipt failed.
    #[error(transparent)]
    Receipt(#[from] ReceiptError),

    /// The run was cancelled and rolled back.
    #[error("{name}: cancelled during {phase}; changes were rolled back")]
    Cancelled {
        /// Package name.
        name: String,
        /// Phase the run was in when cancellation was observed.
        phase: InstallPhase,
    },

    /// The pipeline attempted an illegal phase transition.
    #[error(transparent)]
    Phase(#[from] IllegalTransition),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

impl InstallerError {
    /// Return the process exit code for this failure class.
    ///
    /// # Examples
    ///
    /// ```
    /// use keg::error::{EXIT_PARSE, InstallerError};
    /// use keg::manifest::ManifestError;
    ///
    /// let err = InstallerError::from(ManifestError::EmptyInstall);
    /// assert_eq!(err.exit_code(), EXIT_PARSE);
    /// ```
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Manifest(_) => EXIT_PARSE,
            Self::Fetch { .. } => EXIT_NETWORK,
            Self::DigestMismatch { .. } => EXIT_DIGEST_MISMATCH,
            Self::Extraction { .. } => EXIT_EXTRACTION,
            Self::Install { .. } | Self::Record { .. } | Self::Lock(_) | Self::Receipt(_) => {
                EXIT_INSTALL
            }
            Self::Cancelled { .. } => EXIT_CANCELLED,
            Self::Config(_) | Self::Phase(_) | Self::Io(_) | Self::WriteFailed { .. } => {
                EXIT_FAILURE
            }
        }
    }
}

/// Convenience result alias for keg operations.
pub type Result<T> = std::result::Result<T, InstallerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::DigestAlgorithm;
    use rstest::rstest;

    fn digest(bytes: &[u8]) -> ArtefactDigest {
        ArtefactDigest::compute(DigestAlgorithm::Sha256, bytes)
    }

    #[rstest]
    #[case::parse(InstallerError::Manifest(ManifestError::EmptyInstall), EXIT_PARSE)]
    #[case::network(
        InstallerError::Fetch {
            name: "hurl".to_owned(),
            source: FetchError::NotFound { url: "https://example.test".to_owned() },
        },
        EXIT_NETWORK
    )]
    #[case::mismatch(
        InstallerError::DigestMismatch {
            name: "hurl".to_owned(),
            expected: digest(b""),
            actual: digest(b"x"),
        },
        EXIT_DIGEST_MISMATCH
    )]
    #[case::extraction(
        InstallerError::Extraction {
            name: "hurl".to_owned(),
            source: ExtractionError::EmptyArchive,
        },
        EXIT_EXTRACTION
    )]
    #[case::install(
        InstallerError::Install {
            name: "hurl".to_owned(),
            source: InstallError::MissingSource { step: 2, path: "man/hurl.1".into() },
        },
        EXIT_INSTALL
    )]
    #[case::record(
        InstallerError::Record {
            name: "hurl".to_owned(),
            source: ReceiptError::NotInstalled { name: "hurl".to_owned() },
        },
        EXIT_INSTALL
    )]
    #[case::cancelled(
        InstallerError::Cancelled { name: "hurl".to_owned(), phase: InstallPhase::Installing },
        EXIT_CANCELLED
    )]
    #[case::config(InstallerError::Config(ConfigError::NoPrefix), EXIT_FAILURE)]
    fn every_class_has_its_exit_code(#[case] err: InstallerError, #[case] expected: i32) {
        assert_eq!(err.exit_code(), expected);
    }

    #[test]
    fn install_errors_name_package_and_step() {
        let err = InstallerError::Install {
            name: "hurl".to_owned(),
            source: InstallError::MissingSource {
                step: 2,
                path: "man/hurl.1".into(),
            },
        };
        let message = err.to_string();
        assert!(message.contains("hurl"));
        assert!(message.contains("step 3"));
        assert!(message.contains("rolled back"));
    }

    #[test]
    fn record_errors_name_the_package() {
        let err = InstallerError::Record {
            name: "hurl".to_owned(),
            source: ReceiptError::Write {
                path: "/opt/keg/var/keg/receipts/hurl.json".into(),
                source: std::io::Error::other("disk full"),
            },
        };
        let message = err.to_string();
        assert!(message.starts_with("hurl: failed to record install"), "{message}");
        assert!(message.contains("disk full"));
        assert!(message.contains("rolled back"));
    }
}
