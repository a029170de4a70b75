//! Declared and computed artefact digests.
//!
//! A digest pairs an algorithm with its hex encoding. Hex is validated for
//! length and alphabet at construction and stored lowercase, so comparison
//! against a computed digest is case-insensitive by construction.

use super::error::{ManifestError, Result};
use sha2::{Digest as _, Sha256, Sha512};
use std::fmt;

/// Hash algorithms a manifest may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-256, declared with the `sha256` key.
    Sha256,
    /// SHA-512, declared with the `sha512` key.
    Sha512,
}

impl DigestAlgorithm {
    /// Return the manifest key naming this algorithm.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Return the expected length of the hex encoding.
    #[must_use]
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A validated digest: algorithm plus lowercase hex.
///
/// # Examples
///
/// ```
/// use keg::manifest::digest::{ArtefactDigest, DigestAlgorithm};
///
/// let declared = ArtefactDigest::new(DigestAlgorithm::Sha256, &"AB".repeat(32))
///     .expect("valid digest");
/// assert_eq!(declared.hex(), "ab".repeat(32));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ArtefactDigest {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl ArtefactDigest {
    /// Validate `hex` for `algorithm` and build a digest.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidDigest`] when the value has the wrong
    /// length or contains non-hex characters.
    pub fn new(algorithm: DigestAlgorithm, hex: &str) -> Result<Self> {
        let trimmed = hex.trim();
        if trimmed.len() != algorithm.hex_len() {
            return Err(ManifestError::InvalidDigest {
                algorithm: algorithm.key(),
                reason: format!(
                    "expected {} hex characters, got {}",
                    algorithm.hex_len(),
                    trimmed.len()
                ),
            });
        }
        if let Some(bad) = trimmed.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(ManifestError::InvalidDigest {
                algorithm: algorithm.key(),
                reason: format!("non-hex character '{bad}'"),
            });
        }
        Ok(Self {
            algorithm,
            hex: trimmed.to_ascii_lowercase(),
        })
    }

    /// Hash `bytes` with `algorithm`.
    #[must_use]
    pub fn compute(algorithm: DigestAlgorithm, bytes: &[u8]) -> Self {
        let hex = match algorithm {
            DigestAlgorithm::Sha256 => format!("{:x}", Sha256::digest(bytes)),
            DigestAlgorithm::Sha512 => format!("{:x}", Sha512::digest(bytes)),
        };
        Self { algorithm, hex }
    }

    /// Return the algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Return the lowercase hex encoding.
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Return whether `other` is the same algorithm with the same value.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && self.hex.eq_ignore_ascii_case(&other.hex)
    }
}

impl fmt::Display for ArtefactDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}
