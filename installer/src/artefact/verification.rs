//! Integrity verification for fetched artefacts.
//!
//! The only way to obtain a [`VerifiedArtefact`] is through [`verify`] (or
//! [`fetch_and_verify`]), so extraction can only ever see bytes whose digest
//! matched the manifest. Bytes that fail verification are dropped inside
//! this module.

use super::download::{ArtefactFetcher, FetchError, RetryPolicy, fetch_with_retry};
use crate::cancel::CancelToken;
use crate::manifest::ArtefactDigest;
use log::{debug, info};

/// Errors from fetching and verifying an artefact.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The artefact could not be retrieved.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The computed digest differs from the declared one.
    #[error("digest mismatch: manifest declares {expected}, artefact is {actual}")]
    DigestMismatch {
        /// The declared digest.
        expected: ArtefactDigest,
        /// The digest of the retrieved bytes.
        actual: ArtefactDigest,
    },
}

/// Artefact bytes whose digest matched the manifest.
#[derive(Debug)]
pub struct VerifiedArtefact {
    bytes: Vec<u8>,
    digest: ArtefactDigest,
}

impl VerifiedArtefact {
    /// Return the verified bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Return the digest the bytes were verified against.
    #[must_use]
    pub const fn digest(&self) -> &ArtefactDigest {
        &self.digest
    }
}

/// Check `bytes` against `expected`.
///
/// # Errors
///
/// Returns [`VerifyError::DigestMismatch`] and drops the bytes when the
/// digests differ.
///
/// # Examples
///
/// ```
/// use keg::artefact::verification::verify;
/// use keg::manifest::{ArtefactDigest, DigestAlgorithm};
///
/// let expected = ArtefactDigest::compute(DigestAlgorithm::Sha256, b"release");
/// let verified = verify(b"release".to_vec(), &expected).expect("digest matches");
/// assert_eq!(verified.bytes(), b"release");
/// assert!(verify(b"tampered".to_vec(), &expected).is_err());
/// ```
pub fn verify(bytes: Vec<u8>, expected: &ArtefactDigest) -> Result<VerifiedArtefact, VerifyError> {
    let actual = ArtefactDigest::compute(expected.algorithm(), &bytes);
    if !expected.matches(&actual) {
        drop(bytes);
        return Err(VerifyError::DigestMismatch {
            expected: expected.clone(),
            actual,
        });
    }
    debug!("verified {} bytes against {expected}", bytes.len());
    Ok(VerifiedArtefact {
        bytes,
        digest: actual,
    })
}

/// Fetch the artefact at `url` with retries and verify it.
///
/// # Errors
///
/// Returns [`VerifyError::Fetch`] when retrieval fails permanently or the
/// retry budget is exhausted, and [`VerifyError::DigestMismatch`] when the
/// content does not match. A mismatch is never retried. Cancellation through
/// `cancel` surfaces as [`FetchError::Cancelled`].
pub fn fetch_and_verify(
    fetcher: &dyn ArtefactFetcher,
    url: &str,
    expected: &ArtefactDigest,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> Result<VerifiedArtefact, VerifyError> {
    info!("fetching {url}");
    let bytes = fetch_with_retry(fetcher, url, policy, cancel)?;
    verify(bytes, expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artefact::download::MockArtefactFetcher;
    use crate::manifest::DigestAlgorithm;
    use std::time::Duration;

    const STUB_DIGEST: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn stub_digest_does_not_match_real_content() {
        let expected =
            ArtefactDigest::new(DigestAlgorithm::Sha256, STUB_DIGEST).expect("valid digest");
        let result = verify(b"hurl release tarball".to_vec(), &expected);
        match result {
            Err(VerifyError::DigestMismatch { expected, actual }) => {
                assert_eq!(expected.hex(), STUB_DIGEST);
                assert_ne!(actual.hex(), STUB_DIGEST);
            }
            other => panic!("expected DigestMismatch, got {other:?}"),
        }
    }

    #[test]
    fn mismatch_is_not_retried() {
        let mut fetcher = MockArtefactFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(b"wrong".to_vec()));
        let expected = ArtefactDigest::compute(DigestAlgorithm::Sha512, b"right");

        let result = fetch_and_verify(
            &fetcher,
            "https://example.test/a.tar.gz",
            &expected,
            &RetryPolicy::new(3, Duration::ZERO),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(VerifyError::DigestMismatch { .. })));
    }

    #[test]
    fn fetch_errors_pass_through() {
        let mut fetcher = MockArtefactFetcher::new();
        fetcher.expect_fetch().returning(|url| {
            Err(FetchError::NotFound {
                url: url.to_owned(),
            })
        });
        let expected = ArtefactDigest::compute(DigestAlgorithm::Sha256, b"");

        let result = fetch_and_verify(
            &fetcher,
            "https://example.test/a.tar.gz",
            &expected,
            &RetryPolicy::default(),
            &CancelToken::new(),
        );
        assert!(matches!(
            result,
            Err(VerifyError::Fetch(FetchError::NotFound { .. }))
        ));
    }
}
