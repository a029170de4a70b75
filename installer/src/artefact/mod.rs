//! Artefact retrieval, integrity verification, and extraction.
//!
//! The stages run strictly in order: bytes come from a
//! [`download::ArtefactFetcher`], become a
//! [`verification::VerifiedArtefact`] only when their digest matches the
//! manifest, and only then may be unpacked into a
//! [`extraction::StagedArtifact`].
//!
//! # Sub-modules
//!
//! - [`download`] - Fetcher trait, HTTP/file implementation, retry policy.
//! - [`extraction`] - Archive extraction with path traversal protection.
//! - [`verification`] - Digest verification of fetched bytes.

pub mod download;
pub mod extraction;
pub mod verification;

pub use download::{ArtefactFetcher, DefaultFetcher, FetchError, RetryPolicy};
pub use extraction::{ArchiveExtractor, ArtefactExtractor, ExtractionError, StagedArtifact};
pub use verification::{VerifiedArtefact, VerifyError, fetch_and_verify, verify};
