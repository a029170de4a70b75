//! Package manifest model and parser.
//!
//! # Sub-modules
//!
//! - [`digest`] - Declared and computed digests (`ArtefactDigest`).
//! - [`error`] - Manifest validation errors.
//! - [`model`] - Immutable manifest types (`Manifest`, `InstallStep`).
//! - [`parser`] - TOML/JSON deserialization and validation.
//! - [`version`] - Version derivation from release URLs.

pub mod digest;
pub mod error;
pub mod model;
pub mod parser;
pub mod version;

pub use digest::{ArtefactDigest, DigestAlgorithm};
pub use error::ManifestError;
pub use model::{DestinationCategory, InstallStep, Manifest, Shell, SmokeTest};
pub use parser::{parse, parse_file};
