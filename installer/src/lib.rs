//! keg installer library.
//!
//! This crate installs prebuilt release artefacts described by manifests:
//! it fetches an archive, verifies its digest, unpacks it into a private
//! staging directory and copies the listed files into a prefix, undoing
//! every step when one fails. It is used by the `keg` CLI binary and can be
//! consumed programmatically for testing or custom installation workflows.
//!
//! # Modules
//!
//! - [`artefact`] - Retrieval, digest verification and archive extraction
//! - [`cancel`] - Cooperative cancellation and the SIGINT hook
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Layered settings from file and environment
//! - [`error`] - Error roll-up and process exit codes
//! - [`install`] - Journalled install steps with rollback
//! - [`layout`] - Destination directories inside a prefix
//! - [`list_output`] - Output formatting for package listing
//! - [`lock`] - Exclusive per-prefix lock
//! - [`manifest`] - Manifest model and parser
//! - [`output`] - Progress, result and dry-run text
//! - [`phase`] - Install phase state machine
//! - [`pipeline`] - End-to-end install orchestration
//! - [`receipt`] - Persisted records of installed packages
//! - [`smoke_test`] - Post-install binary check
//! - [`uninstall`] - Receipt-driven package removal

pub mod artefact;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod install;
pub mod layout;
pub mod list_output;
pub mod lock;
pub mod manifest;
pub mod output;
pub mod phase;
pub mod pipeline;
pub mod receipt;
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
pub mod uninstall;
