//! Install pipeline orchestration.
//!
//! Drives one manifest through `Pending -> Verifying -> Extracting ->
//! Installing -> Installed`, holding the prefix lock for the whole run.
//! Any failure or cancellation ends in `RolledBack` with the prefix left as
//! it was found.

use crate::artefact::{
    ArtefactExtractor, ArtefactFetcher, FetchError, RetryPolicy, VerifyError, fetch_and_verify,
};
use crate::cancel::CancelToken;
use crate::error::{InstallerError, Result};
use crate::install::{self, InstallError, InstallTransaction, InstalledFile};
use crate::layout::InstallLayout;
use crate::lock::PrefixLock;
use crate::manifest::{DestinationCategory, Manifest};
use crate::output::write_stderr_line;
use crate::phase::{InstallPhase, PhaseTracker};
use crate::receipt::{InstallReceipt, ReceiptError, read_receipt, write_receipt};
use crate::smoke_test::{
    DEFAULT_SMOKE_TEST_TIMEOUT, SmokeTestError, SmokeTestOutcome, run_smoke_test,
};
use crate::uninstall::prune_empty_dirs;
use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use std::io::Write;
use std::time::Duration;

/// Settings for one install run.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Retry policy for the artefact download.
    pub retry: RetryPolicy,
    /// Time the smoke test may run.
    pub smoke_test_timeout: Duration,
    /// Skip the post-install smoke test.
    pub skip_test: bool,
    /// Suppress progress output.
    pub quiet: bool,
    /// Directory relative local artefact paths resolve against, usually the
    /// manifest's directory.
    pub base_dir: Option<Utf8PathBuf>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            smoke_test_timeout: DEFAULT_SMOKE_TEST_TIMEOUT,
            skip_test: false,
            quiet: false,
            base_dir: None,
        }
    }
}

/// Result of the post-install smoke test.
#[derive(Debug)]
pub struct SmokeTestReport {
    /// Installed binary that was run.
    pub binary: Utf8PathBuf,
    /// Exit code, or why none was obtained.
    pub outcome: std::result::Result<SmokeTestOutcome, SmokeTestError>,
}

impl SmokeTestReport {
    /// Return whether the binary exited with status zero.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome.as_ref().is_ok_and(SmokeTestOutcome::passed)
    }
}

/// Outcome of a successful install.
#[derive(Debug)]
pub struct InstallReport {
    /// Package name.
    pub name: String,
    /// Installed version.
    pub version: String,
    /// Files placed, in step order.
    pub files: Vec<InstalledFile>,
    /// Final phase; always [`InstallPhase::Installed`] for a returned report.
    pub phase: InstallPhase,
    /// Path of the written receipt.
    pub receipt: Utf8PathBuf,
    /// Smoke test result, when one ran.
    pub smoke_test: Option<SmokeTestReport>,
}

impl InstallReport {
    /// Return whether a smoke test ran and failed.
    #[must_use]
    pub fn test_failed(&self) -> bool {
        self.smoke_test.as_ref().is_some_and(|report| !report.passed())
    }
}

/// Installs manifests into one layout using injected fetcher and extractor.
pub struct Pipeline<'a> {
    fetcher: &'a dyn ArtefactFetcher,
    extractor: &'a dyn ArtefactExtractor,
    layout: &'a InstallLayout,
    cancel: CancelToken,
    options: InstallOptions,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline.
    #[must_use]
    pub fn new(
        fetcher: &'a dyn ArtefactFetcher,
        extractor: &'a dyn ArtefactExtractor,
        layout: &'a InstallLayout,
        cancel: CancelToken,
        options: InstallOptions,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            layout,
            cancel,
            options,
        }
    }

    /// Install `manifest`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`InstallerError`]. By then the prefix holds
    /// none of this run's effects. A failing smoke test is not an error; see
    /// [`InstallReport::test_failed`].
    pub fn install(&self, manifest: &Manifest, stderr: &mut dyn Write) -> Result<InstallReport> {
        let mut tracker = PhaseTracker::new();
        let _lock = PrefixLock::acquire(&self.layout.lock_path())?;

        let result = self.run(manifest, &mut tracker, stderr);
        if result.is_err()
            && !tracker.current().is_terminal()
            && let Err(err) = tracker.advance(InstallPhase::RolledBack)
        {
            warn!("{err}");
        }
        result
    }

    fn run(
        &self,
        manifest: &Manifest,
        tracker: &mut PhaseTracker,
        stderr: &mut dyn Write,
    ) -> Result<InstallReport> {
        let name = manifest.name();

        self.enter(tracker, InstallPhase::Verifying, name)?;
        let url = resolve_source_url(manifest.source_url(), self.options.base_dir.as_deref());
        self.progress(stderr, format!("==> Fetching {name} {}", manifest.version()));
        let verified = fetch_and_verify(
            self.fetcher,
            &url,
            manifest.digest(),
            &self.options.retry,
            &self.cancel,
        )
        .map_err(|err| match err {
            VerifyError::Fetch(FetchError::Cancelled { .. }) => InstallerError::Cancelled {
                name: name.to_owned(),
                phase: tracker.current(),
            },
            VerifyError::Fetch(source) => InstallerError::Fetch {
                name: name.to_owned(),
                source,
            },
            VerifyError::DigestMismatch { expected, actual } => {
                InstallerError::DigestMismatch {
                    name: name.to_owned(),
                    expected,
                    actual,
                }
            }
        })?;
        info!("verified {name} ({})", verified.digest());

        self.enter(tracker, InstallPhase::Extracting, name)?;
        let staged =
            self.extractor
                .extract(&verified)
                .map_err(|source| InstallerError::Extraction {
                    name: name.to_owned(),
                    source,
                })?;
        drop(verified);

        self.enter(tracker, InstallPhase::Installing, name)?;
        self.progress(stderr, format!("==> Installing {name} into {}", self.layout.prefix()));
        let quiet = self.options.quiet;
        let mut transaction = install::apply(
            &staged,
            manifest.install_steps(),
            self.layout,
            &self.cancel,
            &mut |file| {
                if !quiet {
                    write_stderr_line(stderr, format!("    {} {}", file.category, file.path));
                }
            },
        )
        .map_err(|source| match source {
            InstallError::Cancelled { .. } => InstallerError::Cancelled {
                name: name.to_owned(),
                phase: InstallPhase::Installing,
            },
            source => InstallerError::Install {
                name: name.to_owned(),
                source,
            },
        })?;
        drop(staged);
        let retired = self.retire_stale_files(name, &mut transaction)?;

        let receipt = InstallReceipt::new(manifest, transaction.files().to_vec());
        let receipt_path = match write_receipt(self.layout, &receipt) {
            Ok(path) => path,
            Err(source) => {
                transaction.rollback();
                return Err(InstallerError::Record {
                    name: name.to_owned(),
                    source,
                });
            }
        };
        let files = transaction.commit();
        for path in &retired {
            if let Some(parent) = path.parent() {
                prune_empty_dirs(parent, self.layout.prefix());
            }
        }
        tracker.advance(InstallPhase::Installed)?;

        let smoke_test = if self.options.skip_test {
            None
        } else {
            self.smoke_test(manifest, stderr)
        };

        Ok(InstallReport {
            name: name.to_owned(),
            version: manifest.version().to_owned(),
            files,
            phase: tracker.current(),
            receipt: receipt_path,
            smoke_test,
        })
    }

    /// Move aside files the previous install of `name` recorded that this
    /// install no longer places. They are deleted when the transaction
    /// commits.
    fn retire_stale_files(
        &self,
        name: &str,
        transaction: &mut InstallTransaction,
    ) -> Result<Vec<Utf8PathBuf>> {
        let previous = match read_receipt(self.layout, name) {
            Ok(receipt) => receipt,
            Err(ReceiptError::NotInstalled { .. }) => return Ok(Vec::new()),
            Err(err) => {
                warn!("not removing stale files of {name}: {err}");
                return Ok(Vec::new());
            }
        };
        let stale: Vec<Utf8PathBuf> = previous
            .files()
            .iter()
            .map(|file| &file.path)
            .filter(|path| !transaction.files().iter().any(|file| &file.path == *path))
            .cloned()
            .collect();

        let mut retired = Vec::with_capacity(stale.len());
        for path in stale {
            if !path.starts_with(self.layout.prefix()) {
                warn!("not removing {path}: outside {}", self.layout.prefix());
                continue;
            }
            let moved = transaction
                .retire(&path)
                .map_err(|source| InstallerError::Install {
                    name: name.to_owned(),
                    source,
                })?;
            if moved {
                info!("removing {path}, no longer part of {name}");
                retired.push(path);
            }
        }
        Ok(retired)
    }

    /// Check for cancellation, then move to `next`.
    fn enter(&self, tracker: &mut PhaseTracker, next: InstallPhase, name: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(InstallerError::Cancelled {
                name: name.to_owned(),
                phase: tracker.current(),
            });
        }
        tracker.advance(next)?;
        Ok(())
    }

    fn smoke_test(&self, manifest: &Manifest, stderr: &mut dyn Write) -> Option<SmokeTestReport> {
        let test = manifest.smoke_test()?;
        let binary = self.layout.dir(DestinationCategory::Binary).join(&test.binary);
        self.progress(stderr, format!("==> Testing {binary} {}", test.args.join(" ")));
        let outcome = run_smoke_test(&binary, &test.args, self.options.smoke_test_timeout);
        match &outcome {
            Ok(result) if result.passed() => {}
            Ok(result) => warn!("smoke test exited with status {}", result.exit_code),
            Err(err) => warn!("smoke test failed: {err}"),
        }
        Some(SmokeTestReport { binary, outcome })
    }

    fn progress(&self, stderr: &mut dyn Write, message: impl std::fmt::Display) {
        if !self.options.quiet {
            write_stderr_line(stderr, message);
        }
    }
}

/// Resolve a relative local artefact location against `base`.
///
/// Remote URLs, absolute paths and `file://` URLs with absolute paths are
/// returned unchanged.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use keg::pipeline::resolve_source_url;
///
/// let base = Some(Utf8Path::new("/srv/manifests"));
/// assert_eq!(resolve_source_url("dist/hurl.tar.gz", base), "/srv/manifests/dist/hurl.tar.gz");
/// assert_eq!(
///     resolve_source_url("file://dist/hurl.tar.gz", base),
///     "file:///srv/manifests/dist/hurl.tar.gz"
/// );
/// assert_eq!(
///     resolve_source_url("https://example.test/hurl.tar.gz", base),
///     "https://example.test/hurl.tar.gz"
/// );
/// ```
#[must_use]
pub fn resolve_source_url(url: &str, base: Option<&Utf8Path>) -> String {
    let Some(base) = base else {
        return url.to_owned();
    };
    match url.split_once("://") {
        Some(("file", path)) if Utf8Path::new(path).is_relative() => {
            format!("file://{}", base.join(path))
        }
        Some(_) => url.to_owned(),
        None if Utf8Path::new(url).is_relative() => base.join(url).into_string(),
        None => url.to_owned(),
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
