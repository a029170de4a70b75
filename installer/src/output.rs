//! User-facing output for the keg CLI.
//!
//! Progress and results go to stderr through [`write_stderr_line`]; this
//! module only builds the text.

use crate::layout::InstallLayout;
use crate::manifest::Manifest;
use crate::smoke_test::{SmokeTestError, SmokeTestOutcome};
use camino::Utf8Path;
use std::io::Write;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort output; a closed stderr must not fail the run.
    }
}

/// Format a success message after installation.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use keg::output::success_message;
///
/// let msg = success_message("hurl", "0.1.0", 5, Utf8Path::new("/opt/keg"));
/// assert_eq!(msg, "Installed hurl 0.1.0 (5 files) into /opt/keg");
/// ```
#[must_use]
pub fn success_message(name: &str, version: &str, count: usize, prefix: &Utf8Path) -> String {
    let plural = if count == 1 { "file" } else { "files" };
    format!("Installed {name} {version} ({count} {plural}) into {prefix}")
}

/// Describe a smoke test result in one line.
#[must_use]
pub fn smoke_test_line(
    binary: &str,
    result: &Result<SmokeTestOutcome, SmokeTestError>,
) -> String {
    match result {
        Ok(outcome) if outcome.passed() => match &outcome.first_line {
            Some(line) => format!("Smoke test passed: {line}"),
            None => format!("Smoke test passed: {binary} exited 0"),
        },
        Ok(outcome) => format!(
            "warning: smoke test failed: {binary} exited with status {}",
            outcome.exit_code
        ),
        Err(err) => format!("warning: smoke test failed: {err}"),
    }
}

/// Planned install shown by `--dry-run`.
///
/// # Example
///
/// ```
/// use keg::layout::InstallLayout;
/// use keg::output::DryRunPlan;
///
/// let manifest = keg::manifest::parse(concat!(
///     "name = \"hurl\"\n",
///     "url = \"https://example.test/hurl-0.1.0.tar.gz\"\n",
///     "sha256 = \"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\"\n",
///     "[[install]]\nsource = \"hurl\"\ncategory = \"bin\"\n",
/// ))
/// .expect("valid manifest");
/// let layout = InstallLayout::new("/opt/keg");
///
/// let text = DryRunPlan { manifest: &manifest, layout: &layout }.display_text();
/// assert!(text.contains("Dry run"));
/// assert!(text.contains("hurl -> /opt/keg/bin/hurl"));
/// ```
#[derive(Debug)]
pub struct DryRunPlan<'a> {
    /// Parsed manifest.
    pub manifest: &'a Manifest,
    /// Destination layout.
    pub layout: &'a InstallLayout,
}

impl DryRunPlan<'_> {
    /// Format the plan for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let manifest = self.manifest;
        let mut lines = vec![
            "Dry run - no files will be downloaded or modified".to_owned(),
            String::new(),
            format!("Package: {} {}", manifest.name(), manifest.version()),
        ];
        if let Some(desc) = &manifest.info().desc {
            lines.push(format!("Description: {desc}"));
        }
        if !manifest.license().is_empty() {
            lines.push(format!("License: {}", manifest.license().join(", ")));
        }
        if !manifest.build_dependencies().is_empty() {
            lines.push(format!(
                "Build dependencies: {}",
                manifest.build_dependencies().join(", ")
            ));
        }
        lines.push(format!("Source: {}", manifest.source_url()));
        lines.push(format!("Digest: {}", manifest.digest()));
        lines.push(format!("Prefix: {}", self.layout.prefix()));

        lines.push(String::new());
        lines.push("Install steps:".to_owned());
        for (index, step) in manifest.install_steps().iter().enumerate() {
            let dest = self
                .layout
                .dir(step.category())
                .join(step.destination_name());
            lines.push(format!(
                "  {}. [{}] {} -> {dest}",
                index + 1,
                step.category(),
                step.source()
            ));
        }

        if let Some(test) = manifest.smoke_test() {
            lines.push(String::new());
            lines.push(format!("Smoke test: {} {}", test.binary, test.args.join(" ")));
        }

        lines.join("\n")
    }
}
