//! CLI argument definitions for keg.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Install prebuilt release artefacts described by manifests.
#[derive(Parser, Debug)]
#[command(name = "keg")]
#[command(version, about)]
#[command(long_about = concat!(
    "Install prebuilt release artefacts described by manifests.\n\n",
    "A manifest names a release archive, its SHA-256 digest, and the files to ",
    "copy out of it. keg downloads the archive, refuses it unless the digest ",
    "matches, unpacks it into a private staging directory, and copies each ",
    "listed file into the prefix. A failed step undoes every earlier step.",
))]
#[command(after_help = concat!(
    "EXIT CODES:\n",
    "  0    success\n",
    "  1    configuration or other failure\n",
    "  2    manifest could not be parsed\n",
    "  3    artefact could not be downloaded\n",
    "  4    artefact digest did not match\n",
    "  5    artefact could not be unpacked\n",
    "  6    install step, lock, or receipt failure\n",
    "  130  interrupted\n\n",
    "EXAMPLES:\n",
    "  Install a package:\n",
    "    $ keg install hurl.toml\n\n",
    "  Preview an install without touching the prefix:\n",
    "    $ keg install --dry-run hurl.toml\n\n",
    "  Install into a custom prefix:\n",
    "    $ keg --prefix /opt/keg install hurl.toml\n\n",
    "  List installed packages as JSON:\n",
    "    $ keg list --json\n\n",
    "  Remove a package:\n",
    "    $ keg uninstall hurl",
))]
pub struct Cli {
    /// Installation prefix [default: $KEG_PREFIX, config, or platform data dir].
    #[arg(long, global = true, value_name = "DIR")]
    pub prefix: Option<Utf8PathBuf>,

    /// Configuration file [default: platform config dir/keg/config.toml].
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Install the package described by a manifest.
    Install(InstallArgs),

    /// Remove an installed package.
    Uninstall(UninstallArgs),

    /// List installed packages.
    List(ListArgs),
}

/// Arguments for the install command.
#[derive(Parser, Debug, Clone, Default)]
pub struct InstallArgs {
    /// Manifest file (TOML, or JSON with a `.json` extension).
    #[arg(value_name = "MANIFEST")]
    pub manifest: Utf8PathBuf,

    /// Show the planned install and exit without downloading.
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the post-install smoke test.
    #[arg(long)]
    pub skip_test: bool,
}

/// Arguments for the uninstall command.
#[derive(Parser, Debug, Clone)]
pub struct UninstallArgs {
    /// Name of the installed package.
    #[arg(value_name = "NAME")]
    pub name: String,
}

/// Arguments for the list command.
#[derive(Parser, Debug, Clone, Default)]
pub struct ListArgs {
    /// Output in JSON format for scripting.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Return the log level filter implied by `-q` and `-v`.
    ///
    /// Warnings are shown by default; `-q` limits output to errors and each
    /// `-v` enables one more level.
    ///
    /// # Examples
    ///
    /// ```
    /// use clap::Parser;
    /// use keg::cli::Cli;
    /// use log::LevelFilter;
    ///
    /// let cli = Cli::parse_from(["keg", "-vv", "list"]);
    /// assert_eq!(cli.log_level(), LevelFilter::Debug);
    /// ```
    #[must_use]
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbosity {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
