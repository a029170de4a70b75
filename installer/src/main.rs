//! keg CLI entrypoint.
//!
//! This binary installs, lists and removes packages described by manifests.
//! Every failure class maps to its own exit code; see
//! [`keg::error::InstallerError::exit_code`].

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use keg::artefact::{ArchiveExtractor, DefaultFetcher};
use keg::cancel::{CancelToken, install_sigint_handler};
use keg::cli::{Cli, Command, InstallArgs, ListArgs, UninstallArgs};
use keg::config::Config;
use keg::error::{InstallerError, Result};
use keg::layout::InstallLayout;
use keg::list_output::{format_human, format_json};
use keg::manifest::parse_file;
use keg::output::{DryRunPlan, smoke_test_line, success_message, write_stderr_line};
use keg::pipeline::{InstallOptions, Pipeline};
use keg::receipt::read_all;
use keg::uninstall::uninstall;
use log::warn;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Configure `env_logger` from `-q`/`-v`; `RUST_LOG` takes precedence.
fn init_logging(cli: &Cli) {
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_env("RUST_LOG")
        .format_timestamp(None)
        .init();
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(prefix) = &cli.prefix {
        config.prefix = Some(prefix.clone());
    }
    let layout = InstallLayout::new(config.resolve_prefix()?);

    match &cli.command {
        Command::Install(args) => run_install(cli, args, &config, &layout, stderr),
        Command::Uninstall(args) => run_uninstall(cli, args, &layout, stderr),
        Command::List(args) => run_list(args, &layout),
    }
}

fn run_install(
    cli: &Cli,
    args: &InstallArgs,
    config: &Config,
    layout: &InstallLayout,
    stderr: &mut dyn Write,
) -> Result<()> {
    let manifest = parse_file(&args.manifest)?;

    if args.dry_run {
        let plan = DryRunPlan {
            manifest: &manifest,
            layout,
        };
        write_stderr_line(stderr, plan.display_text());
        return Ok(());
    }

    let cancel = CancelToken::new();
    if let Err(err) = install_sigint_handler(&cancel) {
        warn!("interrupts will not roll back cleanly: {err}");
    }

    let fetcher = DefaultFetcher::new(config.download_timeout());
    let extractor = ArchiveExtractor::default();
    let options = InstallOptions {
        retry: config.retry_policy(),
        smoke_test_timeout: config.smoke_test_timeout(),
        skip_test: args.skip_test,
        quiet: cli.quiet,
        base_dir: manifest_dir(&args.manifest),
    };
    let pipeline = Pipeline::new(&fetcher, &extractor, layout, cancel, options);
    let report = pipeline.install(&manifest, stderr)?;

    if let Some(smoke) = &report.smoke_test
        && (!cli.quiet || !smoke.passed())
    {
        write_stderr_line(stderr, smoke_test_line(smoke.binary.as_str(), &smoke.outcome));
    }
    if !cli.quiet {
        write_stderr_line(
            stderr,
            success_message(
                &report.name,
                &report.version,
                report.files.len(),
                layout.prefix(),
            ),
        );
    }
    Ok(())
}

fn run_uninstall(
    cli: &Cli,
    args: &UninstallArgs,
    layout: &InstallLayout,
    stderr: &mut dyn Write,
) -> Result<()> {
    let report = uninstall(&args.name, layout)?;
    if !cli.quiet {
        write_stderr_line(
            stderr,
            format!(
                "Uninstalled {} {} ({} removed, {} already missing)",
                report.name,
                report.version,
                report.removed.len(),
                report.missing.len()
            ),
        );
    }
    Ok(())
}

fn run_list(args: &ListArgs, layout: &InstallLayout) -> Result<()> {
    let receipts = read_all(layout)?;
    let output = if args.json {
        format_json(&receipts)
    } else {
        format_human(&receipts)
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{output}").map_err(|source| InstallerError::WriteFailed { source })
}

/// Directory relative artefact paths in the manifest resolve against.
fn manifest_dir(manifest: &Utf8Path) -> Option<Utf8PathBuf> {
    let parent = manifest.parent()?;
    if parent.as_str().is_empty() {
        return Utf8PathBuf::try_from(std::env::current_dir().ok()?).ok();
    }
    if parent.is_absolute() {
        return Some(parent.to_owned());
    }
    let cwd = Utf8PathBuf::try_from(std::env::current_dir().ok()?).ok()?;
    Some(cwd.join(parent))
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            err.exit_code()
        }
    }
}
