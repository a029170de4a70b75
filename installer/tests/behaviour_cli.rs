//! End-to-end CLI behaviour tests for `keg`.
//!
//! These scenarios invoke the binary against `file://` artefacts in a
//! scratch directory and check exit codes and the resulting prefix.

mod support;

use camino::Utf8PathBuf;
use keg::test_utils::{executable, file, manifest_toml, shell_script, tar_gz};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::process::Output;
use support::{Sandbox, exit_code, stderr};

const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const HURL_STEPS: &[(&str, &str)] = &[("bin/hurl", "bin"), ("man/man1/hurl.1", "man1")];

// ---------------------------------------------------------------------------
// World types
// ---------------------------------------------------------------------------

struct CliWorld {
    sandbox: Sandbox,
    manifest: Option<Utf8PathBuf>,
    output: Option<Output>,
    first_install: Option<Vec<String>>,
}

#[fixture]
fn world() -> CliWorld {
    CliWorld {
        sandbox: Sandbox::new(),
        manifest: None,
        output: None,
        first_install: None,
    }
}

impl CliWorld {
    fn manifest(&self) -> &str {
        self.manifest.as_ref().expect("manifest written").as_str()
    }

    fn output(&self) -> &Output {
        self.output.as_ref().expect("keg has run")
    }

    fn run(&mut self, args: &[&str]) {
        self.output = Some(self.sandbox.keg(args));
    }
}

fn hurl_archive() -> Vec<u8> {
    let script = shell_script("hurl 4.0.0", 0);
    tar_gz(&[
        executable("hurl-4.0.0/bin/hurl", &script),
        file("hurl-4.0.0/man/man1/hurl.1", b".TH HURL 1\n"),
    ])
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("a hurl manifest declaring the digest of empty input")]
fn given_stub_digest(world: &mut CliWorld) {
    let manifest = world
        .sandbox
        .manifest("hurl", &hurl_archive(), Some(EMPTY_SHA256), HURL_STEPS);
    world.manifest = Some(manifest);
}

#[given("a hurl manifest with a binary and a man page")]
fn given_hurl_manifest(world: &mut CliWorld) {
    let manifest = world.sandbox.manifest("hurl", &hurl_archive(), None, HURL_STEPS);
    world.manifest = Some(manifest);
}

#[given("the manifest now installs only the binary")]
fn given_binary_only(world: &mut CliWorld) {
    let manifest = world
        .sandbox
        .manifest("hurl", &hurl_archive(), None, &[("bin/hurl", "bin")]);
    world.manifest = Some(manifest);
}

#[given("a five-step manifest whose third source is missing")]
fn given_missing_third_source(world: &mut CliWorld) {
    let archive = tar_gz(&[
        file("pkg/one", b"1"),
        file("pkg/two", b"2"),
        file("pkg/four", b"4"),
        file("pkg/five", b"5"),
    ]);
    let steps = [
        ("one", "man1"),
        ("two", "man2"),
        ("three", "man3"),
        ("four", "man4"),
        ("five", "man5"),
    ];
    world.manifest = Some(world.sandbox.manifest("pkg", &archive, None, &steps));
}

#[given("an archive with an extra entry \"{entry}\"")]
fn given_extra_entry(world: &mut CliWorld, entry: String) {
    let archive = tar_gz(&[file("pkg/readme", b"ok"), file(&entry, b"evil")]);
    let manifest = world
        .sandbox
        .manifest("pkg", &archive, None, &[("readme", "man1")]);
    world.manifest = Some(manifest);
}

#[given("a manifest with no url")]
fn given_manifest_without_url(world: &mut CliWorld) {
    let raw = format!(
        "name = \"broken\"\nsha256 = \"{EMPTY_SHA256}\"\n\n[[install]]\nsource = \"x\"\ncategory = \"bin\"\n"
    );
    world.manifest = Some(world.sandbox.write_manifest("broken", &raw));
}

#[given("a manifest pointing at a missing artefact")]
fn given_missing_artefact(world: &mut CliWorld) {
    let url = format!("file://{}/gone.tar.gz", world.sandbox.work());
    let raw = manifest_toml("gone", &url, EMPTY_SHA256, &[("gone", "bin")]);
    world.manifest = Some(world.sandbox.write_manifest("gone", &raw));
}

#[given("keg has installed the manifest")]
fn given_installed(world: &mut CliWorld) {
    let manifest = world.manifest().to_owned();
    let output = world.sandbox.keg(&["install", &manifest]);
    assert_eq!(exit_code(&output), 0, "{}", stderr(&output));
    world.first_install = Some(world.sandbox.prefix_tree());
}

#[given("keg has installed the manifest without a smoke test")]
fn given_installed_without_smoke_test(world: &mut CliWorld) {
    let manifest = world.manifest().to_owned();
    let output = world.sandbox.keg(&["install", "--skip-test", &manifest]);
    assert_eq!(exit_code(&output), 0, "{}", stderr(&output));
}

#[when("keg installs the manifest")]
fn when_install(world: &mut CliWorld) {
    let manifest = world.manifest().to_owned();
    world.run(&["install", &manifest]);
}

#[when("keg dry-runs the manifest")]
fn when_dry_run(world: &mut CliWorld) {
    let manifest = world.manifest().to_owned();
    world.run(&["install", "--dry-run", &manifest]);
}

#[when("keg lists packages as JSON")]
fn when_list_json(world: &mut CliWorld) {
    world.run(&["list", "--json"]);
}

#[when("keg lists packages")]
fn when_list(world: &mut CliWorld) {
    world.run(&["list"]);
}

#[when("keg uninstalls \"{name}\"")]
fn when_uninstall(world: &mut CliWorld, name: String) {
    world.run(&["uninstall", &name]);
}

#[then("keg exits with code {code:i32}")]
fn then_exit_code(world: &mut CliWorld, code: i32) {
    let output = world.output();
    assert_eq!(exit_code(output), code, "{}", stderr(output));
}

#[then("stderr mentions \"{text}\"")]
fn then_stderr_mentions(world: &mut CliWorld, text: String) {
    let message = stderr(world.output());
    assert!(message.contains(&text), "{message}");
}

#[then("stdout mentions \"{text}\"")]
fn then_stdout_mentions(world: &mut CliWorld, text: String) {
    let stdout = String::from_utf8_lossy(&world.output().stdout).into_owned();
    assert!(stdout.contains(&text), "{stdout}");
}

#[then("the prefix does not exist")]
fn then_prefix_absent(world: &mut CliWorld) {
    assert!(
        !world.sandbox.prefix().exists(),
        "{:?}",
        world.sandbox.prefix_tree()
    );
}

#[then("the prefix is empty")]
fn then_prefix_empty(world: &mut CliWorld) {
    assert!(
        world.sandbox.prefix_tree().is_empty(),
        "{:?}",
        world.sandbox.prefix_tree()
    );
}

#[then("the prefix holds exactly \"{files}\"")]
fn then_prefix_holds(world: &mut CliWorld, files: String) {
    let expected: Vec<String> = files.split(", ").map(str::to_owned).collect();
    assert_eq!(world.sandbox.prefix_files(), expected);
}

#[then("the prefix is unchanged since the first install")]
fn then_prefix_unchanged(world: &mut CliWorld) {
    let first = world.first_install.as_ref().expect("first install recorded");
    assert_eq!(&world.sandbox.prefix_tree(), first);
}

#[then("the JSON listing names only \"{name}\"")]
fn then_listing_names(world: &mut CliWorld, name: String) {
    let json: serde_json::Value =
        serde_json::from_slice(&world.output().stdout).expect("list output is JSON");
    let names: Vec<&str> = json
        .as_array()
        .expect("array of packages")
        .iter()
        .filter_map(|package| package.get("name").and_then(|n| n.as_str()))
        .collect();
    assert_eq!(names, vec![name.as_str()]);
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/cli.feature",
    name = "A stub digest is rejected and the prefix is left alone"
)]
fn scenario_stub_digest_rejected(world: CliWorld) {
    let _ = world;
}

#[cfg(unix)]
#[scenario(
    path = "tests/features/cli.feature",
    name = "A binary and a man page are installed"
)]
fn scenario_binary_and_man_page(world: CliWorld) {
    let _ = world;
}

#[cfg(unix)]
#[scenario(
    path = "tests/features/cli.feature",
    name = "Installing twice yields the same files"
)]
fn scenario_install_twice(world: CliWorld) {
    let _ = world;
}

#[cfg(unix)]
#[scenario(
    path = "tests/features/cli.feature",
    name = "Reinstalling without a step removes the dropped file"
)]
fn scenario_reinstall_drops_file(world: CliWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "A failure at the third step leaves no effects"
)]
fn scenario_third_step_failure(world: CliWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "An archive entry climbing out through a parent directory is rejected"
)]
fn scenario_parent_dir_entry(world: CliWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "A nested archive entry climbing out is rejected"
)]
fn scenario_nested_parent_entry(world: CliWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "An absolute archive entry is rejected"
)]
fn scenario_absolute_entry(world: CliWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "A manifest without a url is a parse error"
)]
fn scenario_manifest_without_url(world: CliWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "A missing artefact is a network error"
)]
fn scenario_missing_artefact(world: CliWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "A dry run touches nothing"
)]
fn scenario_dry_run(world: CliWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "Installed packages can be listed and uninstalled"
)]
fn scenario_list_and_uninstall(world: CliWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "Uninstalling an unknown package fails"
)]
fn scenario_uninstall_unknown(world: CliWorld) {
    let _ = world;
}
