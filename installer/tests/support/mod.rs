//! Test support utilities for keg integration tests.
//!
//! Each [`Sandbox`] owns a scratch directory holding the prefix, the
//! artefacts and manifests, and an empty config file so runs never see the
//! user's settings.

use camino::{Utf8Path, Utf8PathBuf};
use keg::test_utils::{manifest_toml, sha256_hex, utf8_temp_dir, write_artefact};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Isolated prefix plus a work area for artefacts and manifests.
pub struct Sandbox {
    _temp: TempDir,
    root: Utf8PathBuf,
}

impl Sandbox {
    /// Create an empty sandbox.
    pub fn new() -> Self {
        let (temp, root) = utf8_temp_dir();
        std::fs::create_dir_all(root.join("work")).expect("create work dir");
        std::fs::write(root.join("work/config.toml"), "max_attempts = 1\n")
            .expect("write config");
        Self { _temp: temp, root }
    }

    /// Install prefix used by every run.
    pub fn prefix(&self) -> Utf8PathBuf {
        self.root.join("prefix")
    }

    /// Scratch directory for artefacts and manifests.
    pub fn work(&self) -> Utf8PathBuf {
        self.root.join("work")
    }

    /// Write `archive` as an artefact and a manifest installing `steps` from
    /// it, declaring `sha256` (the archive's real digest when `None`).
    pub fn manifest(
        &self,
        name: &str,
        archive: &[u8],
        sha256: Option<&str>,
        steps: &[(&str, &str)],
    ) -> Utf8PathBuf {
        let url = write_artefact(&self.work(), &format!("{name}.tar.gz"), archive);
        let digest = sha256.map_or_else(|| sha256_hex(archive), str::to_owned);
        self.write_manifest(name, &manifest_toml(name, &url, &digest, steps))
    }

    /// Write raw manifest text to `<name>.toml`.
    pub fn write_manifest(&self, name: &str, raw: &str) -> Utf8PathBuf {
        let path = self.work().join(format!("{name}.toml"));
        std::fs::write(&path, raw).expect("write manifest");
        path
    }

    /// Run the `keg` binary against this sandbox's prefix and config.
    pub fn keg(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_keg"))
            .arg("--prefix")
            .arg(self.prefix().as_str())
            .arg("--config")
            .arg(self.work().join("config.toml").as_str())
            .args(args)
            .env_remove("KEG_PREFIX")
            .env_remove("KEG_MAX_ATTEMPTS")
            .env_remove("RUST_LOG")
            .output()
            .expect("run keg")
    }

    /// Relative paths of every file and directory in the prefix, sorted.
    pub fn prefix_tree(&self) -> Vec<String> {
        let mut out = Vec::new();
        walk(&self.prefix(), &self.prefix(), &mut out);
        out.sort();
        out
    }

    /// Relative paths of regular files in the prefix.
    pub fn prefix_files(&self) -> Vec<String> {
        self.prefix_tree()
            .into_iter()
            .filter(|path| self.prefix().join(path).is_file())
            .collect()
    }
}

fn walk(root: &Utf8Path, dir: &Utf8Path, out: &mut Vec<String>) {
    let Ok(entries) = dir.read_dir_utf8() else {
        return;
    };
    for entry in entries {
        let path = entry.expect("dir entry").into_path();
        out.push(path.strip_prefix(root).expect("under root").to_string());
        if path.is_dir() {
            walk(root, &path, out);
        }
    }
}

/// Return the process exit code, panicking when killed by a signal.
pub fn exit_code(output: &Output) -> i32 {
    output.status.code().expect("exited normally")
}

/// Return stderr as text.
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
