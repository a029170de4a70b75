//! Manifest deserialization and validation.
//!
//! Manifests are TOML by default and JSON when the file name ends in
//! `.json`. Both formats share one raw serde schema; validation into the
//! immutable [`Manifest`] happens in a second pass so each failure can name
//! the manifest key or install step responsible.

use super::digest::{ArtefactDigest, DigestAlgorithm};
use super::error::{ManifestError, Result};
use super::model::{
    DependencyKind, DestinationCategory, InstallStep, Manifest, PackageInfo, SmokeTest,
};
use super::version::version_from_url;
use camino::Utf8Path;
use log::debug;
use serde::Deserialize;
use serde::de::{MapAccess, Visitor};
use std::fmt;

/// Arguments used for the smoke test when the manifest declares none.
pub const DEFAULT_TEST_ARGS: &[&str] = &["--version"];

/// Serialization formats accepted for manifest files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    /// TOML document.
    Toml,
    /// JSON document.
    Json,
}

impl ManifestFormat {
    /// Choose the format from a file extension; anything but `.json` is TOML.
    #[must_use]
    pub fn for_path(path: &Utf8Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    name: Option<String>,
    version: Option<String>,
    desc: Option<String>,
    homepage: Option<String>,
    url: Option<String>,
    sha256: Option<String>,
    sha512: Option<String>,
    #[serde(default)]
    license: RawLicense,
    #[serde(default)]
    depends_on: RawDependencies,
    #[serde(default)]
    install: Vec<RawStep>,
    test: Option<RawTest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum RawLicense {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    source: String,
    category: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTest {
    binary: Option<String>,
    args: Option<Vec<String>>,
}

/// `depends_on` entries in the order the deserializer yields them.
#[derive(Debug, Default)]
struct RawDependencies(Vec<(String, String)>);

impl<'de> Deserialize<'de> for RawDependencies {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawDependencies;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table mapping dependency names to \"build\" or \"run\"")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some(entry) = map.next_entry::<String, String>()? {
                    entries.push(entry);
                }
                Ok(RawDependencies(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Parse a TOML manifest.
///
/// # Errors
///
/// Returns a [`ManifestError`] when the document is malformed, a required
/// field (`name`, `url`, `sha256`/`sha512`) is missing, or any value fails
/// validation.
///
/// # Examples
///
/// ```
/// use keg::manifest::parser::parse;
///
/// let manifest = parse(r#"
/// name = "hurl"
/// url = "https://example.test/hurl-0.1.0-x86_64-apple-darwin.tar.gz"
/// sha256 = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
///
/// [[install]]
/// source = "hurl"
/// category = "bin"
/// "#).expect("valid manifest");
/// assert_eq!(manifest.version(), "0.1.0");
/// ```
pub fn parse(raw: &str) -> Result<Manifest> {
    parse_as(raw, ManifestFormat::Toml)
}

/// Parse a manifest in an explicit format.
///
/// # Errors
///
/// See [`parse`].
pub fn parse_as(raw: &str, format: ManifestFormat) -> Result<Manifest> {
    let raw_manifest: RawManifest = match format {
        ManifestFormat::Toml => toml::from_str(raw)?,
        ManifestFormat::Json => serde_json::from_str(raw)?,
    };
    validate(raw_manifest)
}

/// Read and parse the manifest at `path`, choosing the format from its
/// extension.
///
/// # Errors
///
/// Returns [`ManifestError::Read`] when the file cannot be read, otherwise
/// see [`parse`].
pub fn parse_file(path: &Utf8Path) -> Result<Manifest> {
    let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_owned(),
        source,
    })?;
    let format = ManifestFormat::for_path(path);
    debug!("parsing {format:?} manifest {path}");
    parse_as(&raw, format)
}

fn validate(raw: RawManifest) -> Result<Manifest> {
    let name = required(raw.name, "name")?;
    validate_name(&name)?;

    let source_url = required(raw.url, "url")?;
    validate_url(&source_url)?;

    let digest = match (raw.sha256, raw.sha512) {
        (Some(_), Some(_)) => return Err(ManifestError::ConflictingDigests),
        (Some(hex), None) => ArtefactDigest::new(DigestAlgorithm::Sha256, &hex)?,
        (None, Some(hex)) => ArtefactDigest::new(DigestAlgorithm::Sha512, &hex)?,
        (None, None) => return Err(ManifestError::MissingField { field: "sha256" }),
    };

    let version = match non_blank(raw.version) {
        Some(version) => version,
        None => version_from_url(&source_url).ok_or_else(|| {
            ManifestError::UndeterminedVersion {
                url: source_url.clone(),
            }
        })?,
    };

    let (build_dependencies, run_dependencies) = split_dependencies(raw.depends_on)?;
    let info = PackageInfo {
        desc: non_blank(raw.desc),
        homepage: non_blank(raw.homepage),
        license: licenses(raw.license),
        build_dependencies,
        run_dependencies,
    };

    let install_steps = install_steps(raw.install)?;
    let smoke_test = smoke_test(raw.test, &install_steps)?;

    Ok(Manifest {
        name,
        version,
        source_url,
        digest,
        info,
        install_steps,
        smoke_test,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, field: &'static str) -> Result<String> {
    non_blank(value).ok_or(ManifestError::MissingField { field })
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| ManifestError::InvalidName {
        value: name.to_owned(),
        reason: reason.to_owned(),
    };
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | '@'))
    {
        return Err(invalid("only ASCII letters, digits and -_.+@ are allowed"));
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let invalid = |reason: &str| ManifestError::InvalidUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };
    if url.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }
    if let Some((scheme, rest)) = url.split_once("://") {
        if !matches!(scheme, "http" | "https" | "file") {
            return Err(invalid("scheme must be http, https or file"));
        }
        if rest.is_empty() {
            return Err(invalid("has no location after the scheme"));
        }
    }
    Ok(())
}

fn licenses(raw: RawLicense) -> Vec<String> {
    let declared = match raw {
        RawLicense::None => Vec::new(),
        RawLicense::One(license) => vec![license],
        RawLicense::Many(licenses) => licenses,
    };
    let mut unique: Vec<String> = Vec::with_capacity(declared.len());
    for license in declared {
        let trimmed = license.trim();
        if !trimmed.is_empty() && !unique.iter().any(|seen| seen == trimmed) {
            unique.push(trimmed.to_owned());
        }
    }
    unique
}

fn dependency_kind(name: &str, kind: &str) -> Result<DependencyKind> {
    match kind.trim().trim_start_matches(':') {
        "build" => Ok(DependencyKind::Build),
        "run" => Ok(DependencyKind::Run),
        _ => Err(ManifestError::InvalidDependencyKind {
            name: name.to_owned(),
            kind: kind.to_owned(),
        }),
    }
}

fn split_dependencies(raw: RawDependencies) -> Result<(Vec<String>, Vec<String>)> {
    let mut build = Vec::new();
    let mut run = Vec::new();
    for (name, kind) in raw.0 {
        match dependency_kind(&name, &kind)? {
            DependencyKind::Build => build.push(name),
            DependencyKind::Run => run.push(name),
        }
    }
    Ok((build, run))
}

fn install_steps(raw: Vec<RawStep>) -> Result<Vec<InstallStep>> {
    if raw.is_empty() {
        return Err(ManifestError::EmptyInstall);
    }
    raw.into_iter()
        .enumerate()
        .map(|(index, step)| {
            let category: DestinationCategory = step
                .category
                .parse()
                .map_err(|reason| ManifestError::InvalidStep { index, reason })?;
            InstallStep::new(index, step.source, category, non_blank(step.name))
        })
        .collect()
}

/// Resolve the smoke test: the named binary, else the first `bin` step.
/// Manifests that install no binary have no smoke test.
fn smoke_test(raw: Option<RawTest>, steps: &[InstallStep]) -> Result<Option<SmokeTest>> {
    let (binary, args) = match raw {
        Some(test) => (non_blank(test.binary), test.args),
        None => (None, None),
    };
    let mut binaries = steps
        .iter()
        .filter(|step| step.category() == DestinationCategory::Binary)
        .map(InstallStep::destination_name);

    let resolved = match binary {
        Some(requested) => {
            if !binaries.any(|name| name == requested) {
                return Err(ManifestError::UnknownTestBinary { binary: requested });
            }
            Some(requested)
        }
        None => binaries.next().map(str::to_owned),
    };

    Ok(resolved.map(|binary| SmokeTest {
        binary,
        args: args.unwrap_or_else(|| DEFAULT_TEST_ARGS.iter().map(|&a| a.to_owned()).collect()),
    }))
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
