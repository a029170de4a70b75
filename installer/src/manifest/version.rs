//! Version derivation from release URLs.
//!
//! Release archives conventionally carry their version in the file name
//! (`hurl-0.1.0-x86_64-apple-darwin.tar.gz`) or in a tag path segment
//! (`/releases/download/v0.1.0/`). The file name wins when both are present.

const ARCHIVE_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tar.zst", ".tar.xz", ".tar.bz2", ".tgz", ".tar", ".zip",
];

/// Derive a version string from a release URL.
///
/// Returns `None` when neither the file name nor any path segment carries a
/// recognisable version token.
///
/// # Examples
///
/// ```
/// use keg::manifest::version::version_from_url;
///
/// let url = "https://github.com/hurl/hurl/releases/download/v0.1.0/hurl-0.1.0-x86_64-apple-darwin.tar.gz";
/// assert_eq!(version_from_url(url).as_deref(), Some("0.1.0"));
/// ```
#[must_use]
pub fn version_from_url(url: &str) -> Option<String> {
    let path = strip_query(url);
    let mut segments = path.rsplit('/').filter(|segment| !segment.is_empty());
    let file_name = segments.next()?;

    let stem = ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix))
        .unwrap_or(file_name);

    stem.split('-')
        .find_map(version_token)
        .or_else(|| segments.find_map(version_token))
}

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url.get(..end).unwrap_or(url)
}

/// Accept `1.2.3`, `v1.2.3` and `1.2.3rc1`; require at least one dot so
/// architecture fragments such as `x86` or `64` are not mistaken for
/// versions.
fn version_token(token: &str) -> Option<String> {
    let candidate = token.strip_prefix('v').unwrap_or(token);
    let starts_with_digit = candidate.chars().next().is_some_and(|c| c.is_ascii_digit());
    let well_formed = candidate
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.');
    if starts_with_digit && well_formed && candidate.contains('.') {
        Some(candidate.to_owned())
    } else {
        None
    }
}
