//! Unit tests for archive extraction.

use super::*;
use crate::test_utils::{TarEntry, executable, file, tar_archive, tar_gz, tar_zst, zip_archive};
use rstest::rstest;

#[rstest]
#[case::gzip(tar_gz(&[file("hello.txt", b"hello")]))]
#[case::zstd(tar_zst(&[file("hello.txt", b"hello")]))]
#[case::plain(tar_archive(&[file("hello.txt", b"hello")]))]
#[case::zip(zip_archive(&[("hello.txt", b"hello".as_slice(), 0o644)]))]
fn extracts_every_supported_format(#[case] bytes: Vec<u8>) {
    let staged = extract_bytes(&bytes).expect("extract");
    assert_eq!(staged.file_count(), 1);
    let path = staged
        .resolve(Utf8Path::new("hello.txt"))
        .expect("file staged");
    assert_eq!(std::fs::read(path).expect("read"), b"hello");
}

#[test]
fn single_top_level_directory_becomes_root() {
    let bytes = tar_gz(&[
        TarEntry::Dir {
            path: "hurl-0.1.0/",
        },
        executable("hurl-0.1.0/hurl", b"#!/bin/sh\n"),
        file("hurl-0.1.0/man/hurl.1", b".TH HURL 1"),
    ]);
    let staged = extract_bytes(&bytes).expect("extract");
    assert_eq!(staged.root().file_name(), Some("hurl-0.1.0"));
    assert!(staged.resolve(Utf8Path::new("hurl")).is_some());
    assert!(staged.resolve(Utf8Path::new("man/hurl.1")).is_some());
}

#[test]
fn several_top_level_entries_keep_staging_root() {
    let bytes = tar_gz(&[file("a", b"a"), file("b", b"b")]);
    let staged = extract_bytes(&bytes).expect("extract");
    assert!(staged.resolve(Utf8Path::new("a")).is_some());
    assert!(staged.resolve(Utf8Path::new("b")).is_some());
}

#[cfg(unix)]
#[test]
fn preserves_executable_mode() {
    use std::os::unix::fs::PermissionsExt;

    let bytes = tar_gz(&[executable("tool", b"#!/bin/sh\n")]);
    let staged = extract_bytes(&bytes).expect("extract");
    let path = staged.resolve(Utf8Path::new("tool")).expect("staged");
    let mode = std::fs::metadata(path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o111, 0o111);
}

#[rstest]
#[case::parent_dir("../escape.txt")]
#[case::nested_parent("foo/../../escape.txt")]
#[case::absolute("/etc/passwd")]
fn rejects_traversing_tar_entries(#[case] bad_path: &str) {
    let bytes = tar_gz(&[file("ok.txt", b"ok"), file(bad_path, b"evil")]);
    let result = extract_bytes(&bytes);
    assert!(
        matches!(result, Err(ExtractionError::PathTraversal { .. })),
        "expected PathTraversal for {bad_path}"
    );
}

#[test]
fn rejects_traversing_zip_entries() {
    let bytes = zip_archive(&[("../escape.txt", b"evil".as_slice(), 0o644)]);
    let result = extract_bytes(&bytes);
    assert!(matches!(result, Err(ExtractionError::PathTraversal { .. })));
}

#[rstest]
#[case::absolute("/etc/passwd")]
#[case::climbing("../../outside")]
#[case::nested_climb("bin/../../outside")]
fn rejects_escaping_symlinks(#[case] target: &str) {
    let bytes = tar_gz(&[
        file("real", b"data"),
        TarEntry::Symlink {
            path: "link",
            target,
        },
    ]);
    let result = extract_bytes(&bytes);
    assert!(
        matches!(result, Err(ExtractionError::LinkEscape { .. })),
        "expected LinkEscape for {target}"
    );
}

#[cfg(unix)]
#[test]
fn rejects_entries_written_through_earlier_links() {
    let bytes = tar_gz(&[
        file("pkg/real", b"data"),
        TarEntry::Symlink {
            path: "pkg/up",
            target: "..",
        },
        TarEntry::Symlink {
            path: "pkg/up/esc",
            target: "../..",
        },
    ]);
    let result = extract_bytes(&bytes);
    assert!(
        matches!(
            &result,
            Err(ExtractionError::ThroughLink { path, link })
                if path == "pkg/up/esc" && link == "pkg/up"
        ),
        "{result:?}"
    );
}

#[cfg(unix)]
#[test]
fn rejects_links_that_escape_through_sibling_links() {
    // Each target looks contained on its own; together they reach `/`.
    let bytes = tar_gz(&[
        file("pkg/real", b"data"),
        TarEntry::Symlink {
            path: "pkg/sub",
            target: "..",
        },
        TarEntry::Symlink {
            path: "pkg/hop",
            target: "sub/../..",
        },
    ]);
    let result = extract_bytes(&bytes);
    assert!(
        matches!(&result, Err(ExtractionError::LinkEscape { path, .. }) if path == "pkg/hop"),
        "{result:?}"
    );
}

#[cfg(unix)]
#[test]
fn accepts_internal_symlinks() {
    let bytes = tar_gz(&[
        file("pkg/bin/tool-1.0", b"data"),
        TarEntry::Symlink {
            path: "pkg/bin/tool",
            target: "tool-1.0",
        },
    ]);
    let staged = extract_bytes(&bytes).expect("extract");
    assert!(staged.resolve(Utf8Path::new("bin/tool")).is_some());
}

#[test]
fn empty_archive_is_rejected() {
    let bytes = tar_gz(&[TarEntry::Dir { path: "only-dir/" }]);
    assert!(matches!(
        extract_bytes(&bytes),
        Err(ExtractionError::EmptyArchive)
    ));
}

#[test]
fn unknown_format_is_rejected() {
    assert!(matches!(
        extract_bytes(b"not an archive at all"),
        Err(ExtractionError::UnknownFormat)
    ));
}

#[test]
fn resolve_rejects_missing_and_directories() {
    let bytes = tar_gz(&[file("pkg/a", b"a"), file("pkg/sub/b", b"b")]);
    let staged = extract_bytes(&bytes).expect("extract");
    assert!(staged.resolve(Utf8Path::new("missing")).is_none());
    assert!(staged.resolve(Utf8Path::new("sub")).is_none());
}

#[test]
fn staging_directory_is_removed_on_drop() {
    let bytes = tar_gz(&[file("a", b"a"), file("b", b"b")]);
    let staged = extract_bytes(&bytes).expect("extract");
    let root = staged.root().to_owned();
    assert!(root.exists());
    drop(staged);
    assert!(!root.exists());
}

#[test]
fn extractor_stages_under_configured_parent() {
    let parent = tempfile::tempdir().expect("temp dir");
    let bytes = tar_gz(&[file("a", b"a"), file("b", b"b")]);
    let expected = crate::manifest::ArtefactDigest::compute(
        crate::manifest::DigestAlgorithm::Sha256,
        &bytes,
    );
    let verified = crate::artefact::verification::verify(bytes, &expected).expect("verified");
    let staged = ArchiveExtractor::in_dir(parent.path())
        .extract(&verified)
        .expect("extract");
    assert!(staged.root().as_std_path().starts_with(parent.path()));
}

#[rstest]
#[case::gzip(&[0x1f, 0x8b, 0x08, 0x00], Some(ArchiveFormat::TarGz))]
#[case::zstd(&[0x28, 0xb5, 0x2f, 0xfd], Some(ArchiveFormat::TarZst))]
#[case::zip(b"PK\x03\x04rest", Some(ArchiveFormat::Zip))]
#[case::short(&[0x00], None)]
fn detects_format_from_magic(#[case] bytes: &[u8], #[case] expected: Option<ArchiveFormat>) {
    assert_eq!(ArchiveFormat::detect(bytes), expected);
}
