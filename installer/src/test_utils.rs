//! Shared test utilities for the installer crate.
//!
//! Archive builders write entry names straight into tar headers so tests
//! can produce the hostile archives (absolute paths, `..`, escaping links)
//! that `tar::Builder` refuses to create.

use camino::Utf8PathBuf;
use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};

/// One entry in a synthetic tar archive.
#[derive(Debug, Clone, Copy)]
pub enum TarEntry<'a> {
    /// Regular file with contents and permission bits.
    File {
        /// Entry path, written verbatim.
        path: &'a str,
        /// File contents.
        contents: &'a [u8],
        /// Permission bits.
        mode: u32,
    },
    /// Directory.
    Dir {
        /// Entry path, written verbatim.
        path: &'a str,
    },
    /// Symbolic link.
    Symlink {
        /// Entry path, written verbatim.
        path: &'a str,
        /// Link target, written verbatim.
        target: &'a str,
    },
}

/// Shorthand for a regular file entry with mode `0o644`.
#[must_use]
pub const fn file<'a>(path: &'a str, contents: &'a [u8]) -> TarEntry<'a> {
    TarEntry::File {
        path,
        contents,
        mode: 0o644,
    }
}

/// Shorthand for an executable file entry with mode `0o755`.
#[must_use]
pub const fn executable<'a>(path: &'a str, contents: &'a [u8]) -> TarEntry<'a> {
    TarEntry::File {
        path,
        contents,
        mode: 0o755,
    }
}

fn write_raw(slot: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    assert!(bytes.len() < slot.len(), "entry name too long: {value}");
    for (dst, src) in slot.iter_mut().zip(bytes) {
        *dst = *src;
    }
}

/// Build an uncompressed tar archive from `entries`.
///
/// # Panics
///
/// Panics if an entry name exceeds the header field or the archive cannot
/// be written.
#[must_use]
pub fn tar_archive(entries: &[TarEntry<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        let (path, data): (&str, &[u8]) = match *entry {
            TarEntry::File {
                path,
                contents,
                mode,
            } => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(mode);
                (path, contents)
            }
            TarEntry::Dir { path } => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                (path, &[])
            }
            TarEntry::Symlink { path, target } => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_mode(0o777);
                write_raw(&mut header.as_old_mut().linkname, target);
                (path, &[])
            }
        };
        write_raw(&mut header.as_old_mut().name, path);
        header.set_size(data.len() as u64);
        header.set_cksum();
        builder.append(&header, data).expect("append tar entry");
    }
    builder.into_inner().expect("finish tar")
}

/// Build a gzip-compressed tar archive from `entries`.
///
/// # Panics
///
/// Panics if compression fails.
#[must_use]
pub fn tar_gz(entries: &[TarEntry<'_>]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&tar_archive(entries))
        .expect("gzip tar");
    encoder.finish().expect("finish gzip")
}

/// Build a zstd-compressed tar archive from `entries`.
///
/// # Panics
///
/// Panics if compression fails.
#[must_use]
pub fn tar_zst(entries: &[TarEntry<'_>]) -> Vec<u8> {
    zstd::encode_all(tar_archive(entries).as_slice(), 0).expect("zstd tar")
}

/// Build a zip archive of regular files given as `(path, contents, mode)`.
///
/// # Panics
///
/// Panics if the archive cannot be written.
#[must_use]
pub fn zip_archive(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (path, contents, mode) in entries {
        let options = zip::write::SimpleFileOptions::default().unix_permissions(*mode);
        writer.start_file(*path, options).expect("start zip entry");
        writer.write_all(contents).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Return the lowercase SHA-256 hex digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Shell script that prints `output` and exits with `code`.
#[must_use]
pub fn shell_script(output: &str, code: i32) -> Vec<u8> {
    format!("#!/bin/sh\necho '{output}'\nexit {code}\n").into_bytes()
}

/// Render a TOML manifest installing `steps` given as `(source, category)`.
#[must_use]
pub fn manifest_toml(name: &str, url: &str, sha256: &str, steps: &[(&str, &str)]) -> String {
    let mut raw = format!(
        "name = \"{name}\"\nversion = \"1.0.0\"\nurl = \"{url}\"\nsha256 = \"{sha256}\"\n"
    );
    for (source, category) in steps {
        raw.push_str(&format!(
            "\n[[install]]\nsource = \"{source}\"\ncategory = \"{category}\"\n"
        ));
    }
    raw
}

/// Create a temporary directory and return it with its UTF-8 path.
///
/// # Panics
///
/// Panics if the directory cannot be created or its path is not UTF-8.
#[must_use]
pub fn utf8_temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 temp path");
    (dir, path)
}

/// Write `contents` to `name` inside `dir` and return its `file://` URL.
///
/// # Panics
///
/// Panics if the file cannot be written.
#[must_use]
pub fn write_artefact(dir: &camino::Utf8Path, name: &str, contents: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write artefact");
    format!("file://{path}")
}
