//! Content fingerprint of a tool checkout that cannot be proven clean.
//!
//! The fingerprint is a SHA-256 over the base revision and, for every file in
//! sorted order, its relative path and content hash. Identical trees always
//! produce identical fingerprints regardless of timestamps.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Top-level entries skipped when walking a checkout without git.
pub const UNVERSIONED_SKIP: &[&str] = &[".git", "build"];

/// Fingerprint `files` (relative to `root`) on top of `revision`.
pub fn fingerprint_files(root: &Path, revision: &str, files: &[PathBuf]) -> Result<String> {
    let mut sorted: Vec<&PathBuf> = files.iter().collect();
    sorted.sort();
    sorted.dedup();

    let mut hasher = Sha256::new();
    hasher.update(revision.as_bytes());
    hasher.update(b"\0");
    for relative in sorted {
        let Some(entry) = entry_digest(&root.join(relative))? else {
            continue;
        };
        hasher.update(path_bytes(relative));
        hasher.update(b"\0");
        hasher.update(entry.as_bytes());
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Every regular file and symlink under `root`, relative to it.
pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() != 1
                || !UNVERSIONED_SKIP
                    .iter()
                    .any(|skip| entry.file_name() == std::ffi::OsStr::new(skip))
        });
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("relativize {}", entry.path().display()))?;
        files.push(relative.to_path_buf());
    }
    files.sort();
    Ok(files)
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

/// `/`-joined so the key matches what git reports.
#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    let parts: Vec<String> = path
        .components()
        .map(|part| part.as_os_str().to_string_lossy().into_owned())
        .collect();
    Cow::Owned(parts.join("/").into_bytes())
}

/// Digest for one entry; `None` for directories (e.g. submodules).
fn entry_digest(path: &Path) -> Result<Option<String>> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Some("deleted".to_string())),
        Err(err) => return Err(err).with_context(|| format!("stat {}", path.display())),
    };
    if meta.is_dir() {
        return Ok(None);
    }
    if meta.file_type().is_symlink() {
        let target =
            fs::read_link(path).with_context(|| format!("read link {}", path.display()))?;
        return Ok(Some(format!("link:{}", target.to_string_lossy())));
    }
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).with_context(|| format!("hash {}", path.display()))?;
    Ok(Some(hex::encode(hasher.finalize())))
}
