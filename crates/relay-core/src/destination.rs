//! Destination-collision resolution shared by the mover and the uploader.
//!
//! Both components place a file into a directory under its original name,
//! falling back to `{stem}-1{suffix}, {stem}-2{suffix}, ...` up to 100
//! variants when a name is already taken. An OS error while probing
//! whether a given variant exists aborts the search immediately — it is
//! treated the same as exhausting all 100 attempts, not retried with the
//! next suffix.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::fs::FileSystem;

const MAX_ATTEMPTS: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum DestinationError {
    #[error("all {0} suffixed destination variants are taken")]
    ExhaustedAttempts(u32),
    #[error("error while probing destination candidate {path}: {source}")]
    ProbeFailed { path: PathBuf, source: crate::fs::FsError },
}

/// Find a free destination path for `file_name` under `dir`.
pub fn resolve_destination(
    fs: &dyn FileSystem,
    dir: &Path,
    file_name: &std::ffi::OsStr,
) -> Result<PathBuf, DestinationError> {
    let candidate = dir.join(file_name);
    if !fs.exists(&candidate) {
        return Ok(candidate);
    }

    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| file_name.to_os_string());
    let suffix = name
        .extension()
        .map(|ext| {
            let mut s = OsString::from(".");
            s.push(ext);
            s
        })
        .unwrap_or_default();

    for n in 1..=MAX_ATTEMPTS {
        let mut variant_name = stem.clone();
        variant_name.push(format!("-{n}"));
        variant_name.push(&suffix);
        let variant_path = dir.join(&variant_name);

        match probe(fs, &variant_path) {
            Ok(true) => continue,
            Ok(false) => return Ok(variant_path),
            Err(source) => {
                return Err(DestinationError::ProbeFailed {
                    path: variant_path,
                    source,
                })
            }
        }
    }

    Err(DestinationError::ExhaustedAttempts(MAX_ATTEMPTS))
}

/// Returns `Ok(true)` if the path exists, `Ok(false)` if it doesn't, or an
/// error if existence itself could not be determined (distinct from a
/// plain "not found").
fn probe(fs: &dyn FileSystem, path: &Path) -> Result<bool, crate::fs::FsError> {
    match fs.lstat(path) {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
