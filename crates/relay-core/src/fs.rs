//! Filesystem capability consumed by the pipeline.
//!
//! The pipeline never calls `std::fs` directly — every path-taking
//! operation goes through the [`FileSystem`] trait, so tests can swap in a
//! double and the "same filesystem device" invariant has exactly one real
//! implementation to get right. [`StdFileSystem`] is that implementation;
//! it is Linux-only, matching the daemon's platform restriction (the
//! same-device invariant relies on POSIX rename semantics and `st_dev`).

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(PathBuf),
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl FsError {
    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            FsError::NotFound(path.to_path_buf())
        } else {
            FsError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}

/// A snapshot of the metadata fields the pipeline actually needs.
#[derive(Debug, Clone, Copy)]
pub struct Metadata {
    pub size: u64,
    pub modified: SystemTime,
    pub is_file: bool,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub dev: u64,
}

/// A directory entry with its metadata already fetched, so callers doing a
/// full-directory gather (scanner, purger, uploader) don't pay for a
/// second syscall per file.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub path: PathBuf,
    pub metadata: Metadata,
}

pub trait FileSystem: Send + Sync {
    /// Metadata following symlinks.
    fn stat(&self, path: &Path) -> Result<Metadata, FsError>;
    /// Metadata without following the final symlink component.
    fn lstat(&self, path: &Path) -> Result<Metadata, FsError>;
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    /// Non-recursive listing of direct children.
    fn listdir(&self, path: &Path) -> Result<Vec<PathBuf>, FsError>;
    /// Non-recursive listing of direct children with metadata prefetched.
    fn scandir(&self, path: &Path) -> Result<Vec<DirEntry>, FsError>;
    fn mkdir(&self, path: &Path, parents: bool, exist_ok: bool) -> Result<(), FsError>;
    /// Resolve to an absolute, symlink-free path. When `strict` is true,
    /// the path must exist or this returns `FsError::NotFound`. When
    /// false, the longest existing ancestor is canonicalized and any
    /// non-existent trailing components are appended verbatim.
    fn resolve(&self, path: &Path, strict: bool) -> Result<PathBuf, FsError>;
    /// Rename-class move: atomic if `src` and `dst` share a device,
    /// overwrites an existing `dst`.
    fn move_file(&self, src: &Path, dst: &Path) -> Result<(), FsError>;
    fn unlink(&self, path: &Path, missing_ok: bool) -> Result<(), FsError>;
    fn device_id(&self, path: &Path) -> Result<u64, FsError>;
    /// Total capacity in bytes of the filesystem containing `path`.
    fn disk_capacity(&self, path: &Path) -> Result<u64, FsError>;
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl StdFileSystem {
    fn to_metadata(meta: &std::fs::Metadata) -> Metadata {
        Metadata {
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            is_file: meta.is_file(),
            is_dir: meta.is_dir(),
            is_symlink: meta.file_type().is_symlink(),
            dev: meta.dev(),
        }
    }
}

impl FileSystem for StdFileSystem {
    fn stat(&self, path: &Path) -> Result<Metadata, FsError> {
        std::fs::metadata(path)
            .map(|m| Self::to_metadata(&m))
            .map_err(|e| FsError::io(path, e))
    }

    fn lstat(&self, path: &Path) -> Result<Metadata, FsError> {
        std::fs::symlink_metadata(path)
            .map(|m| Self::to_metadata(&m))
            .map_err(|e| FsError::io(path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn listdir(&self, path: &Path) -> Result<Vec<PathBuf>, FsError> {
        let entries = std::fs::read_dir(path).map_err(|e| FsError::io(path, e))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsError::io(path, e))?;
            out.push(entry.path());
        }
        Ok(out)
    }

    fn scandir(&self, path: &Path) -> Result<Vec<DirEntry>, FsError> {
        let entries = std::fs::read_dir(path).map_err(|e| FsError::io(path, e))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsError::io(path, e))?;
            let entry_path = entry.path();
            let meta = match entry.metadata() {
                Ok(m) => Self::to_metadata(&m),
                Err(e) => {
                    crate::log_fs_warn!("failed to stat directory entry, skipping", path = %entry_path.display(), error = %e);
                    continue;
                }
            };
            out.push(DirEntry {
                path: entry_path,
                metadata: meta,
            });
        }
        Ok(out)
    }

    fn mkdir(&self, path: &Path, parents: bool, exist_ok: bool) -> Result<(), FsError> {
        let result = if parents {
            std::fs::create_dir_all(path)
        } else {
            std::fs::create_dir(path)
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && exist_ok => Ok(()),
            Err(e) => Err(FsError::io(path, e)),
        }
    }

    fn resolve(&self, path: &Path, strict: bool) -> Result<PathBuf, FsError> {
        if strict {
            return std::fs::canonicalize(path).map_err(|e| FsError::io(path, e));
        }

        // Walk up until we find an existing ancestor, canonicalize that,
        // then reattach the non-existent tail verbatim.
        let mut existing = path;
        let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
        loop {
            if existing.exists() {
                break;
            }
            match (existing.file_name(), existing.parent()) {
                (Some(name), Some(parent)) => {
                    tail.push(name);
                    existing = parent;
                }
                _ => break,
            }
        }

        let mut resolved = if existing.as_os_str().is_empty() {
            std::env::current_dir().map_err(|e| FsError::io(path, e))?
        } else {
            std::fs::canonicalize(existing).map_err(|e| FsError::io(existing, e))?
        };

        for component in tail.into_iter().rev() {
            resolved.push(component);
        }
        Ok(resolved)
    }

    fn move_file(&self, src: &Path, dst: &Path) -> Result<(), FsError> {
        std::fs::rename(src, dst).map_err(|e| FsError::io(src, e))
    }

    fn unlink(&self, path: &Path, missing_ok: bool) -> Result<(), FsError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if missing_ok && e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FsError::io(path, e)),
        }
    }

    fn device_id(&self, path: &Path) -> Result<u64, FsError> {
        Ok(self.stat(path)?.dev)
    }

    fn disk_capacity(&self, path: &Path) -> Result<u64, FsError> {
        let stats = nix::sys::statvfs::statvfs(path).map_err(|errno| {
            FsError::Io {
                path: path.to_path_buf(),
                source: io::Error::from(errno),
            }
        })?;
        Ok(stats.blocks() as u64 * stats.fragment_size())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        std::fs::read(path).map_err(|e| FsError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolve_strict_fails_on_missing_path() {
        let fs = StdFileSystem;
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.pcap");
        assert!(matches!(
            fs.resolve(&missing, true),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn resolve_non_strict_appends_missing_tail() {
        let fs = StdFileSystem;
        let dir = tempdir().unwrap();
        let missing = dir.path().join("new_subdir").join("file.pcap");
        let resolved = fs.resolve(&missing, false).unwrap();
        assert!(resolved.ends_with("new_subdir/file.pcap"));
    }

    #[test]
    fn move_file_is_rename_based_and_overwrites() {
        let fs = StdFileSystem;
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.pcap");
        let dst = dir.path().join("b.pcap");
        std::fs::write(&src, b"new content").unwrap();
        std::fs::write(&dst, b"stale content").unwrap();

        fs.move_file(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"new content");
    }

    #[test]
    fn unlink_missing_ok_swallows_not_found() {
        let fs = StdFileSystem;
        let dir = tempdir().unwrap();
        let missing = dir.path().join("ghost.pcap");
        assert!(fs.unlink(&missing, true).is_ok());
        assert!(fs.unlink(&missing, false).is_err());
    }

    #[test]
    fn scandir_prefetches_metadata() {
        let fs = StdFileSystem;
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.pcap"), b"12345").unwrap();
        let entries = fs.scandir(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].metadata.size, 5);
    }

    #[test]
    fn device_id_matches_for_paths_on_same_filesystem() {
        let fs = StdFileSystem;
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        assert_eq!(
            fs.device_id(dir.path()).unwrap(),
            fs.device_id(&sub).unwrap()
        );
    }
}
