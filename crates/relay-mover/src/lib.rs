//! Relocates files from `source_dir` (or wherever the scanner/tailer found
//! them) into `worker_dir`.

use std::path::PathBuf;
use std::time::Duration;

use relay_core::queue::BoundedReceiver;
use relay_core::{log_mover_warn, resolve_destination, FileSystem, ShutdownFlag};

/// Attempt to relocate a single file into `worker_dir`. Returns `true` if
/// the file was moved (or was already gone, which counts as success),
/// `false` if the item was dropped after a non-fatal per-item failure.
pub fn move_one(fs: &dyn FileSystem, source: &std::path::Path, worker_dir: &std::path::Path) -> bool {
    let meta = match fs.lstat(source) {
        Ok(m) => m,
        Err(e) if e.is_not_found() => {
            log_mover_warn!("source vanished before move", path = %source.display(), error = %e);
            return false;
        }
        Err(e) => {
            log_mover_warn!("failed to lstat source", path = %source.display(), error = %e);
            return false;
        }
    };

    if !meta.is_file || meta.is_symlink {
        log_mover_warn!("source is not a regular file, dropping", path = %source.display());
        return false;
    }

    let resolved_src = match fs.resolve(source, true) {
        Ok(p) => p,
        Err(e) => {
            log_mover_warn!("failed to resolve source strictly, dropping", path = %source.display(), error = %e);
            return false;
        }
    };

    let Some(file_name) = resolved_src.file_name() else {
        log_mover_warn!("source has no file name component, dropping", path = %source.display());
        return false;
    };

    let destination = match resolve_destination(fs, worker_dir, file_name) {
        Ok(d) => d,
        Err(e) => {
            log_mover_warn!("destination collision unresolved, dropping", path = %source.display(), error = %e);
            return false;
        }
    };

    match fs.move_file(&resolved_src, &destination) {
        Ok(()) => true,
        Err(e) if e.is_not_found() => {
            // Another mover (or the source itself) already relocated it.
            true
        }
        Err(e) => {
            log_mover_warn!("move failed, dropping item", path = %source.display(), destination = %destination.display(), error = %e);
            false
        }
    }
}

/// Drain `queue` and relocate each path into `worker_dir` until shutdown.
pub async fn run(
    fs: &dyn FileSystem,
    mut queue: BoundedReceiver<PathBuf>,
    worker_dir: PathBuf,
    shutdown: ShutdownFlag,
    poll_interval: Duration,
) {
    loop {
        if shutdown.is_set() {
            return;
        }
        match queue.get_timeout(poll_interval).await {
            Some(path) => {
                move_one(fs, &path, &worker_dir);
            }
            None => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::StdFileSystem;
    use tempfile::tempdir;

    #[test]
    fn successful_move_preserves_content_and_removes_source() {
        let dir = tempdir().unwrap();
        let source_dir = dir.path().join("source");
        let worker_dir = dir.path().join("worker");
        std::fs::create_dir_all(&source_dir).unwrap();
        std::fs::create_dir_all(&worker_dir).unwrap();
        let source = source_dir.join("a.pcap");
        std::fs::write(&source, b"original bytes").unwrap();

        let fs = StdFileSystem;
        assert!(move_one(&fs, &source, &worker_dir));

        assert!(!source.exists());
        let dest = worker_dir.join("a.pcap");
        assert_eq!(std::fs::read(&dest).unwrap(), b"original bytes");
    }

    #[test]
    fn collision_is_resolved_with_numbered_suffix() {
        let dir = tempdir().unwrap();
        let source_dir = dir.path().join("source");
        let worker_dir = dir.path().join("worker");
        std::fs::create_dir_all(&source_dir).unwrap();
        std::fs::create_dir_all(&worker_dir).unwrap();
        std::fs::write(worker_dir.join("a.pcap"), b"existing, 5 b").unwrap();
        let source = source_dir.join("a.pcap");
        std::fs::write(&source, b"new content, ten").unwrap();

        let fs = StdFileSystem;
        assert!(move_one(&fs, &source, &worker_dir));

        assert!(worker_dir.join("a.pcap").exists());
        assert!(worker_dir.join("a-1.pcap").exists());
        assert_eq!(
            std::fs::read(worker_dir.join("a-1.pcap")).unwrap(),
            b"new content, ten"
        );
    }

    #[test]
    fn missing_source_is_dropped_without_panicking() {
        let dir = tempdir().unwrap();
        let worker_dir = dir.path().join("worker");
        std::fs::create_dir_all(&worker_dir).unwrap();
        let missing = dir.path().join("ghost.pcap");

        let fs = StdFileSystem;
        assert!(!move_one(&fs, &missing, &worker_dir));
    }

    #[test]
    fn directory_source_is_dropped() {
        let dir = tempdir().unwrap();
        let worker_dir = dir.path().join("worker");
        std::fs::create_dir_all(&worker_dir).unwrap();
        let a_dir = dir.path().join("a_directory.pcap");
        std::fs::create_dir_all(&a_dir).unwrap();

        let fs = StdFileSystem;
        assert!(!move_one(&fs, &a_dir, &worker_dir));
    }
}
