//! Enforces `target_usage_fraction × total_capacity` across `worker_dir` +
//! `uploaded_dir` by deleting the oldest files first.

use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::{
    fs::DirEntry, log_purger_info, log_purger_warn, FileSystem, GatheredEntryData, ShutdownFlag,
};

#[derive(Debug, thiserror::Error)]
pub enum PurgeError {
    #[error("configured capacity is zero and auto-detected capacity is unusable: {0}")]
    DiskCapacityUnusable(String),
}

/// Resolve the effective capacity: the configured value if non-zero,
/// otherwise auto-detected from the filesystem backing `uploaded_dir`.
/// A configured zero with a non-positive or unreadable detected capacity
/// is a fatal setup error, not a per-cycle retry.
pub fn effective_capacity(
    fs: &dyn FileSystem,
    uploaded_dir: &Path,
    configured_capacity_bytes: u64,
) -> Result<u64, PurgeError> {
    if configured_capacity_bytes > 0 {
        return Ok(configured_capacity_bytes);
    }
    let detected = fs
        .disk_capacity(uploaded_dir)
        .map_err(|e| PurgeError::DiskCapacityUnusable(e.to_string()))?;
    if detected == 0 {
        return Err(PurgeError::DiskCapacityUnusable(
            "detected capacity was zero".to_string(),
        ));
    }
    Ok(detected)
}

pub struct PurgerConfig {
    pub worker_dir: PathBuf,
    pub uploaded_dir: PathBuf,
    pub target_usage_fraction: f64,
    pub check_interval: Duration,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub deleted_from_uploaded: Vec<PathBuf>,
    pub deleted_from_worker: Vec<PathBuf>,
    pub bytes_freed: u64,
}

fn gather_regular_files(entries: Vec<DirEntry>) -> Vec<GatheredEntryData> {
    let mut gathered: Vec<GatheredEntryData> = entries
        .into_iter()
        .filter(|e| e.metadata.is_file)
        .map(|e| GatheredEntryData {
            mtime_wall: e.metadata.modified,
            size: e.metadata.size,
            absolute_path: e.path,
        })
        .collect();
    gathered.sort();
    gathered
}

/// Re-verify and delete one file. A path that is already gone counts as a
/// successful deletion (its bytes are no longer occupying the directory).
fn safe_delete(fs: &dyn FileSystem, path: &Path) -> Result<(), relay_core::FsError> {
    match fs.lstat(path) {
        Ok(meta) if meta.is_file => fs.unlink(path, true),
        Ok(_) => Err(relay_core::FsError::NotAFile(path.to_path_buf())),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Delete oldest-first from `entries` until cumulative freed bytes reaches
/// `target_bytes` or the list is exhausted. Never deletes more than one
/// file past the target.
fn delete_oldest_until(
    fs: &dyn FileSystem,
    entries: &[GatheredEntryData],
    target_bytes: u64,
) -> (Vec<PathBuf>, u64) {
    let mut deleted = Vec::new();
    let mut freed = 0u64;

    for entry in entries {
        if freed >= target_bytes {
            break;
        }
        match safe_delete(fs, &entry.absolute_path) {
            Ok(()) => {
                freed += entry.size;
                deleted.push(entry.absolute_path.clone());
                log_purger_info!(
                    "deleted file to reclaim space",
                    path = %entry.absolute_path.display(),
                    size = entry.size
                );
            }
            Err(e) => {
                log_purger_warn!("failed to delete file, skipping", path = %entry.absolute_path.display(), error = %e);
            }
        }
    }

    (deleted, freed)
}

/// Run one purge cycle: gather both directories, compute the deficit
/// against `target_usage_fraction × capacity`, and delete oldest-first from
/// `uploaded_dir` first, carrying the true remaining deficit (not a naive
/// half-split) into `worker_dir`.
pub fn run_cycle(
    fs: &dyn FileSystem,
    worker_dir: &Path,
    uploaded_dir: &Path,
    capacity_bytes: u64,
    target_usage_fraction: f64,
) -> PurgeReport {
    let uploaded_result = fs.scandir(uploaded_dir);
    let worker_result = fs.scandir(worker_dir);

    if uploaded_result.is_err() && worker_result.is_err() {
        log_purger_warn!("failed to scan both worker_dir and uploaded_dir, aborting cycle");
        return PurgeReport::default();
    }
    if let Err(e) = &uploaded_result {
        log_purger_warn!("failed to scan uploaded_dir, proceeding with worker_dir only", error = %e);
    }
    if let Err(e) = &worker_result {
        log_purger_warn!("failed to scan worker_dir, proceeding with uploaded_dir only", error = %e);
    }

    let uploaded = gather_regular_files(uploaded_result.unwrap_or_default());
    let worker = gather_regular_files(worker_result.unwrap_or_default());

    let used: u64 = uploaded.iter().map(|e| e.size).sum::<u64>() + worker.iter().map(|e| e.size).sum::<u64>();
    let target = (capacity_bytes as f64 * target_usage_fraction).floor() as u64;

    if used <= target {
        return PurgeReport::default();
    }
    let deficit = used - target;

    let (deleted_from_uploaded, freed_from_uploaded) = delete_oldest_until(fs, &uploaded, deficit);
    let remaining_deficit = deficit.saturating_sub(freed_from_uploaded);

    let (deleted_from_worker, freed_from_worker) = if remaining_deficit > 0 {
        delete_oldest_until(fs, &worker, remaining_deficit)
    } else {
        (Vec::new(), 0)
    };

    PurgeReport {
        deleted_from_uploaded,
        deleted_from_worker,
        bytes_freed: freed_from_uploaded + freed_from_worker,
    }
}

/// Drive purge cycles forever until shutdown.
pub async fn run(fs: &dyn FileSystem, config: PurgerConfig, capacity_bytes: u64, shutdown: ShutdownFlag) {
    loop {
        if shutdown.is_set() {
            return;
        }
        run_cycle(
            fs,
            &config.worker_dir,
            &config.uploaded_dir,
            capacity_bytes,
            config.target_usage_fraction,
        );
        if shutdown.wait(config.check_interval).await {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::StdFileSystem;
    use std::time::SystemTime;
    use tempfile::tempdir;

    fn write_with_mtime(path: &Path, contents: &[u8], mtime: SystemTime) {
        std::fs::write(path, contents).unwrap();
        let file = std::fs::File::open(path).unwrap();
        file.set_modified(mtime).unwrap();
    }

    #[test]
    fn eviction_order_matches_scenario_s5() {
        let dir = tempdir().unwrap();
        let uploaded = dir.path().join("uploaded");
        let worker = dir.path().join("worker");
        std::fs::create_dir_all(&uploaded).unwrap();
        std::fs::create_dir_all(&worker).unwrap();

        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1000);
        write_with_mtime(&uploaded.join("t1.pcap"), &[0u8; 200], base + Duration::from_secs(1));
        write_with_mtime(&uploaded.join("t2.pcap"), &[0u8; 200], base + Duration::from_secs(2));
        write_with_mtime(&uploaded.join("t3.pcap"), &[0u8; 200], base + Duration::from_secs(3));
        write_with_mtime(&worker.join("t4.pcap"), &[0u8; 200], base + Duration::from_secs(4));

        let fs = StdFileSystem;
        let report = run_cycle(&fs, &worker, &uploaded, 1000, 0.5);

        assert_eq!(report.bytes_freed, 400);
        assert_eq!(
            report.deleted_from_uploaded,
            vec![uploaded.join("t1.pcap"), uploaded.join("t2.pcap")]
        );
        assert!(report.deleted_from_worker.is_empty());
        assert!(uploaded.join("t3.pcap").exists());
        assert!(worker.join("t4.pcap").exists());
        assert!(!uploaded.join("t1.pcap").exists());
        assert!(!uploaded.join("t2.pcap").exists());
    }

    #[test]
    fn partial_uploaded_pass_carries_true_remainder_into_worker() {
        let dir = tempdir().unwrap();
        let uploaded = dir.path().join("uploaded");
        let worker = dir.path().join("worker");
        std::fs::create_dir_all(&uploaded).unwrap();
        std::fs::create_dir_all(&worker).unwrap();

        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1000);
        // uploaded_dir holds only one small file: can't cover the whole deficit.
        write_with_mtime(&uploaded.join("u1.pcap"), &[0u8; 100], base + Duration::from_secs(1));
        write_with_mtime(&worker.join("w1.pcap"), &[0u8; 500], base + Duration::from_secs(2));
        write_with_mtime(&worker.join("w2.pcap"), &[0u8; 500], base + Duration::from_secs(3));

        // used = 1100, capacity 1000, fraction 0.5 -> target 500, deficit 600.
        let fs = StdFileSystem;
        let report = run_cycle(&fs, &worker, &uploaded, 1000, 0.5);

        // uploaded pass frees 100 (all it has); remaining deficit is 500,
        // not (600 - 300) from a naive half split. Exactly one worker file
        // (the older, 500 bytes) should be deleted to clear it.
        assert_eq!(report.deleted_from_uploaded, vec![uploaded.join("u1.pcap")]);
        assert_eq!(report.deleted_from_worker, vec![worker.join("w1.pcap")]);
        assert_eq!(report.bytes_freed, 600);
        assert!(worker.join("w2.pcap").exists());
    }

    #[test]
    fn below_target_does_nothing() {
        let dir = tempdir().unwrap();
        let uploaded = dir.path().join("uploaded");
        let worker = dir.path().join("worker");
        std::fs::create_dir_all(&uploaded).unwrap();
        std::fs::create_dir_all(&worker).unwrap();
        std::fs::write(uploaded.join("a.pcap"), &[0u8; 10]).unwrap();

        let fs = StdFileSystem;
        let report = run_cycle(&fs, &worker, &uploaded, 1000, 0.8);
        assert_eq!(report, PurgeReport::default());
        assert!(uploaded.join("a.pcap").exists());
    }

    #[test]
    fn effective_capacity_uses_configured_value_when_nonzero() {
        let fs = StdFileSystem;
        assert_eq!(effective_capacity(&fs, Path::new("/tmp"), 12345).unwrap(), 12345);
    }

    #[test]
    fn effective_capacity_auto_detects_when_zero() {
        let fs = StdFileSystem;
        let detected = effective_capacity(&fs, Path::new("/tmp"), 0).unwrap();
        assert!(detected > 0);
    }
}
