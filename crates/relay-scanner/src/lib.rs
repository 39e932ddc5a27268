//! Periodic scan of `source_dir` with lost/stuck-active file classification.
//!
//! The scan itself (`Scanner::scan_once`) is a pure function of the
//! previous cycle's state and the current directory listing, so it can be
//! exercised directly in tests without going through the async run loop.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use relay_core::{
    FileStateRecord, FileSystem, GatheredEntryData, ShutdownFlag,
};
use relay_core::queue::BoundedQueue;
use relay_core::{log_scanner_info, log_scanner_warn};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("failed to scan {path}: {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        source: relay_core::FsError,
    },
}

/// The outcome of a single scan cycle, reported for logging and testing.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub newly_lost: Vec<PathBuf>,
    pub newly_stuck_active: Vec<PathBuf>,
    pub newly_removed: Vec<PathBuf>,
}

pub struct Scanner {
    source_dir: PathBuf,
    pcap_extension: String,
    lost_timeout: Duration,
    stuck_active_timeout: Duration,
    state: HashMap<PathBuf, FileStateRecord>,
    lost: HashSet<PathBuf>,
    stuck: HashSet<PathBuf>,
}

impl Scanner {
    pub fn new(
        source_dir: PathBuf,
        pcap_extension: String,
        lost_timeout: Duration,
        stuck_active_timeout: Duration,
    ) -> Self {
        Self {
            source_dir,
            pcap_extension,
            lost_timeout,
            stuck_active_timeout,
            state: HashMap::new(),
            lost: HashSet::new(),
            stuck: HashSet::new(),
        }
    }

    fn gather(&self, fs: &dyn FileSystem) -> Result<Vec<GatheredEntryData>, ScanError> {
        let entries = fs
            .scandir(&self.source_dir)
            .map_err(|source| ScanError::DirectoryUnreadable {
                path: self.source_dir.clone(),
                source,
            })?;

        let mut gathered: Vec<GatheredEntryData> = entries
            .into_iter()
            .filter(|entry| {
                entry.metadata.is_file
                    && entry
                        .path
                        .extension()
                        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&self.pcap_extension))
                        .unwrap_or(false)
            })
            .map(|entry| GatheredEntryData {
                mtime_wall: entry.metadata.modified,
                size: entry.metadata.size,
                absolute_path: entry.path,
            })
            .collect();
        gathered.sort();
        Ok(gathered)
    }

    /// Run one scan cycle against the given filesystem, updating internal
    /// state and returning the transitions that occurred this cycle.
    pub fn scan_once(&mut self, fs: &dyn FileSystem) -> Result<ScanReport, ScanError> {
        let wall_now = SystemTime::now();
        let mono_now = Instant::now();

        let gathered = self.gather(fs)?;

        let mut next_state = HashMap::with_capacity(gathered.len());
        let mut lost_this_cycle = HashSet::new();
        let mut stuck_this_cycle = HashSet::new();

        for entry in &gathered {
            let path = &entry.absolute_path;
            let (record, is_newly_seen) = match self.state.get(path) {
                Some(prior) => (prior.with_latest_scan(entry.size, entry.mtime_wall), false),
                None => (
                    FileStateRecord::first_seen(entry.size, entry.mtime_wall, mono_now),
                    true,
                ),
            };

            let active_since_last_scan = !is_newly_seen
                && self
                    .state
                    .get(path)
                    .map(|prior| prior.changed_since_last_scan(entry.size, entry.mtime_wall))
                    .unwrap_or(false);

            let age = wall_now
                .duration_since(entry.mtime_wall)
                .unwrap_or(Duration::ZERO);
            let is_lost = !is_newly_seen && age > self.lost_timeout;

            let presence = mono_now
                .checked_duration_since(record.first_seen_mono)
                .unwrap_or(Duration::ZERO);
            let is_stuck_active =
                !is_lost && active_since_last_scan && presence > self.stuck_active_timeout;

            if is_lost {
                lost_this_cycle.insert(path.clone());
            }
            if is_stuck_active {
                stuck_this_cycle.insert(path.clone());
            }

            next_state.insert(path.clone(), record);
        }

        let mut newly_removed: Vec<PathBuf> = self
            .state
            .keys()
            .filter(|path| !next_state.contains_key(*path))
            .cloned()
            .collect();
        newly_removed.sort();

        let mut newly_lost: Vec<PathBuf> = lost_this_cycle.difference(&self.lost).cloned().collect();
        newly_lost.sort();

        let mut newly_stuck_active: Vec<PathBuf> =
            stuck_this_cycle.difference(&self.stuck).cloned().collect();
        newly_stuck_active.sort();

        self.state = next_state;
        self.lost = lost_this_cycle;
        self.stuck = stuck_this_cycle;

        Ok(ScanReport {
            newly_lost,
            newly_stuck_active,
            newly_removed,
        })
    }

    /// Drive scan cycles forever until shutdown, enqueuing newly-lost paths
    /// onto `move_queue` and logging transitions. Subtracts the cycle's own
    /// duration from the sleep so the check interval holds on average even
    /// under load.
    pub async fn run(
        mut self,
        fs: &dyn FileSystem,
        move_queue: BoundedQueue<PathBuf>,
        shutdown: ShutdownFlag,
        check_interval: Duration,
    ) -> Result<(), ScanError> {
        loop {
            let cycle_start = Instant::now();
            let report = self.scan_once(fs)?;

            for path in &report.newly_lost {
                log_scanner_warn!("file classified as lost", path = %path.display());
                if move_queue.put_blocking(path.clone()).await.is_err() {
                    log_scanner_warn!("move queue closed while enqueueing lost file");
                    return Ok(());
                }
            }
            for path in &report.newly_stuck_active {
                log_scanner_warn!("file classified as stuck active", path = %path.display());
            }
            for path in &report.newly_removed {
                log_scanner_info!("file no longer present in source_dir", path = %path.display());
            }

            let elapsed = cycle_start.elapsed();
            let sleep_for = check_interval.saturating_sub(elapsed);
            if shutdown.wait(sleep_for).await {
                return Ok(());
            }
        }
    }
}
