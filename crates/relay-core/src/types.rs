//! Value types shared between the scanner, tailer, mover, and uploader.

use std::path::PathBuf;
use std::time::{Instant, SystemTime};

/// Per-path bookkeeping the scanner keeps across poll cycles to classify a
/// file as active, lost, or stuck.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStateRecord {
    pub size: u64,
    pub mtime_wall: SystemTime,
    pub first_seen_mono: Instant,
    pub prev_scan_size: u64,
    pub prev_scan_mtime_wall: SystemTime,
}

impl FileStateRecord {
    pub fn first_seen(size: u64, mtime_wall: SystemTime, now: Instant) -> Self {
        Self {
            size,
            mtime_wall,
            first_seen_mono: now,
            prev_scan_size: size,
            prev_scan_mtime_wall: mtime_wall,
        }
    }

    /// Whether the file grew or its mtime advanced since the previous scan.
    pub fn changed_since_last_scan(&self, size: u64, mtime_wall: SystemTime) -> bool {
        size != self.prev_scan_size || mtime_wall != self.prev_scan_mtime_wall
    }

    pub fn with_latest_scan(&self, size: u64, mtime_wall: SystemTime) -> Self {
        Self {
            size,
            mtime_wall,
            first_seen_mono: self.first_seen_mono,
            prev_scan_size: size,
            prev_scan_mtime_wall: mtime_wall,
        }
    }
}

/// A single gathered filesystem entry, ordered for move/upload processing
/// first by modification time and then by size (oldest, smallest first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatheredEntryData {
    pub mtime_wall: SystemTime,
    pub size: u64,
    pub absolute_path: PathBuf,
}

impl PartialOrd for GatheredEntryData {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GatheredEntryData {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.mtime_wall
            .cmp(&other.mtime_wall)
            .then_with(|| self.size.cmp(&other.size))
    }
}

/// A filesystem-change notification surfaced by the CSV directory watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailerEvent {
    InitialFound(PathBuf),
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

/// A single successfully parsed CSV record: timestamp, absolute filepath,
/// and the sha256 checksum string recorded alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub timestamp: u64,
    pub filepath: PathBuf,
    pub sha256: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected exactly two commas, found {0}")]
    WrongFieldCount(usize),
    #[error("timestamp field is not a non-negative integer: {0:?}")]
    InvalidTimestamp(String),
    #[error("filepath field is empty")]
    EmptyFilepath,
    #[error("sha256 field is not exactly 64 hex characters: {0:?}")]
    InvalidSha256(String),
}

/// Parse one CSV line of the form `timestamp,filepath,sha256`.
///
/// A line is only valid if it contains exactly two commas; anything else is
/// rejected, including a filepath that itself contains a comma.
pub fn parse_csv_line(line: &str) -> Result<ParsedLine, ParseError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);

    let comma_count = trimmed.matches(',').count();
    if comma_count != 2 {
        return Err(ParseError::WrongFieldCount(comma_count));
    }

    let (timestamp_field, rest) = trimmed
        .split_once(',')
        .ok_or(ParseError::WrongFieldCount(comma_count))?;
    let (filepath_field, sha256_field) = rest
        .rsplit_once(',')
        .ok_or(ParseError::WrongFieldCount(comma_count))?;

    let timestamp_field = timestamp_field.trim();
    let filepath_field = filepath_field.trim();
    let sha256_field = sha256_field.trim();

    let timestamp: u64 = timestamp_field
        .parse()
        .map_err(|_| ParseError::InvalidTimestamp(timestamp_field.to_string()))?;

    if filepath_field.is_empty() {
        return Err(ParseError::EmptyFilepath);
    }

    if sha256_field.len() != 64 || !sha256_field.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ParseError::InvalidSha256(sha256_field.to_string()));
    }

    Ok(ParsedLine {
        timestamp,
        filepath: PathBuf::from(filepath_field),
        sha256: sha256_field.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha() -> String {
        "a".repeat(64)
    }

    #[test]
    fn parses_well_formed_line() {
        let line = format!("1700000000,/data/source/a.pcap,{}", sha());
        let parsed = parse_csv_line(&line).unwrap();
        assert_eq!(parsed.timestamp, 1_700_000_000);
        assert_eq!(parsed.filepath, PathBuf::from("/data/source/a.pcap"));
        assert_eq!(parsed.sha256, sha());
    }

    #[test]
    fn trims_whitespace_and_carriage_return() {
        let line = format!(" 42 , /data/a.pcap , {}\r\n", sha());
        let parsed = parse_csv_line(&line).unwrap();
        assert_eq!(parsed.timestamp, 42);
        assert_eq!(parsed.filepath, PathBuf::from("/data/a.pcap"));
    }

    #[test]
    fn rejects_filepath_containing_a_comma() {
        let line = format!("1,/data/a,weird,name.pcap,{}", sha());
        assert_eq!(parse_csv_line(&line), Err(ParseError::WrongFieldCount(4)));
    }

    #[test]
    fn rejects_too_few_commas() {
        assert_eq!(
            parse_csv_line("1,/data/a.pcap"),
            Err(ParseError::WrongFieldCount(1))
        );
    }

    #[test]
    fn rejects_negative_timestamp() {
        let line = format!("-1,/data/a.pcap,{}", sha());
        assert!(matches!(
            parse_csv_line(&line),
            Err(ParseError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn rejects_empty_filepath() {
        let line = format!("1,,{}", sha());
        assert_eq!(parse_csv_line(&line), Err(ParseError::EmptyFilepath));
    }

    #[test]
    fn rejects_short_sha256() {
        let line = "1,/data/a.pcap,deadbeef".to_string();
        assert!(matches!(
            parse_csv_line(&line),
            Err(ParseError::InvalidSha256(_))
        ));
    }

    #[test]
    fn rejects_non_hex_sha256() {
        let line = format!("1,/data/a.pcap,{}", "g".repeat(64));
        assert!(matches!(
            parse_csv_line(&line),
            Err(ParseError::InvalidSha256(_))
        ));
    }

    #[test]
    fn gathered_entry_orders_by_mtime_then_size() {
        let base = SystemTime::UNIX_EPOCH;
        let older_small = GatheredEntryData {
            mtime_wall: base,
            size: 10,
            absolute_path: PathBuf::from("/a"),
        };
        let older_large = GatheredEntryData {
            mtime_wall: base,
            size: 20,
            absolute_path: PathBuf::from("/b"),
        };
        let newer = GatheredEntryData {
            mtime_wall: base + std::time::Duration::from_secs(1),
            size: 1,
            absolute_path: PathBuf::from("/c"),
        };
        let mut entries = vec![newer.clone(), older_large.clone(), older_small.clone()];
        entries.sort();
        assert_eq!(entries, vec![older_small, older_large, newer]);
    }
}
