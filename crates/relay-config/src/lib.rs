//! INI configuration loading and validation.
//!
//! Mirrors the load/validate split used elsewhere in this workspace: a
//! section-scoped parse pass that turns raw strings into typed, range
//! checked values (failing with a `[Section] key` error naming the exact
//! offender), followed by a cross-field `validate` pass for invariants that
//! span more than one key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use relay_core::FileSystem;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: ini::ParseError,
    },
    #[error("missing required key [{section}] {key}")]
    MissingKey { section: &'static str, key: &'static str },
    #[error("invalid value for [{section}] {key}: {value:?} ({reason})")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("{directory} ({path}) must exist and be a directory")]
    DirectoryMissing { directory: &'static str, path: PathBuf },
    #[error(
        "stuck_active_file_timeout_seconds ({stuck}) must be greater than lost_timeout_seconds ({lost})"
    )]
    StuckNotGreaterThanLost { stuck: f64, lost: f64 },
    #[error("max_backoff ({max}) must be >= initial_backoff ({initial})")]
    MaxBackoffBelowInitial { max: f64, initial: f64 },
    #[error("directories do not share a device with base_dir: {0:?}")]
    DeviceMismatch(Vec<PathBuf>),
}

/// Fully validated, immutable configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub base_dir: PathBuf,
    pub logger_dir: PathBuf,
    pub source_dir: PathBuf,
    pub worker_dir: PathBuf,
    pub uploaded_dir: PathBuf,
    pub dead_letter_dir: PathBuf,
    pub csv_dir: PathBuf,

    pub pcap_extension: String,
    pub csv_extension: String,

    pub move_poll_interval: Duration,

    pub scanner_check_interval: Duration,
    pub lost_timeout: Duration,
    pub stuck_active_timeout: Duration,

    pub event_queue_poll_timeout: Duration,

    pub uploader_poll_interval: Duration,
    pub heartbeat_target_interval: Duration,
    pub remote_host_url: String,
    pub request_timeout: Duration,
    pub verify_ssl: bool,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,

    pub purger_total_capacity_bytes: u64,
    pub purger_target_usage_fraction: f64,
    pub purger_check_interval: Duration,
}

impl RelayConfig {
    /// Load and validate a config file, deriving the operational
    /// subdirectories under `base_dir` and checking that every one of them
    /// resides on the same device, creating any that don't yet exist.
    pub fn load(path: &Path, fs: &dyn FileSystem) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let ini = Ini::load_from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        let base_dir = fs
            .resolve(Path::new(&get_string(&ini, "Directories", "base_dir")?), false)
            .map_err(|_| ConfigError::DirectoryMissing {
                directory: "base_dir",
                path: PathBuf::from(get_string(&ini, "Directories", "base_dir")?),
            })?;

        let logger_dir = PathBuf::from(get_string(&ini, "Directories", "logger_dir")?);
        if !fs.is_dir(&logger_dir) {
            return Err(ConfigError::DirectoryMissing {
                directory: "logger_dir",
                path: logger_dir,
            });
        }

        let pcap_extension = get_string_no_dot(&ini, "Files", "pcap_extension_no_dot")?;
        let csv_extension = get_string_no_dot(&ini, "Files", "csv_extension_no_dot")?;

        let move_poll_interval = get_duration_min(&ini, "Mover", "move_poll_interval_seconds", 0.0)?;

        let scanner_check_interval =
            get_duration_min(&ini, "Scanner", "scanner_check_seconds", 1.0)?;
        let lost_timeout = get_duration_min(&ini, "Scanner", "lost_timeout_seconds", 1.0)?;
        let stuck_active_timeout =
            get_duration_min(&ini, "Scanner", "stuck_active_file_timeout_seconds", 1.0)?;

        let event_queue_poll_timeout =
            get_duration_min(&ini, "Tailer", "event_queue_poll_timeout_seconds", 0.0)?;

        let uploader_poll_interval =
            get_duration_min(&ini, "Uploader", "uploader_poll_interval_seconds", 0.0)?;
        let heartbeat_target_interval =
            get_duration_min(&ini, "Uploader", "heartbeat_target_interval_s", 0.0)?;
        let remote_host_url = get_string(&ini, "Uploader", "remote_host_url")?;
        if !(remote_host_url.starts_with("http://") || remote_host_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                section: "Uploader",
                key: "remote_host_url",
                value: remote_host_url,
                reason: "must start with http:// or https://",
            });
        }
        let request_timeout = get_duration_min(&ini, "Uploader", "request_timeout", 1.0)?;
        let verify_ssl = get_bool(&ini, "Uploader", "verify_ssl")?;
        let initial_backoff = get_duration_min(&ini, "Uploader", "initial_backoff", 0.0)?;
        let max_backoff_secs = get_float(&ini, "Uploader", "max_backoff")?;
        if max_backoff_secs < initial_backoff.as_secs_f64() {
            return Err(ConfigError::MaxBackoffBelowInitial {
                max: max_backoff_secs,
                initial: initial_backoff.as_secs_f64(),
            });
        }
        let max_backoff = Duration::from_secs_f64(max_backoff_secs);

        if stuck_active_timeout <= lost_timeout {
            return Err(ConfigError::StuckNotGreaterThanLost {
                stuck: stuck_active_timeout.as_secs_f64(),
                lost: lost_timeout.as_secs_f64(),
            });
        }

        let purger_total_capacity_bytes = get_optional_u64(&ini, "Purger", "total_capacity_bytes")?
            .unwrap_or(0);
        let purger_target_usage_fraction =
            get_optional_float(&ini, "Purger", "target_usage_fraction")?.unwrap_or(0.8);
        if !(0.0 < purger_target_usage_fraction && purger_target_usage_fraction <= 1.0) {
            return Err(ConfigError::InvalidValue {
                section: "Purger",
                key: "target_usage_fraction",
                value: purger_target_usage_fraction.to_string(),
                reason: "must be in (0, 1]",
            });
        }
        let purger_check_interval = get_optional_duration(&ini, "Purger", "check_interval_seconds")?
            .unwrap_or(Duration::from_secs(60));

        let source_dir = base_dir.join("source");
        let worker_dir = base_dir.join("worker");
        let uploaded_dir = base_dir.join("uploaded");
        let dead_letter_dir = base_dir.join("dead_letter");
        let csv_dir = base_dir.join("csv");

        for dir in [&source_dir, &worker_dir, &uploaded_dir, &dead_letter_dir, &csv_dir] {
            fs.mkdir(dir, true, true)
                .map_err(|_| ConfigError::DirectoryMissing {
                    directory: "derived",
                    path: dir.clone(),
                })?;
        }

        let base_device = fs.device_id(&base_dir).map_err(|_| ConfigError::DirectoryMissing {
            directory: "base_dir",
            path: base_dir.clone(),
        })?;
        let mismatched: Vec<PathBuf> = [&source_dir, &worker_dir, &uploaded_dir, &dead_letter_dir, &csv_dir]
            .into_iter()
            .filter(|dir| fs.device_id(dir).map(|d| d != base_device).unwrap_or(true))
            .cloned()
            .collect();
        if !mismatched.is_empty() {
            return Err(ConfigError::DeviceMismatch(mismatched));
        }

        Ok(RelayConfig {
            base_dir,
            logger_dir,
            source_dir,
            worker_dir,
            uploaded_dir,
            dead_letter_dir,
            csv_dir,
            pcap_extension,
            csv_extension,
            move_poll_interval,
            scanner_check_interval,
            lost_timeout,
            stuck_active_timeout,
            event_queue_poll_timeout,
            uploader_poll_interval,
            heartbeat_target_interval,
            remote_host_url,
            request_timeout,
            verify_ssl,
            initial_backoff,
            max_backoff,
            purger_total_capacity_bytes,
            purger_target_usage_fraction,
            purger_check_interval,
        })
    }
}

fn get_string(ini: &Ini, section: &'static str, key: &'static str) -> Result<String, ConfigError> {
    ini.section(Some(section))
        .and_then(|s| s.get(key))
        .map(str::to_string)
        .ok_or(ConfigError::MissingKey { section, key })
}

fn get_string_no_dot(ini: &Ini, section: &'static str, key: &'static str) -> Result<String, ConfigError> {
    let value = get_string(ini, section, key)?;
    if value.is_empty() || value.contains('.') {
        return Err(ConfigError::InvalidValue {
            section,
            key,
            value,
            reason: "must be non-empty and contain no dot",
        });
    }
    Ok(value)
}

fn get_float(ini: &Ini, section: &'static str, key: &'static str) -> Result<f64, ConfigError> {
    let raw = get_string(ini, section, key)?;
    raw.parse::<f64>().map_err(|_| ConfigError::InvalidValue {
        section,
        key,
        value: raw,
        reason: "not a valid floating point number",
    })
}

fn get_duration_min(
    ini: &Ini,
    section: &'static str,
    key: &'static str,
    min: f64,
) -> Result<Duration, ConfigError> {
    let value = get_float(ini, section, key)?;
    if value < min {
        return Err(ConfigError::InvalidValue {
            section,
            key,
            value: value.to_string(),
            reason: "below required minimum",
        });
    }
    Ok(Duration::from_secs_f64(value))
}

fn get_bool(ini: &Ini, section: &'static str, key: &'static str) -> Result<bool, ConfigError> {
    let raw = get_string(ini, section, key)?;
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            section,
            key,
            value: raw,
            reason: "not a recognized boolean",
        }),
    }
}

fn get_optional_float(
    ini: &Ini,
    section: &'static str,
    key: &'static str,
) -> Result<Option<f64>, ConfigError> {
    match ini.section(Some(section)).and_then(|s| s.get(key)) {
        Some(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                section,
                key,
                value: raw.to_string(),
                reason: "not a valid floating point number",
            }),
        None => Ok(None),
    }
}

fn get_optional_duration(
    ini: &Ini,
    section: &'static str,
    key: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    Ok(get_optional_float(ini, section, key)?.map(Duration::from_secs_f64))
}

fn get_optional_u64(ini: &Ini, section: &'static str, key: &'static str) -> Result<Option<u64>, ConfigError> {
    match ini.section(Some(section)).and_then(|s| s.get(key)) {
        Some(raw) => raw.parse::<u64>().map(Some).map_err(|_| ConfigError::InvalidValue {
            section,
            key,
            value: raw.to_string(),
            reason: "not a valid non-negative integer",
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::StdFileSystem;
    use tempfile::tempdir;

    fn write_config(dir: &Path, base_dir: &Path, logger_dir: &Path) -> PathBuf {
        let config_path = dir.join("config.ini");
        let contents = format!(
            "[Directories]\n\
             base_dir = {base}\n\
             logger_dir = {logger}\n\
             [Files]\n\
             pcap_extension_no_dot = pcap\n\
             csv_extension_no_dot = csv\n\
             [Mover]\n\
             move_poll_interval_seconds = 1.0\n\
             [Scanner]\n\
             scanner_check_seconds = 5.0\n\
             lost_timeout_seconds = 30.0\n\
             stuck_active_file_timeout_seconds = 60.0\n\
             [Tailer]\n\
             event_queue_poll_timeout_seconds = 1.0\n\
             [Uploader]\n\
             uploader_poll_interval_seconds = 2.0\n\
             heartbeat_target_interval_s = 60.0\n\
             remote_host_url = https://example.invalid/upload\n\
             request_timeout = 10.0\n\
             verify_ssl = true\n\
             initial_backoff = 1.0\n\
             max_backoff = 30.0\n",
            base = base_dir.display(),
            logger = logger_dir.display(),
        );
        std::fs::write(&config_path, contents).unwrap();
        config_path
    }

    #[test]
    fn loads_valid_config_and_derives_directories() {
        let dir = tempdir().unwrap();
        let base_dir = dir.path().join("base");
        std::fs::create_dir(&base_dir).unwrap();
        let config_path = write_config(dir.path(), &base_dir, dir.path());

        let fs = StdFileSystem;
        let config = RelayConfig::load(&config_path, &fs).unwrap();

        assert!(config.source_dir.exists());
        assert!(config.worker_dir.exists());
        assert!(config.uploaded_dir.exists());
        assert!(config.dead_letter_dir.exists());
        assert!(config.csv_dir.exists());
        assert_eq!(config.pcap_extension, "pcap");
        assert_eq!(config.verify_ssl, true);
    }

    #[test]
    fn rejects_stuck_timeout_not_greater_than_lost() {
        let dir = tempdir().unwrap();
        let base_dir = dir.path().join("base");
        std::fs::create_dir(&base_dir).unwrap();
        let config_path = dir.path().join("config.ini");
        let contents = format!(
            "[Directories]\nbase_dir = {base}\nlogger_dir = {logger}\n\
             [Files]\npcap_extension_no_dot = pcap\ncsv_extension_no_dot = csv\n\
             [Mover]\nmove_poll_interval_seconds = 1.0\n\
             [Scanner]\nscanner_check_seconds = 5.0\nlost_timeout_seconds = 30.0\n\
             stuck_active_file_timeout_seconds = 10.0\n\
             [Tailer]\nevent_queue_poll_timeout_seconds = 1.0\n\
             [Uploader]\nuploader_poll_interval_seconds = 2.0\nheartbeat_target_interval_s = 60.0\n\
             remote_host_url = https://example.invalid\nrequest_timeout = 10.0\nverify_ssl = true\n\
             initial_backoff = 1.0\nmax_backoff = 30.0\n",
            base = base_dir.display(),
            logger = dir.path().display(),
        );
        std::fs::write(&config_path, contents).unwrap();

        let fs = StdFileSystem;
        assert!(matches!(
            RelayConfig::load(&config_path, &fs),
            Err(ConfigError::StuckNotGreaterThanLost { .. })
        ));
    }

    #[test]
    fn rejects_url_without_scheme() {
        let dir = tempdir().unwrap();
        let base_dir = dir.path().join("base");
        std::fs::create_dir(&base_dir).unwrap();
        let config_path = dir.path().join("config.ini");
        let contents = format!(
            "[Directories]\nbase_dir = {base}\nlogger_dir = {logger}\n\
             [Files]\npcap_extension_no_dot = pcap\ncsv_extension_no_dot = csv\n\
             [Mover]\nmove_poll_interval_seconds = 1.0\n\
             [Scanner]\nscanner_check_seconds = 5.0\nlost_timeout_seconds = 30.0\n\
             stuck_active_file_timeout_seconds = 60.0\n\
             [Tailer]\nevent_queue_poll_timeout_seconds = 1.0\n\
             [Uploader]\nuploader_poll_interval_seconds = 2.0\nheartbeat_target_interval_s = 60.0\n\
             remote_host_url = ftp://example.invalid\nrequest_timeout = 10.0\nverify_ssl = true\n\
             initial_backoff = 1.0\nmax_backoff = 30.0\n",
            base = base_dir.display(),
            logger = dir.path().display(),
        );
        std::fs::write(&config_path, contents).unwrap();

        let fs = StdFileSystem;
        assert!(matches!(
            RelayConfig::load(&config_path, &fs),
            Err(ConfigError::InvalidValue { key: "remote_host_url", .. })
        ));
    }
}
