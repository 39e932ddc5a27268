//! Periodic scan of `worker_dir`, upload with retry/backoff, and terminal
//! dead-lettering.

pub mod http;

pub use http::{classify_status, AttemptOutcome, HttpSender, ReqwestSender, SendResponse, SendTransportError};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use relay_core::{log_uploader_info, log_uploader_warn, resolve_destination, FileSystem, GatheredEntryData, ShutdownFlag};

const FAILURE_DETAIL_MAX: usize = 256;

pub struct SenderConfig {
    pub remote_host_url: String,
    pub request_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    Delivered,
    DeadLettered,
    Abandoned,
    SourceUnavailable,
}

struct AuditEvent<'a> {
    event_type: &'static str,
    file_name: &'a str,
    file_size_bytes: u64,
    destination_url: &'a str,
    attempt: u32,
    duration_ms: u64,
    status_code: Option<u16>,
    backoff_seconds: Option<f64>,
    failure_category: Option<&'static str>,
    failure_detail: Option<String>,
    response_text_snippet: Option<String>,
}

fn truncate(s: String, max: usize) -> String {
    s.chars().take(max).collect()
}

fn emit_audit(event: AuditEvent<'_>) {
    tracing::info!(
        component = "UPLOADER",
        event_type = event.event_type,
        file_name = event.file_name,
        file_size_bytes = event.file_size_bytes,
        destination_url = event.destination_url,
        attempt = event.attempt,
        duration_ms = event.duration_ms,
        status_code = event.status_code,
        backoff_seconds = event.backoff_seconds,
        failure_category = event.failure_category,
        failure_detail = event.failure_detail.map(|d| truncate(d, FAILURE_DETAIL_MAX)),
        response_text_snippet = event.response_text_snippet,
        "upload attempt"
    );
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

/// Resolve a collision-free destination under `dir` and move the file
/// there, folding both failure modes (destination search, the rename
/// itself) into one error for the retry path to log.
fn move_to(fs: &dyn FileSystem, src: &Path, dir: &Path, name: &std::ffi::OsStr) -> Result<PathBuf, String> {
    let dest = resolve_destination(fs, dir, name).map_err(|e| e.to_string())?;
    fs.move_file(src, &dest).map_err(|e| e.to_string())?;
    Ok(dest)
}

/// Upload one file with retry/backoff until delivered, terminally
/// dead-lettered, or abandoned because shutdown was requested mid-retry.
pub async fn send_file(
    sender: &dyn HttpSender,
    fs: &dyn FileSystem,
    file_path: &Path,
    uploaded_dir: &Path,
    dead_letter_dir: &Path,
    config: &SenderConfig,
    shutdown: &ShutdownFlag,
) -> SendResult {
    let bytes = match fs.read(file_path) {
        Ok(b) => b,
        Err(e) if e.is_not_found() => return SendResult::SourceUnavailable,
        Err(e) => {
            log_uploader_warn!("failed to read file for upload", path = %file_path.display(), error = %e);
            return SendResult::SourceUnavailable;
        }
    };

    let file_name = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();
    let file_size = bytes.len() as u64;

    let mut current_backoff = config.initial_backoff;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let started = Instant::now();
        let result = sender.post(&file_name, bytes.clone(), config.request_timeout).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (status_code, retry_detail, decision) = match &result {
            Ok(response) => match classify_status(response.status) {
                AttemptOutcome::Success => (Some(response.status), None, Decision::MoveToUploaded),
                AttemptOutcome::Terminal => (Some(response.status), None, Decision::MoveToDeadLetter),
                AttemptOutcome::Retryable => (
                    Some(response.status),
                    Some(response.body_snippet.clone()),
                    Decision::Retry,
                ),
            },
            Err(e) => (None, Some(e.to_string()), Decision::Retry),
        };

        match decision {
            Decision::MoveToUploaded => {
                let Some(name) = file_path.file_name() else {
                    log_uploader_warn!("uploaded file has no file name component", path = %file_path.display());
                    return SendResult::SourceUnavailable;
                };
                match move_to(fs, file_path, uploaded_dir, name) {
                    Ok(dest) => {
                        emit_audit(AuditEvent {
                            event_type: "delivered",
                            file_name: &file_name,
                            file_size_bytes: file_size,
                            destination_url: &config.remote_host_url,
                            attempt,
                            duration_ms,
                            status_code,
                            backoff_seconds: None,
                            failure_category: None,
                            failure_detail: None,
                            response_text_snippet: None,
                        });
                        log_uploader_info!("file delivered", path = %dest.display());
                        return SendResult::Delivered;
                    }
                    Err(_) => {
                        emit_audit(AuditEvent {
                            event_type: "retry",
                            file_name: &file_name,
                            file_size_bytes: file_size,
                            destination_url: &config.remote_host_url,
                            attempt,
                            duration_ms,
                            status_code,
                            backoff_seconds: Some(current_backoff.as_secs_f64()),
                            failure_category: Some("move_to_uploaded_failed"),
                            failure_detail: Some("failed to move delivered file into uploaded_dir".to_string()),
                            response_text_snippet: None,
                        });
                    }
                }
            }
            Decision::MoveToDeadLetter => {
                if let Some(name) = file_path.file_name() {
                    match resolve_destination(fs, dead_letter_dir, name) {
                        Ok(dest) => {
                            if let Err(e) = fs.move_file(file_path, &dest) {
                                log_uploader_warn!("failed to move file to dead_letter_dir", path = %file_path.display(), error = %e);
                            }
                        }
                        Err(e) => {
                            log_uploader_warn!("failed to resolve dead_letter destination", path = %file_path.display(), error = %e);
                        }
                    }
                }
                emit_audit(AuditEvent {
                    event_type: "dead_lettered",
                    file_name: &file_name,
                    file_size_bytes: file_size,
                    destination_url: &config.remote_host_url,
                    attempt,
                    duration_ms,
                    status_code,
                    backoff_seconds: None,
                    failure_category: Some("terminal"),
                    failure_detail: retry_detail,
                    response_text_snippet: None,
                });
                return SendResult::DeadLettered;
            }
            Decision::Retry => {
                emit_audit(AuditEvent {
                    event_type: "retry",
                    file_name: &file_name,
                    file_size_bytes: file_size,
                    destination_url: &config.remote_host_url,
                    attempt,
                    duration_ms,
                    status_code,
                    backoff_seconds: Some(current_backoff.as_secs_f64()),
                    failure_category: Some("retryable"),
                    failure_detail: retry_detail,
                    response_text_snippet: None,
                });
            }
        }

        if shutdown.wait(current_backoff).await {
            return SendResult::Abandoned;
        }
        current_backoff = next_backoff(current_backoff, config.max_backoff);
    }
}

enum Decision {
    MoveToUploaded,
    MoveToDeadLetter,
    Retry,
}

pub struct UploaderConfig {
    pub worker_dir: PathBuf,
    pub uploaded_dir: PathBuf,
    pub dead_letter_dir: PathBuf,
    pub pcap_extension: String,
    pub poll_interval: Duration,
    pub heartbeat_target_interval: Duration,
    pub remote_host_url: String,
    pub request_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

fn cycles_for_heartbeat(config: &UploaderConfig) -> u64 {
    if config.poll_interval.is_zero() {
        return 1;
    }
    let ratio = config.heartbeat_target_interval.as_secs_f64() / config.poll_interval.as_secs_f64();
    (ratio.round() as u64).max(1)
}

fn gather_pending(fs: &dyn FileSystem, worker_dir: &Path, extension: &str) -> Result<Vec<GatheredEntryData>, relay_core::FsError> {
    let entries = fs.scandir(worker_dir)?;
    let mut gathered: Vec<GatheredEntryData> = entries
        .into_iter()
        .filter(|e| {
            e.metadata.is_file
                && e.path
                    .extension()
                    .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
        })
        .map(|e| GatheredEntryData {
            mtime_wall: e.metadata.modified,
            size: e.metadata.size,
            absolute_path: e.path,
        })
        .collect();
    gathered.sort();
    Ok(gathered)
}

/// Drive upload cycles forever until shutdown. Files that dead-letter are
/// remembered in an in-memory "critically failed" set for the rest of this
/// process's lifetime so they aren't retried every cycle; the set resets on
/// restart.
pub async fn run(sender: &dyn HttpSender, fs: &dyn FileSystem, config: UploaderConfig, shutdown: ShutdownFlag) {
    let heartbeat_cycles = cycles_for_heartbeat(&config);
    let mut cycles_since_heartbeat = 0u64;
    let mut empty_streak = 0u64;
    let mut critically_failed: HashSet<PathBuf> = HashSet::new();

    let sender_config = SenderConfig {
        remote_host_url: config.remote_host_url.clone(),
        request_timeout: config.request_timeout,
        initial_backoff: config.initial_backoff,
        max_backoff: config.max_backoff,
    };

    loop {
        if shutdown.is_set() {
            return;
        }

        let gathered = match gather_pending(fs, &config.worker_dir, &config.pcap_extension) {
            Ok(g) => g,
            Err(e) => {
                log_uploader_warn!("failed to scan worker_dir", error = %e);
                if shutdown.wait(config.poll_interval).await {
                    return;
                }
                continue;
            }
        };

        let pending: Vec<_> = gathered
            .into_iter()
            .filter(|entry| !critically_failed.contains(&entry.absolute_path))
            .collect();

        if pending.is_empty() {
            empty_streak += 1;
            if empty_streak == 1 || empty_streak % heartbeat_cycles == 0 {
                log_uploader_info!("no files pending upload", streak = empty_streak);
            }
        } else {
            empty_streak = 0;
            for entry in &pending {
                if shutdown.is_set() {
                    return;
                }
                let result = send_file(
                    sender,
                    fs,
                    &entry.absolute_path,
                    &config.uploaded_dir,
                    &config.dead_letter_dir,
                    &sender_config,
                    &shutdown,
                )
                .await;
                if result == SendResult::DeadLettered {
                    critically_failed.insert(entry.absolute_path.clone());
                }
                if result == SendResult::Abandoned {
                    return;
                }
            }
        }

        cycles_since_heartbeat += 1;
        if cycles_since_heartbeat >= heartbeat_cycles {
            log_uploader_info!("uploader heartbeat", pending = pending.len());
            cycles_since_heartbeat = 0;
        }

        if shutdown.wait(config.poll_interval).await {
            return;
        }
    }
}
