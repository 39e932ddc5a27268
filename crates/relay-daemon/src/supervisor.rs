//! Builds queues and workers in dependency order, health-checks their
//! liveness, and coordinates shutdown.

use std::time::Duration;

use relay_core::queue::BoundedQueue;
use relay_core::{
    log_supervisor_critical, log_supervisor_info, FileSystem, ShutdownFlag,
};
use relay_config::RelayConfig;

const HEALTH_CHECK_INTERVAL_SECONDS: f64 = 5.0;
const THREAD_JOIN_TIMEOUT_SECONDS: f64 = 5.0;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("setup failed: {0}")]
    Setup(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Clean,
    Operational,
}

type WorkerHandle = tokio::task::JoinHandle<Result<(), String>>;

/// Build every component, start it, then block running the health-check
/// loop until a shutdown signal arrives or a worker dies.
pub async fn run(config: RelayConfig, fs: &'static dyn FileSystem) -> Result<Outcome, SupervisorError> {
    let shutdown = ShutdownFlag::new();

    let (move_queue, move_rx) = BoundedQueue::channel(1000);
    let (tailer_queue, tailer_rx) = BoundedQueue::channel(1000);

    let purger_capacity = relay_purger::effective_capacity(
        fs,
        &config.uploaded_dir,
        config.purger_total_capacity_bytes,
    )
    .map_err(|e| SupervisorError::Setup(e.to_string()))?;

    let sender = relay_uploader::ReqwestSender::new(config.remote_host_url.clone(), config.verify_ssl)
        .map_err(|e| SupervisorError::Setup(e.to_string()))?;
    // Leaked deliberately: the sender must outlive the 'static uploader
    // task for the life of the process, same as the filesystem handle.
    let sender: &'static relay_uploader::ReqwestSender = Box::leak(Box::new(sender));

    let mut handles: Vec<(&'static str, WorkerHandle)> = Vec::new();

    log_supervisor_info!("starting scanner");
    let scanner = relay_scanner::Scanner::new(
        config.source_dir.clone(),
        config.pcap_extension.clone(),
        config.lost_timeout,
        config.stuck_active_timeout,
    );
    {
        let queue = move_queue.clone();
        let shutdown = shutdown.clone();
        let check_interval = config.scanner_check_interval;
        handles.push((
            "scanner",
            tokio::spawn(async move { scanner.run(fs, queue, shutdown, check_interval).await.map_err(|e| e.to_string()) }),
        ));
    }

    log_supervisor_info!("starting mover");
    {
        let worker_dir = config.worker_dir.clone();
        let shutdown = shutdown.clone();
        let poll = config.move_poll_interval;
        handles.push((
            "mover",
            tokio::spawn(async move {
                relay_mover::run(fs, move_rx, worker_dir, shutdown, poll).await;
                Ok(())
            }),
        ));
    }

    log_supervisor_info!("starting tailer watcher");
    let watcher_handle = relay_tailer::spawn_watcher(
        config.csv_dir.clone(),
        config.csv_extension.clone(),
        tailer_queue.clone(),
        shutdown.clone(),
    )
    .map_err(|e| SupervisorError::Setup(e.to_string()))?;
    handles.push((
        "tailer_watcher",
        tokio::spawn(async move { watcher_handle.await.map_err(|e| e.to_string()) }),
    ));

    log_supervisor_info!("starting tailer consumer");
    {
        let move_queue = move_queue.clone();
        let shutdown = shutdown.clone();
        let poll = config.event_queue_poll_timeout;
        handles.push((
            "tailer_consumer",
            tokio::spawn(async move {
                relay_tailer::run_consumer(
                    relay_tailer::CsvConsumer::new(),
                    fs,
                    tailer_rx,
                    move_queue,
                    shutdown,
                    poll,
                )
                .await;
                Ok(())
            }),
        ));
    }

    log_supervisor_info!("starting uploader");
    {
        let uploader_config = relay_uploader::UploaderConfig {
            worker_dir: config.worker_dir.clone(),
            uploaded_dir: config.uploaded_dir.clone(),
            dead_letter_dir: config.dead_letter_dir.clone(),
            pcap_extension: config.pcap_extension.clone(),
            poll_interval: config.uploader_poll_interval,
            heartbeat_target_interval: config.heartbeat_target_interval,
            remote_host_url: config.remote_host_url.clone(),
            request_timeout: config.request_timeout,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
        };
        let shutdown = shutdown.clone();
        handles.push((
            "uploader",
            tokio::spawn(async move {
                relay_uploader::run(sender, fs, uploader_config, shutdown).await;
                Ok(())
            }),
        ));
    }

    log_supervisor_info!("starting purger");
    {
        let purger_config = relay_purger::PurgerConfig {
            worker_dir: config.worker_dir.clone(),
            uploaded_dir: config.uploaded_dir.clone(),
            target_usage_fraction: config.purger_target_usage_fraction,
            check_interval: config.purger_check_interval,
        };
        let shutdown = shutdown.clone();
        handles.push((
            "purger",
            tokio::spawn(async move {
                relay_purger::run(fs, purger_config, purger_capacity, shutdown).await;
                Ok(())
            }),
        ));
    }

    let outcome = health_check_loop(&handles).await;

    shutdown.set();
    join_all_with_timeout(handles).await;

    Ok(outcome)
}

async fn health_check_loop(handles: &[(&'static str, WorkerHandle)]) -> Outcome {
    let health_check_interval = Duration::from_secs_f64(HEALTH_CHECK_INTERVAL_SECONDS);
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            log_supervisor_critical!("failed to install SIGTERM handler", error = %e);
            return Outcome::Operational;
        }
    };
    let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            log_supervisor_critical!("failed to install SIGINT handler", error = %e);
            return Outcome::Operational;
        }
    };

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                log_supervisor_info!("received SIGTERM, shutting down");
                return Outcome::Clean;
            }
            _ = sigint.recv() => {
                log_supervisor_info!("received SIGINT, shutting down");
                return Outcome::Clean;
            }
            _ = tokio::time::sleep(health_check_interval) => {
                let dead: Vec<&str> = handles
                    .iter()
                    .filter(|(_, handle)| handle.is_finished())
                    .map(|(name, _)| *name)
                    .collect();
                if !dead.is_empty() {
                    log_supervisor_critical!("worker died, triggering shutdown", workers = %dead.join(","));
                    return Outcome::Operational;
                }
            }
        }
    }
}

async fn join_all_with_timeout(handles: Vec<(&'static str, WorkerHandle)>) {
    let join_timeout = Duration::from_secs_f64(THREAD_JOIN_TIMEOUT_SECONDS);
    for (name, handle) in handles {
        match tokio::time::timeout(join_timeout, handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => log_supervisor_critical!("worker exited with error", worker = name, error = %e),
            Ok(Err(e)) => log_supervisor_critical!("worker task panicked", worker = name, error = %e),
            Err(_) => log_supervisor_critical!("worker failed to exit within join timeout", worker = name),
        }
    }
}
