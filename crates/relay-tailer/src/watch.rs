//! Filesystem watcher over `csv_dir`, translating raw `notify` events into
//! [`TailerEvent`]s and feeding them into a bounded queue.
//!
//! `notify`'s callback runs on its own internal thread and hands raw events
//! over a plain `std::sync::mpsc` channel; a blocking task drains that
//! channel, filters and translates events, and pushes them into the
//! tokio-backed [`BoundedQueue`]. Translation never blocks, so the bridge
//! stays a simple poll loop rather than needing its own async runtime
//! handle.

use std::path::{Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use relay_core::queue::BoundedQueue;
use relay_core::{log_tailer_warn, ShutdownFlag, TailerEvent};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to start watching {path}: {source}")]
    Start {
        path: PathBuf,
        source: notify::Error,
    },
}

fn is_relevant(path: &Path, csv_dir: &Path, extension: &str) -> bool {
    path.parent() == Some(csv_dir)
        && path
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false)
}

fn translate(event: &notify::Event, csv_dir: &Path, extension: &str) -> Vec<TailerEvent> {
    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .filter(|p| is_relevant(p, csv_dir, extension))
            .map(|p| TailerEvent::Created(p.clone()))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let from = &event.paths[0];
            let to = &event.paths[1];
            match (
                is_relevant(from, csv_dir, extension),
                is_relevant(to, csv_dir, extension),
            ) {
                (true, true) => vec![TailerEvent::Moved {
                    from: from.clone(),
                    to: to.clone(),
                }],
                (true, false) => vec![TailerEvent::Deleted(from.clone())],
                (false, true) => vec![TailerEvent::Created(to.clone())],
                (false, false) => vec![],
            }
        }
        EventKind::Modify(_) => event
            .paths
            .iter()
            .filter(|p| is_relevant(p, csv_dir, extension))
            .map(|p| TailerEvent::Modified(p.clone()))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .filter(|p| is_relevant(p, csv_dir, extension))
            .map(|p| TailerEvent::Deleted(p.clone()))
            .collect(),
        _ => vec![],
    }
}

/// Start watching `csv_dir` non-recursively, translating and forwarding
/// events into `queue` until `shutdown` is set. Runs on a blocking task
/// since `notify`'s watcher and its channel are synchronous.
pub fn spawn_watcher(
    csv_dir: PathBuf,
    csv_extension: String,
    queue: BoundedQueue<TailerEvent>,
    shutdown: ShutdownFlag,
) -> Result<tokio::task::JoinHandle<()>, WatchError> {
    let (raw_tx, raw_rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();

    let mut watcher =
        notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })
        .map_err(|source| WatchError::Start {
            path: csv_dir.clone(),
            source,
        })?;

    watcher
        .watch(&csv_dir, RecursiveMode::NonRecursive)
        .map_err(|source| WatchError::Start {
            path: csv_dir.clone(),
            source,
        })?;

    let handle = tokio::task::spawn_blocking(move || {
        let _watcher = watcher; // keep the watcher alive for the loop's lifetime
        loop {
            if shutdown.is_set() {
                return;
            }
            match raw_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(Ok(event)) => {
                    for tailer_event in translate(&event, &csv_dir, &csv_extension) {
                        if queue.try_put(tailer_event).is_err() {
                            log_tailer_warn!("tailer event queue full, dropping event");
                        }
                    }
                }
                Ok(Err(source)) => {
                    log_tailer_warn!("watcher reported an error", error = %source);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    });

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, paths: Vec<PathBuf>) -> notify::Event {
        notify::Event {
            kind,
            paths,
            attrs: Default::default(),
        }
    }

    #[test]
    fn create_event_filters_to_matching_extension_and_directory() {
        let csv_dir = PathBuf::from("/data/csv");
        let e = event(
            EventKind::Create(notify::event::CreateKind::File),
            vec![
                csv_dir.join("a.csv"),
                csv_dir.join("b.txt"),
                csv_dir.join("sub").join("c.csv"),
            ],
        );
        let translated = translate(&e, &csv_dir, "csv");
        assert_eq!(translated, vec![TailerEvent::Created(csv_dir.join("a.csv"))]);
    }

    #[test]
    fn rename_both_inside_becomes_moved() {
        let csv_dir = PathBuf::from("/data/csv");
        let e = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec![csv_dir.join("old.csv"), csv_dir.join("new.csv")],
        );
        assert_eq!(
            translate(&e, &csv_dir, "csv"),
            vec![TailerEvent::Moved {
                from: csv_dir.join("old.csv"),
                to: csv_dir.join("new.csv"),
            }]
        );
    }

    #[test]
    fn rename_both_moving_out_of_scope_decomposes_to_delete() {
        let csv_dir = PathBuf::from("/data/csv");
        let other_dir = PathBuf::from("/data/elsewhere");
        let e = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec![csv_dir.join("old.csv"), other_dir.join("old.csv")],
        );
        assert_eq!(
            translate(&e, &csv_dir, "csv"),
            vec![TailerEvent::Deleted(csv_dir.join("old.csv"))]
        );
    }

    #[test]
    fn remove_event_becomes_deleted() {
        let csv_dir = PathBuf::from("/data/csv");
        let e = event(
            EventKind::Remove(notify::event::RemoveKind::File),
            vec![csv_dir.join("a.csv")],
        );
        assert_eq!(
            translate(&e, &csv_dir, "csv"),
            vec![TailerEvent::Deleted(csv_dir.join("a.csv"))]
        );
    }
}
