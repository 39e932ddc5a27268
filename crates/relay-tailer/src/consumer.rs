//! Per-file tail state and line parsing, driven by [`TailerEvent`]s.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use relay_core::queue::BoundedQueue;
use relay_core::types::parse_csv_line;
use relay_core::{log_tailer_info, log_tailer_warn, FileSystem, TailerEvent};

#[derive(Debug, Default)]
struct TailState {
    last_read_offset: u64,
    residual_buffer: Vec<u8>,
}

/// Maintains `path -> {offset, residual_buffer}` and turns newly appended
/// bytes into parsed lines, forwarding extracted filepaths to the move
/// queue. All public behavior is exercised through [`Self::handle_event`]
/// so watcher and consumer can be tested independently of each other.
#[derive(Default)]
pub struct CsvConsumer {
    per_file: HashMap<PathBuf, TailState>,
}

impl CsvConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn handle_event(
        &mut self,
        event: &TailerEvent,
        fs: &dyn FileSystem,
        move_queue: &BoundedQueue<PathBuf>,
    ) {
        match event {
            TailerEvent::InitialFound(path) | TailerEvent::Created(path) => {
                self.handle_initial(path, fs)
            }
            TailerEvent::Deleted(path) => {
                self.per_file.remove(path);
            }
            TailerEvent::Moved { from, to } => {
                self.per_file.remove(from);
                self.handle_initial(to, fs);
            }
            TailerEvent::Modified(path) => {
                if self.per_file.contains_key(path) {
                    self.handle_modified(path, fs, move_queue).await;
                } else {
                    // An untracked path being modified is indistinguishable
                    // from it having just been created.
                    self.handle_initial(path, fs);
                }
            }
        }
    }

    fn handle_initial(&mut self, path: &Path, fs: &dyn FileSystem) {
        match fs.stat(path) {
            Ok(meta) => {
                self.per_file.insert(
                    path.to_path_buf(),
                    TailState {
                        last_read_offset: meta.size,
                        residual_buffer: Vec::new(),
                    },
                );
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                log_tailer_warn!("failed to stat newly observed csv file", path = %path.display(), error = %e);
            }
        }
    }

    async fn handle_modified(
        &mut self,
        path: &Path,
        fs: &dyn FileSystem,
        move_queue: &BoundedQueue<PathBuf>,
    ) {
        let meta = match fs.stat(path) {
            Ok(m) => m,
            Err(e) if e.is_not_found() => {
                self.per_file.remove(path);
                return;
            }
            Err(e) => {
                log_tailer_warn!("failed to stat csv file on modify", path = %path.display(), error = %e);
                return;
            }
        };

        let last_read_offset = self
            .per_file
            .get(path)
            .map(|s| s.last_read_offset)
            .unwrap_or(0);

        if meta.size < last_read_offset {
            if let Some(state) = self.per_file.get_mut(path) {
                log_tailer_info!("csv file truncated, resetting read offset", path = %path.display());
                state.last_read_offset = meta.size;
                state.residual_buffer.clear();
            }
            return;
        }

        if meta.size == last_read_offset {
            return;
        }

        let contents = match fs.read(path) {
            Ok(c) => c,
            Err(e) if e.is_not_found() => {
                self.per_file.remove(path);
                return;
            }
            Err(e) => {
                log_tailer_warn!("failed to read csv file on modify", path = %path.display(), error = %e);
                return;
            }
        };

        let start = (last_read_offset as usize).min(contents.len());
        let new_bytes = &contents[start..];

        if let Some(state) = self.per_file.get_mut(path) {
            state.residual_buffer.extend_from_slice(new_bytes);
            state.last_read_offset = meta.size;
        }

        self.flush_complete_lines(path, move_queue).await;
    }

    /// Split the residual buffer on complete lines and enqueue each parsed
    /// filepath via a bounded blocking put, honoring the same backpressure
    /// discipline the scanner uses for its own MoveQueue emissions. Parks
    /// waiting for the mover to drain the queue rather than dropping a
    /// file silently.
    async fn flush_complete_lines(&mut self, path: &Path, move_queue: &BoundedQueue<PathBuf>) {
        loop {
            let line = {
                let Some(state) = self.per_file.get_mut(path) else {
                    return;
                };
                let Some(newline_pos) = state.residual_buffer.iter().position(|&b| b == b'\n')
                else {
                    return;
                };
                let line_bytes: Vec<u8> = state.residual_buffer.drain(..=newline_pos).collect();
                String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]).into_owned()
            };

            match parse_csv_line(&line) {
                Ok(parsed) => {
                    if move_queue.put_blocking(parsed.filepath.clone()).await.is_err() {
                        log_tailer_warn!("move queue closed while enqueueing parsed csv line", filepath = %parsed.filepath.display());
                    }
                }
                Err(e) => {
                    log_tailer_warn!("failed to parse csv line, skipping", path = %path.display(), error = %e);
                }
            }
        }
    }
}
