//! Per-allocation stream worker.
//!
//! A worker's life is bounded by its allocation's: it opens the stdout and
//! stderr streams, forwards decoded lines to the sink, and dies on the first
//! stream closure, stream error, or cancellation. It never retries; if the
//! allocation is still running, the next discovery poll picks it up again.
//! The registry claim handed over at spawn is released on every exit path.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{AllocationClient, AllocationDetail, LogSource, LogStream};
use crate::watch::registry::WatchedSet;
use crate::watch::sink::LogLine;

/// Releases the registry claim when dropped, so the slot is freed even if
/// the worker unwinds through a panic.
struct ClaimGuard {
    registry: Arc<WatchedSet>,
    id: String,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.registry.release(&self.id);
    }
}

pub struct StreamWorker {
    alloc: AllocationDetail,
    task: String,
    label: String,
    registry: Arc<WatchedSet>,
    lines: tokio::sync::mpsc::Sender<LogLine>,
}

impl StreamWorker {
    /// The caller must hold the registry claim for `alloc.id`; ownership of
    /// that claim transfers to the worker here.
    pub fn new(
        alloc: AllocationDetail,
        task: String,
        registry: Arc<WatchedSet>,
        lines: tokio::sync::mpsc::Sender<LogLine>,
    ) -> Self {
        let label = format!("{}[{}]", alloc.job_id, short_id(&alloc.id));
        Self {
            alloc,
            task,
            label,
            registry,
            lines,
        }
    }

    /// Streams both log sources until one ends, errors, or `cancel` fires.
    pub async fn run(self, client: Arc<dyn AllocationClient>, cancel: CancellationToken) {
        let _claim = ClaimGuard {
            registry: Arc::clone(&self.registry),
            id: self.alloc.id.clone(),
        };

        let stdout = match client
            .stream_logs(&self.alloc, &self.task, LogSource::Stdout)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(alloc_id = %self.alloc.id, error = %e, "could not open stdout stream");
                return;
            }
        };
        let stderr = match client
            .stream_logs(&self.alloc, &self.task, LogSource::Stderr)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(alloc_id = %self.alloc.id, error = %e, "could not open stderr stream");
                return;
            }
        };

        tracing::info!(
            alloc_id = %self.alloc.id,
            job = %self.alloc.job_id,
            task = %self.task,
            "streaming allocation logs"
        );
        self.multiplex(stdout, stderr, cancel).await;
        tracing::debug!(alloc_id = %self.alloc.id, "stream worker done");
    }

    /// First-available-wins merge of the four stream events plus cancellation.
    /// No event is dropped: buffered frames drain before a closed frame
    /// channel reports end-of-stream.
    async fn multiplex(&self, mut stdout: LogStream, mut stderr: LogStream, cancel: CancellationToken) {
        // An error channel closing without an error is not terminal; only the
        // frame channels decide the clean end of a stream.
        let mut stdout_errs_open = true;
        let mut stderr_errs_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                frame = stdout.frames.recv() => match frame {
                    Some(frame) => {
                        if self.forward(&frame, LogSource::Stdout).await.is_err() {
                            return;
                        }
                    }
                    None => {
                        tracing::debug!(alloc_id = %self.alloc.id, "stdout stream closed");
                        return;
                    }
                },
                frame = stderr.frames.recv() => match frame {
                    Some(frame) => {
                        if self.forward(&frame, LogSource::Stderr).await.is_err() {
                            return;
                        }
                    }
                    None => {
                        tracing::debug!(alloc_id = %self.alloc.id, "stderr stream closed");
                        return;
                    }
                },
                err = stdout.errors.recv(), if stdout_errs_open => match err {
                    Some(err) => {
                        tracing::debug!(alloc_id = %self.alloc.id, error = %err, "stdout stream ended");
                        return;
                    }
                    None => stdout_errs_open = false,
                },
                err = stderr.errors.recv(), if stderr_errs_open => match err {
                    Some(err) => {
                        tracing::debug!(alloc_id = %self.alloc.id, error = %err, "stderr stream ended");
                        return;
                    }
                    None => stderr_errs_open = false,
                },
            }
        }
    }

    /// Splits a frame into lines and sends them to the sink, blocking when
    /// the sink queue is full. Err means the sink is gone.
    async fn forward(&self, frame: &[u8], source: LogSource) -> Result<(), ()> {
        for text in split_frame(frame) {
            let line = LogLine {
                label: self.label.clone(),
                source,
                text,
            };
            if self.lines.send(line).await.is_err() {
                return Err(());
            }
        }
        Ok(())
    }
}

/// Splits a raw frame into newline-delimited segments, dropping empty ones.
pub(crate) fn split_frame(frame: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(frame)
        .split('\n')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn split_frame_drops_empty_segments() {
        assert_eq!(split_frame(b"line1\nline2\n\n"), vec!["line1", "line2"]);
    }

    #[test]
    fn split_frame_keeps_unterminated_tail() {
        assert_eq!(split_frame(b"a\npartial"), vec!["a", "partial"]);
    }

    #[test]
    fn split_frame_empty_input() {
        assert!(split_frame(b"").is_empty());
        assert!(split_frame(b"\n\n").is_empty());
    }

    #[test]
    fn short_id_truncates_long_ids() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("a1"), "a1");
    }

    #[test]
    fn worker_label_includes_job_and_alloc_prefix() {
        let alloc = AllocationDetail {
            id: "0123456789abcdef".to_string(),
            job_id: "svc".to_string(),
            task_group: "web".to_string(),
            task_names: BTreeSet::new(),
        };
        let registry = Arc::new(WatchedSet::new(std::time::Duration::ZERO));
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let worker = StreamWorker::new(alloc, "worker".to_string(), registry, tx);
        assert_eq!(worker.label, "svc[01234567]");
    }
}
