//! Fan-in sink for log lines from all stream workers.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::api::LogSource;

/// One decoded log line, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Identifies the job plus a short allocation ID suffix, so interleaved
    /// output from multiple allocations stays readable.
    pub label: String,
    pub source: LogSource,
    pub text: String,
}

fn render(line: &LogLine) -> String {
    format!("{}: {}\n", line.label, line.text)
}

/// Single consumer funneling every worker's lines to one output.
///
/// Workers feed the bounded queue and block when it fills; backpressure over
/// dropped lines. Interleaving across workers follows arrival order, only
/// per-worker ordering is meaningful.
pub struct LineSink<W> {
    out: W,
}

impl<W: AsyncWrite + Unpin> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Writes lines until every sender is gone, then flushes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<LogLine>) -> std::io::Result<()> {
        while let Some(line) = rx.recv().await {
            self.out.write_all(render(&line).as_bytes()).await?;
        }
        self.out.flush().await?;
        Ok(())
    }
}
