//! Backend capability surface the watch loop consumes.
//!
//! The core never talks to Nomad directly; it goes through
//! [`AllocationClient`], which the binary wires to one of two transports:
//!
//! - [`http::HttpClient`]: the Nomad HTTP API, including the follow-mode
//!   log streaming endpoint
//! - [`exec::ExecTransport`]: shells out to the `nomad` CLI (optionally
//!   behind a wrapper such as `vagrant ssh ... --`) and scans its output
//!
//! Both yield the same [`LogStream`] shape: a frame channel and an error
//! channel per log source. Closure of the frame channel without an error is
//! the normal end of a stream.

pub mod exec;
pub mod http;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::{Result, TailError};

/// Client-side status of an allocation as reported by discovery listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Lost,
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientStatus::Pending => write!(f, "pending"),
            ClientStatus::Running => write!(f, "running"),
            ClientStatus::Complete => write!(f, "complete"),
            ClientStatus::Failed => write!(f, "failed"),
            ClientStatus::Lost => write!(f, "lost"),
        }
    }
}

/// Lightweight allocation entry returned by a discovery listing.
/// Refreshed on every poll cycle.
#[derive(Debug, Clone, Deserialize)]
pub struct AllocationStub {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "JobID")]
    pub job_id: String,
    #[serde(rename = "ClientStatus")]
    pub client_status: ClientStatus,
}

/// Full allocation record, fetched once a stub is selected for watching.
#[derive(Debug, Clone)]
pub struct AllocationDetail {
    pub id: String,
    pub job_id: String,
    pub task_group: String,
    pub task_names: BTreeSet<String>,
}

/// Which process stream a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Stdout,
    Stderr,
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSource::Stdout => write!(f, "stdout"),
            LogSource::Stderr => write!(f, "stderr"),
        }
    }
}

/// A live log stream for one allocation task and one [`LogSource`].
///
/// Frames are raw byte chunks that may hold zero or more newline-terminated
/// lines. The transport closes `frames` when the stream ends cleanly and
/// sends on `errors` when it ends abnormally.
pub struct LogStream {
    pub frames: mpsc::Receiver<Bytes>,
    pub errors: mpsc::Receiver<TailError>,
}

impl LogStream {
    /// Builds a stream plus the sender halves a transport pumps into.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Bytes>, mpsc::Sender<TailError>, LogStream) {
        let (frame_tx, frames) = mpsc::channel(capacity);
        let (error_tx, errors) = mpsc::channel(1);
        (frame_tx, error_tx, LogStream { frames, errors })
    }
}

/// What the watch loop needs from the orchestrator backend.
#[async_trait]
pub trait AllocationClient: Send + Sync {
    /// List all currently visible allocations.
    async fn list_allocations(&self) -> Result<Vec<AllocationStub>>;

    /// Fetch the full record for one allocation.
    async fn get_allocation(&self, id: &str) -> Result<AllocationDetail>;

    /// Open a follow-from-end log stream for one task of an allocation.
    async fn stream_logs(
        &self,
        alloc: &AllocationDetail,
        task: &str,
        source: LogSource,
    ) -> Result<LogStream>;
}
