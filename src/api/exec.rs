//! Process-exec transport variant.
//!
//! Instead of the HTTP streaming endpoint, this transport shells out to the
//! `nomad` CLI (`nomad alloc logs -f ...`) and scans its output line by line.
//! The command prefix is configurable so the binary can run behind wrappers
//! like `vagrant ssh client -- nomad`. Discovery calls are delegated to an
//! inner client; only the log streaming path is replaced.

use std::process::Stdio;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::api::{AllocationClient, AllocationDetail, AllocationStub, LogSource, LogStream};
use crate::error::{Result, TailError};

const FRAME_CHANNEL_CAPACITY: usize = 32;

/// [`AllocationClient`] that streams logs through an external command.
pub struct ExecTransport<C> {
    inner: C,
    command: Vec<String>,
}

impl<C> ExecTransport<C> {
    /// `command` is the leading argv for the CLI, e.g. `["nomad"]` or
    /// `["vagrant", "ssh", "client", "--", "nomad"]`.
    pub fn new(inner: C, command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(TailError::EmptyExecCommand);
        }
        Ok(Self { inner, command })
    }

    fn log_argv(&self, alloc_id: &str, task: &str, source: LogSource) -> Vec<String> {
        let mut argv = self.command.clone();
        argv.extend(["alloc", "logs", "-f", "-tail"].map(String::from));
        if source == LogSource::Stderr {
            argv.push("-stderr".to_string());
        }
        argv.push(alloc_id.to_string());
        if !task.is_empty() {
            argv.push(task.to_string());
        }
        argv
    }
}

#[async_trait::async_trait]
impl<C: AllocationClient> AllocationClient for ExecTransport<C> {
    async fn list_allocations(&self) -> Result<Vec<AllocationStub>> {
        self.inner.list_allocations().await
    }

    async fn get_allocation(&self, id: &str) -> Result<AllocationDetail> {
        self.inner.get_allocation(id).await
    }

    async fn stream_logs(
        &self,
        alloc: &AllocationDetail,
        task: &str,
        source: LogSource,
    ) -> Result<LogStream> {
        let argv = self.log_argv(&alloc.id, task, source);
        tracing::debug!(command = ?argv, alloc_id = %alloc.id, "spawning log command");

        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        Ok(scan_child(child, argv.join(" ")))
    }
}

/// Turns a spawned child's stdout into a [`LogStream`].
///
/// Each output line becomes one frame. A non-zero exit or a read failure is
/// reported on the error channel; a clean exit closes the frame channel.
fn scan_child(mut child: Child, command: String) -> LogStream {
    let (frame_tx, error_tx, stream) = LogStream::channel(FRAME_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let Some(stdout) = child.stdout.take() else {
            let _ = error_tx
                .send(TailError::ExecExit {
                    command,
                    code: None,
                })
                .await;
            return;
        };

        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(mut line)) => {
                    line.push('\n');
                    if frame_tx.send(Bytes::from(line)).await.is_err() {
                        // Worker is gone; kill_on_drop reaps the child.
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = error_tx.send(e.into()).await;
                    return;
                }
            }
        }

        report_exit(child, command, error_tx).await;
    });

    stream
}

async fn report_exit(mut child: Child, command: String, error_tx: mpsc::Sender<TailError>) {
    match child.wait().await {
        Ok(status) if status.success() => {}
        Ok(status) => {
            let _ = error_tx
                .send(TailError::ExecExit {
                    command,
                    code: status.code(),
                })
                .await;
        }
        Err(e) => {
            let _ = error_tx.send(e.into()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    struct NoBackend;

    #[async_trait::async_trait]
    impl AllocationClient for NoBackend {
        async fn list_allocations(&self) -> Result<Vec<AllocationStub>> {
            Ok(Vec::new())
        }

        async fn get_allocation(&self, id: &str) -> Result<AllocationDetail> {
            Ok(AllocationDetail {
                id: id.to_string(),
                job_id: "svc".to_string(),
                task_group: "web".to_string(),
                task_names: BTreeSet::new(),
            })
        }

        async fn stream_logs(
            &self,
            _alloc: &AllocationDetail,
            _task: &str,
            _source: LogSource,
        ) -> Result<LogStream> {
            unimplemented!("exec transport handles streaming")
        }
    }

    fn sh(script: &str) -> Child {
        Command::new("sh")
            .args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[test]
    fn log_argv_shape() {
        let transport = ExecTransport::new(NoBackend, vec!["nomad".to_string()]).unwrap();
        assert_eq!(
            transport.log_argv("a1", "worker", LogSource::Stdout),
            vec!["nomad", "alloc", "logs", "-f", "-tail", "a1", "worker"]
        );
        assert_eq!(
            transport.log_argv("a1", "", LogSource::Stderr),
            vec!["nomad", "alloc", "logs", "-f", "-tail", "-stderr", "a1"]
        );
    }

    #[test]
    fn log_argv_with_wrapper_prefix() {
        let prefix = ["vagrant", "ssh", "client", "--", "nomad"]
            .map(String::from)
            .to_vec();
        let transport = ExecTransport::new(NoBackend, prefix).unwrap();
        let argv = transport.log_argv("a1", "worker", LogSource::Stdout);
        assert_eq!(&argv[..5], ["vagrant", "ssh", "client", "--", "nomad"]);
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(
            ExecTransport::new(NoBackend, Vec::new()),
            Err(TailError::EmptyExecCommand)
        ));
    }

    #[tokio::test]
    async fn scan_lines_then_clean_close() {
        let mut stream = scan_child(sh("printf 'one\\ntwo\\n'"), "test".to_string());

        assert_eq!(&stream.frames.recv().await.unwrap()[..], b"one\n");
        assert_eq!(&stream.frames.recv().await.unwrap()[..], b"two\n");
        assert!(stream.frames.recv().await.is_none());
        assert!(stream.errors.recv().await.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_reported_on_error_channel() {
        let mut stream = scan_child(sh("printf 'boom\\n'; exit 3"), "test".to_string());

        assert_eq!(&stream.frames.recv().await.unwrap()[..], b"boom\n");
        match stream.errors.recv().await {
            Some(TailError::ExecExit { code, .. }) => assert_eq!(code, Some(3)),
            other => panic!("expected ExecExit, got {other:?}"),
        }
    }
}
