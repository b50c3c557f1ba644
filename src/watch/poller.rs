//! Discovery poller: keeps the watched set populated with exactly the
//! running allocations of one job.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::api::{AllocationClient, AllocationDetail, ClientStatus};
use crate::config::{JobSpec, WatchConfig};
use crate::error::Result;
use crate::watch::registry::WatchedSet;
use crate::watch::sink::LogLine;
use crate::watch::worker::StreamWorker;

pub struct DiscoveryPoller {
    spec: JobSpec,
    config: WatchConfig,
    client: Arc<dyn AllocationClient>,
    registry: Arc<WatchedSet>,
    lines: mpsc::Sender<LogLine>,
}

impl DiscoveryPoller {
    pub fn new(
        spec: JobSpec,
        config: WatchConfig,
        client: Arc<dyn AllocationClient>,
        registry: Arc<WatchedSet>,
        lines: mpsc::Sender<LogLine>,
    ) -> Self {
        Self {
            spec,
            config,
            client,
            registry,
            lines,
        }
    }

    /// Polls until cancelled. Listing failures are never fatal: they are
    /// logged and retried with exponential backoff capped at
    /// `WatchConfig::max_backoff`, reset on the first success.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut workers: JoinSet<()> = JoinSet::new();
        let mut delay = self.config.poll_interval;

        loop {
            // Reap workers that have already finished.
            while workers.try_join_next().is_some() {}

            match self.poll_once(&mut workers, &cancel).await {
                Ok(()) => delay = self.config.poll_interval,
                Err(e) => {
                    tracing::warn!(
                        job = %self.spec.job,
                        error = %e,
                        retry_in = ?delay,
                        "allocation listing failed"
                    );
                    delay = (delay * 2).min(self.config.max_backoff);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // Workers hold children of `cancel`, which has fired; wait for each
        // to run its release path.
        while workers.join_next().await.is_some() {}
        tracing::debug!(job = %self.spec.job, "discovery poller stopped");
        Ok(())
    }

    /// One discovery cycle: list, filter, claim, spawn.
    async fn poll_once(&self, workers: &mut JoinSet<()>, cancel: &CancellationToken) -> Result<()> {
        let stubs = self.client.list_allocations().await?;

        for stub in stubs {
            if stub.client_status != ClientStatus::Running || stub.job_id != self.spec.job {
                continue;
            }
            if self.registry.contains(&stub.id) {
                continue;
            }

            // The allocation may vanish between listing and this fetch;
            // that is churn, not an error. The next cycle sorts it out.
            let detail = match self.client.get_allocation(&stub.id).await {
                Ok(detail) => detail,
                Err(e) => {
                    tracing::debug!(alloc_id = %stub.id, error = %e, "allocation gone before watch");
                    continue;
                }
            };

            let Some(task) = resolve_task(&self.spec.task, &detail) else {
                tracing::warn!(alloc_id = %stub.id, "allocation has no tasks, skipping");
                continue;
            };

            // Lost race with a concurrent cycle, or cooldown: drop the detail.
            if !self.registry.try_claim(&stub.id) {
                continue;
            }

            tracing::info!(job = %self.spec.job, alloc_id = %stub.id, task = %task, "watching allocation");
            let worker = StreamWorker::new(
                detail,
                task,
                Arc::clone(&self.registry),
                self.lines.clone(),
            );
            workers.spawn(worker.run(Arc::clone(&self.client), cancel.child_token()));
        }

        Ok(())
    }
}

/// Picks the task to stream: the configured one, or the allocation's first
/// task when the spec leaves it empty.
fn resolve_task(spec_task: &str, detail: &AllocationDetail) -> Option<String> {
    if !spec_task.is_empty() {
        return Some(spec_task.to_string());
    }
    detail.task_names.iter().next().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn detail(tasks: &[&str]) -> AllocationDetail {
        AllocationDetail {
            id: "a1".to_string(),
            job_id: "svc".to_string(),
            task_group: "web".to_string(),
            task_names: tasks.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn resolve_task_prefers_spec() {
        assert_eq!(
            resolve_task("worker", &detail(&["other"])),
            Some("worker".to_string())
        );
    }

    #[test]
    fn resolve_task_falls_back_to_first_task() {
        assert_eq!(
            resolve_task("", &detail(&["worker", "sidecar"])),
            Some("sidecar".to_string())
        );
    }

    #[test]
    fn resolve_task_none_without_tasks() {
        assert_eq!(resolve_task("", &detail(&[])), None);
    }
}
