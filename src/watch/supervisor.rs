//! Scatter/gather supervision of the discovery pollers and the sink.
//!
//! One poller task per configured job, all started concurrently. The policy
//! is all-or-nothing: the first fatal poller error (or panic) cancels every
//! sibling, and a shutdown signal cancels everything. Nothing is restarted
//! within a single invocation.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::api::AllocationClient;
use crate::config::{JobSpec, WatchConfig};
use crate::error::{Result, TailError};
use crate::watch::poller::DiscoveryPoller;
use crate::watch::registry::WatchedSet;
use crate::watch::sink::LineSink;

pub struct Supervisor {
    config: WatchConfig,
    client: Arc<dyn AllocationClient>,
}

impl Supervisor {
    pub fn new(config: WatchConfig, client: Arc<dyn AllocationClient>) -> Self {
        Self { config, client }
    }

    /// Runs pollers for every spec until a fatal error or `shutdown` fires.
    ///
    /// Returns `Ok(())` on signal-driven shutdown and the first fatal error
    /// otherwise. Buffered log lines are flushed before returning.
    pub async fn run<W>(
        &self,
        specs: Vec<JobSpec>,
        shutdown: CancellationToken,
        out: W,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        if specs.is_empty() {
            return Err(TailError::NoJobsConfigured);
        }

        // An unreachable backend at first contact is a startup error; only
        // failures after this probe are retried by the pollers.
        self.client.list_allocations().await?;

        let registry = Arc::new(WatchedSet::new(self.config.claim_cooldown));
        let (lines_tx, lines_rx) = mpsc::channel(self.config.sink_capacity);
        let mut sink = tokio::spawn(LineSink::new(out).run(lines_rx));

        let cancel = shutdown.child_token();
        let mut pollers = JoinSet::new();
        for spec in specs {
            tracing::info!(job = %spec.job, task = %spec.task, "starting discovery poller");
            let poller = DiscoveryPoller::new(
                spec,
                self.config.clone(),
                Arc::clone(&self.client),
                Arc::clone(&registry),
                lines_tx.clone(),
            );
            pollers.spawn(poller.run(cancel.child_token()));
        }
        // Workers hold the only remaining senders once the pollers are up;
        // the sink drains and exits when the last of them is gone.
        drop(lines_tx);

        let mut result = Ok(());
        let mut sink_result = None;
        loop {
            tokio::select! {
                joined = pollers.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::error!(error = %e, "discovery poller failed, stopping all watchers");
                            if result.is_ok() {
                                result = Err(e);
                            }
                            cancel.cancel();
                        }
                        Err(join_err) => {
                            tracing::error!(error = %join_err, "discovery poller panicked, stopping all watchers");
                            if result.is_ok() {
                                result = Err(TailError::TaskPanic(join_err.to_string()));
                            }
                            cancel.cancel();
                        }
                    }
                }
                // A sink that exits while pollers are still up has lost its
                // writer; without it every watcher would stream into a full
                // queue forever, so treat it like any other fatal failure.
                joined = &mut sink, if sink_result.is_none() => {
                    tracing::error!("log sink exited, stopping all watchers");
                    sink_result = Some(joined);
                    cancel.cancel();
                }
            }
        }

        let sink_joined = match sink_result {
            Some(joined) => joined,
            None => sink.await,
        };
        match sink_joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if result.is_ok() {
                    result = Err(e.into());
                }
            }
            Err(join_err) => {
                if result.is_ok() {
                    result = Err(TailError::TaskPanic(join_err.to_string()));
                }
            }
        }
        result
    }
}
