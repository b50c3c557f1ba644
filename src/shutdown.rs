use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Installs a handler for SIGTERM and SIGINT.
///
/// Both listeners are registered before the wait task is spawned, so a
/// registration failure surfaces to the caller instead of dying inside a
/// detached task. Returns a token cancelled on the first signal received;
/// every poller and stream worker watches a child of this token, so one
/// signal unwinds the whole process in bounded time.
pub fn install_shutdown_handler() -> Result<CancellationToken> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let token = CancellationToken::new();
    let handler_token = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        }

        handler_token.cancel();
    });

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sigterm_cancels_the_token() {
        let token = install_shutdown_handler().expect("handler registration failed");
        assert!(!token.is_cancelled());

        std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .expect("token not cancelled after SIGTERM");
    }
}
