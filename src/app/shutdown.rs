//! Graceful shutdown handling.

use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Waits for Ctrl+C (or SIGTERM on Unix) and then cancels `cancel`.
///
/// Returns early without logging if `cancel` fires first.
pub async fn wait_for_shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = terminate_requested() => {
            info!("Shutdown signal received, stopping service");
        }
    }
    cancel.cancel();
}

#[cfg(unix)]
async fn terminate_requested() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_requested() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Shuts down all background tasks gracefully.
///
/// Cancels the shared token, then awaits the scheduler (which may be in the
/// middle of a refresh step) and the cache and limiter janitors.
pub async fn shutdown_gracefully(
    cancel: CancellationToken,
    scheduler: JoinHandle<()>,
    janitors: Vec<JoinHandle<()>>,
) {
    cancel.cancel();

    if let Err(e) = scheduler.await {
        warn!("Update scheduler task ended abnormally: {}", e);
    }
    for janitor in janitors {
        let _ = janitor.await;
    }
    info!("Background tasks stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_listener_returns_when_cancelled() {
        let cancel = CancellationToken::new();
        let listener = tokio::spawn(wait_for_shutdown_signal(cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .expect("listener should return after cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_tasks() {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let scheduler = tokio::spawn(async move { token.cancelled().await });
        let token = cancel.clone();
        let janitor = tokio::spawn(async move { token.cancelled().await });

        shutdown_gracefully(cancel.clone(), scheduler, vec![janitor]).await;
        assert!(cancel.is_cancelled());
    }
}
