#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancels `token` on SIGINT or SIGTERM. Returns immediately; the watcher
/// runs on its own task until a signal arrives or the token is cancelled.
pub fn spawn_signal_watcher(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = wait_for_signal() => {
                info!("Initiating graceful shutdown");
                token.cancel();
            }
            () = token.cancelled() => {}
        }
    })
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match unix_signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!("Failed to create SIGTERM handler: {}", err);
                wait_for_ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            () = wait_for_ctrl_c() => {}
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT (Ctrl+C)"),
        Err(err) => {
            error!("Failed to listen for SIGINT: {}", err);
            // Without a handler only an external cancel can stop us.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watcher_exits_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let watcher = spawn_signal_watcher(token.clone());

        token.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(1), watcher)
            .await
            .expect("watcher should stop")
            .unwrap();
    }
}
