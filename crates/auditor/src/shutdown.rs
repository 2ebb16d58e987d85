use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Create a `CancellationToken` and spawn a task that cancels it on
/// SIGINT or SIGTERM. Returns the token so callers can hand it to the
/// audit runner.
pub fn create_shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        token_clone.cancel();
    });

    token
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
///
/// If a handler cannot be installed the other one still works; if neither
/// can, this never returns and the process stops only when its work ends.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!(signal = "SIGINT", "shutdown requested"),
            Err(e) => {
                error!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!(signal = "SIGTERM", "shutdown requested");
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
