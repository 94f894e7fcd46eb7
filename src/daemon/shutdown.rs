use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            warn!("Can't listen for SIGTERM {e}");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await
}

/// Detects signals sent to the process, or returns early when something else already
/// cancelled `cancelation`.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C");
            cancelation.cancel();
        },
        _ = terminate_signal() => {
            info!("Received SIGTERM");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
