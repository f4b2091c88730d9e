//! Signal handling for orderly shutdown
//!
//! The operator interrupt is the only external way to end a run; the
//! listen loop re-locks (gated runs) before the process exits.

use tracing::debug;

/// Wait for SIGTERM or SIGINT.
#[cfg(unix)]
pub async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigint =
        signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            debug!("received SIGTERM");
        }
        _ = sigint.recv() => {
            debug!("received SIGINT");
        }
    }
}

/// Wait for Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    debug!("received interrupt");
}
