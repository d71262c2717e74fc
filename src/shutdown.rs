//! SIGINT/SIGTERM handling.
//!
//! The handler only flips the cancellation token. Drivers observe it at the
//! top of each batch and poll iteration, so the open connection is always
//! finished and closed by its owner.

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawn a task that cancels `token` on the first interrupt or terminate.
pub fn install(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            res = wait_for_signal() => match res {
                Ok(()) => {
                    tracing::info!("shutdown signal received, finishing current step");
                    token.cancel();
                }
                Err(e) => tracing::warn!(error = %e, "signal handler unavailable"),
            },
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).context("register SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("register SIGTERM handler")?;
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await.context("listen for ctrl-c")?;
    Ok(())
}
