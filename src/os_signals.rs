//! Operator stop requests.
//!
//! On unix SIGINT, SIGTERM and SIGQUIT all count as a stop request. Elsewhere
//! only Ctrl-C does.

#[cfg(unix)]
pub async fn wait_for_stop_request() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_stop_request() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
