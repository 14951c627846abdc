use shared::AbortSignal;
use tokio::task::JoinHandle;

/// Raise `signal` on the first Ctrl-C; a second one exits immediately.
/// A running command is never interrupted by the first press: the engine
/// notices the flag at its next checkpoint.
pub fn spawn_abort_listener(signal: AbortSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                return;
            }
            if signal.is_raised() {
                std::process::exit(130);
            }
            eprintln!("\nAborting after the current step (Ctrl-C again to quit)...");
            signal.raise();
        }
    })
}
