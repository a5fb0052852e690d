use std::sync::{Arc, Weak};

use console::Term;
use tandem::sync::SyncOrchestrator;

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C asks every running task to stop at its next batch
/// boundary, which leaves a checkpoint behind for `tandem recover`. A second
/// Ctrl+C exits immediately.
pub(crate) fn setup_shutdown_handler(orchestrator: &Arc<SyncOrchestrator>) {
    let orchestrator: Weak<SyncOrchestrator> = Arc::downgrade(orchestrator);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing the current batch...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing the current batch");
        }

        if let Some(orchestrator) = orchestrator.upgrade() {
            let cancelled = orchestrator.cancel_all();
            tracing::info!(cancelled, "Cancellation requested for running tasks");
        }

        // Wait for second Ctrl+C for force quit
        if tokio::signal::ctrl_c().await.is_ok() {
            if is_tty {
                eprintln!("Force quit!");
            }
            std::process::exit(130);
        }
    });
}
