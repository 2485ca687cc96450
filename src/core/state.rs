//! Shutdown state for long-running commands.
//!
//! `SHUTDOWN` is set by the Ctrl+C handler. Commands that run until
//! interrupted (`publish --watch`, `follow`) subscribe with [`on_shutdown`]
//! and stop their loops when the signal arrives.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

/// Shutdown has been requested (Ctrl+C received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Subscribers woken on shutdown
static SUBSCRIBERS: Mutex<Vec<Sender<()>>> = Mutex::new(Vec::new());

/// Setup the global Ctrl+C handler. Call once at program start
///
/// Without subscribers (one-shot commands) the process exits immediately;
/// otherwise every subscriber is notified and the process exits once the
/// command has wound down.
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        SHUTDOWN.store(true, Ordering::SeqCst);

        let subscribers = std::mem::take(&mut *SUBSCRIBERS.lock());
        if subscribers.is_empty() {
            std::process::exit(130);
        }
        crate::log!("watch"; "shutting down...");
        for tx in subscribers {
            let _ = tx.send(());
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Receiver that yields once shutdown is requested.
///
/// Already resolved if shutdown happened before the call.
pub fn on_shutdown() -> Receiver<()> {
    let (tx, rx) = bounded(1);
    if is_shutdown() {
        let _ = tx.send(());
    } else {
        SUBSCRIBERS.lock().push(tx);
    }
    rx
}

/// Check if shutdown has been requested
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

#[cfg(test)]
fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
    for tx in std::mem::take(&mut *SUBSCRIBERS.lock()) {
        let _ = tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_wakes_subscribers() {
        let early = on_shutdown();
        assert!(early.try_recv().is_err() || is_shutdown());

        request_shutdown();
        assert!(is_shutdown());
        assert!(early.recv_timeout(Duration::from_secs(1)).is_ok());

        // Late subscribers resolve immediately
        let late = on_shutdown();
        assert!(late.try_recv().is_ok());
    }
}
