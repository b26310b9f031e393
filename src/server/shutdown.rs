//! Shutdown coordinator
//!
//! One process-wide lifecycle object. `shutdown()` is idempotent: the first
//! call flips the shutting-down flag and wakes every acceptor and session
//! blocked on I/O; each task then exits its loop and drops its socket, which
//! is how listeners and connections get closed. Every component consults
//! [`ShutdownCoordinator::is_shutting_down`] before reporting an I/O failure,
//! since failures observed during shutdown are expected.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Process-wide shutdown state shared by acceptors and sessions
#[derive(Debug)]
pub struct ShutdownCoordinator {
    notify: watch::Sender<bool>,
    shutting_down: AtomicBool,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the running state
    pub fn new() -> Self {
        let (notify, _) = watch::channel(false);
        Self {
            notify,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Initiate shutdown
    ///
    /// Idempotent; only the first call has any effect. After it returns,
    /// every [`ShutdownSignal`] resolves promptly, unblocking pending accepts
    /// and reads.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutting down broker");
        // Receivers may all be gone already if every task has exited
        let _ = self.notify.send(true);
    }

    /// Whether shutdown has been initiated
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// A signal for one task to select against its blocking I/O
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.notify.subscribe(),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once shutdown is initiated
///
/// Each acceptor and session holds its own signal and races it against the
/// accept or read it is blocked on.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait until shutdown is initiated
    ///
    /// Returns immediately if it already was.
    pub async fn triggered(&mut self) {
        // wait_for only errs when the coordinator is dropped; treat that as
        // shutdown too
        let _ = self.rx.wait_for(|&down| down).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_shutdown_resolves_signals() {
        let coordinator = ShutdownCoordinator::new();
        let mut signal = coordinator.signal();

        assert!(!coordinator.is_shutting_down());
        coordinator.shutdown();
        assert!(coordinator.is_shutting_down());

        tokio::time::timeout(Duration::from_secs(1), signal.triggered())
            .await
            .expect("signal should resolve after shutdown");
    }

    #[tokio::test]
    async fn test_signal_taken_after_shutdown_resolves_immediately() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.shutdown();

        let mut signal = coordinator.signal();
        tokio::time::timeout(Duration::from_secs(1), signal.triggered())
            .await
            .expect("late signal should resolve immediately");
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.shutdown();
        coordinator.shutdown();
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn test_signal_pending_while_running() {
        let coordinator = ShutdownCoordinator::new();
        let mut signal = coordinator.signal();

        let raced = tokio::time::timeout(Duration::from_millis(50), signal.triggered()).await;
        assert!(raced.is_err(), "signal must not resolve before shutdown");
    }
}
