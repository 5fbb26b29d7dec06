//! Graceful Shutdown Handler
//!
//! The controller runs two long-lived tasks: the event reactor draining the
//! southbound event queue, and the utilization monitor polling the reference
//! port. Both subscribe here for cancellation and hold a guard while running.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::Notify;

/// Cancellation and drain point for the reactor and the monitor.
///
/// The reactor stops taking events once cancelled, after finishing the one in
/// hand. The monitor stops between cycles or while waiting between its two
/// samples, never between the promote and demote installs of a pairing.
#[derive(Clone)]
pub struct ShutdownController {
    /// Set once, normally by the signal handler
    shutdown_initiated: Arc<AtomicBool>,
    /// Reactor and monitor loops still running
    active_tasks: Arc<AtomicUsize>,
    /// Wakes each loop's `select!`
    shutdown_tx: broadcast::Sender<()>,
    /// Fired when the last loop drops its guard after cancellation
    drain_complete: Arc<Notify>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            active_tasks: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            drain_complete: Arc::new(Notify::new()),
        }
    }

    /// Subscribe to shutdown notifications.
    ///
    /// A receiver created after [`shutdown`](Self::shutdown) never sees the
    /// signal, so check [`is_shutdown`](Self::is_shutdown) after subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Cancel the reactor and the monitor. Later calls do nothing.
    pub fn shutdown(&self) {
        if !self.shutdown_initiated.swap(true, Ordering::SeqCst) {
            tracing::info!("initiating graceful shutdown");
            let _ = self.shutdown_tx.send(());
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    fn task_started(&self) {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
    }

    fn task_ended(&self) {
        let prev = self.active_tasks.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 && self.is_shutdown() {
            self.drain_complete.notify_waiters();
        }
    }

    /// Wait until the reactor and the monitor have both returned, or give up
    /// after `timeout` leaving any half-applied pairing in place.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let notified = self.drain_complete.notified();
        if self.active_tasks() == 0 {
            return true;
        }

        tokio::select! {
            _ = notified => true,
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(
                    "drain timeout: {} tasks still running",
                    self.active_tasks()
                );
                false
            }
        }
    }

    /// Count a reactor or monitor loop as running until the guard is dropped.
    pub fn task_guard(&self) -> TaskGuard {
        self.task_started();
        TaskGuard {
            controller: self.clone(),
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by the reactor and monitor loops for their whole run.
pub struct TaskGuard {
    controller: ShutdownController,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.controller.task_ended();
    }
}

/// Resolve on Ctrl+C or SIGTERM and cancel both controller tasks.
#[cfg_attr(coverage_nightly, coverage(off))]
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }

    controller.shutdown();
}
