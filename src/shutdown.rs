//! One-shot cancellation and the cancelable idle sleep.
//!
//! A [`ShutdownSignal`] is shared between a driver and whoever may cancel it:
//! the driver's own `stop`, a caller-side timeout, or a process-exit hook
//! wired up with [`signal_on_process_exit`]. The signal is sticky; once fired
//! it stays fired and every current and future waiter wakes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

/// Why a cancelable sleep woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The full duration elapsed.
    Elapsed,
    /// The shutdown signal fired during the wait.
    Canceled,
}

/// One-shot sticky cancellation signal.
///
/// Cloning yields another handle to the same signal; every driver owns its
/// own signal, so independent drivers never interfere.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<SignalInner>,
}

#[derive(Debug, Default)]
struct SignalInner {
    signaled: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Idempotent; wakes every current and future waiter.
    pub fn signal(&self) {
        if !self.inner.signaled.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.inner.signaled.load(Ordering::Acquire)
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn wait_signaled(&self) {
        while !self.is_signaled() {
            let notified = self.inner.notify.notified();
            // Re-check after registering: a signal landing between the flag
            // check and the registration must not be lost.
            if self.is_signaled() {
                break;
            }
            notified.await;
        }
    }

    /// Sleep for `duration`, waking early if the signal fires.
    ///
    /// Never busy-spins; both arms suspend on the runtime's timer and
    /// notification primitives. A zero duration returns [`WakeReason::Elapsed`]
    /// without suspending (unless already canceled).
    pub async fn idle_wait(&self, duration: Duration) -> WakeReason {
        if self.is_signaled() {
            return WakeReason::Canceled;
        }

        if duration.is_zero() {
            return WakeReason::Elapsed;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => WakeReason::Elapsed,
            _ = self.wait_signaled() => WakeReason::Canceled,
        }
    }
}

/// Fire `signal` when the process receives ctrl-c, or SIGTERM on unix.
///
/// Registered explicitly per signal at the caller's choice rather than
/// installed as an ambient global; each live driver that should observe
/// process exit gets its own registration.
pub fn signal_on_process_exit(signal: ShutdownSignal) {
    tokio::spawn(async move {
        wait_for_process_exit().await;
        debug!("Process exit requested, firing shutdown signal");
        signal.signal();
    });
}

#[cfg(unix)]
async fn wait_for_process_exit() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_process_exit() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
}
