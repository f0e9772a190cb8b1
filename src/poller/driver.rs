//! The poll driver: lifecycle, counters, and the poll loop itself.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backoff::delay_for;
use crate::config::PollerConfig;
use crate::error::{PollError, Result};
use crate::shutdown::{ShutdownSignal, WakeReason};

/// Outcome of one call to a poll function.
///
/// `Empty` is a normal return, not an error; a source failure is signaled by
/// the poll function returning `Err` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// No payload available right now.
    Empty,
    /// A payload was produced.
    Payload(T),
}

/// Future returned by one poll-function invocation.
pub type PollFuture<T> = BoxFuture<'static, std::result::Result<PollOutcome<T>, anyhow::Error>>;

/// The driver's payload source.
pub type PollFn<T> = Box<dyn FnMut() -> PollFuture<T> + Send>;

/// Future returned by one handler invocation.
pub type HandlerFuture = BoxFuture<'static, std::result::Result<(), anyhow::Error>>;

/// Callback invoked for every payload in notification-loop mode.
pub type PayloadHandler<T> = Box<dyn FnMut(T) -> HandlerFuture + Send>;

/// Box a plain async closure into a [`PayloadHandler`].
pub fn handler_fn<T, F, Fut>(mut f: F) -> PayloadHandler<T>
where
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<(), anyhow::Error>> + Send + 'static,
{
    Box::new(move |payload| {
        let fut: HandlerFuture = Box::pin(f(payload));
        fut
    })
}

/// Lifecycle of a driver instance.
///
/// An instance is single-use: exactly one transition out of `Idle` is
/// permitted, and `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriverMode {
    /// Constructed, not yet started.
    Idle = 0,
    /// `wait_for_payload` is running on the caller's task.
    BlockingWait = 1,
    /// A notification loop worker is running.
    LoopRunning = 2,
    /// Terminal.
    Stopped = 3,
}

impl From<u8> for DriverMode {
    fn from(value: u8) -> Self {
        match value {
            0 => DriverMode::Idle,
            1 => DriverMode::BlockingWait,
            2 => DriverMode::LoopRunning,
            _ => DriverMode::Stopped,
        }
    }
}

/// State shared between the driver handle and its worker task.
#[derive(Debug)]
struct DriverState {
    mode: AtomicU8,
    empty_polls: AtomicU64,
    payload_polls: AtomicU64,
    shutdown: ShutdownSignal,
    /// Failure captured by the notification loop, re-surfaced by `stop`.
    failure: Mutex<Option<PollError>>,
}

/// How the loop exited; `Payload` only occurs in blocking mode.
enum LoopExit<T> {
    Payload(T),
    Canceled,
    Failed(PollError),
}

/// Drives one payload stream from a caller-supplied poll function.
///
/// Two mutually exclusive entrypoints share the same loop: `wait_for_payload`
/// runs it on the calling task and returns the first payload, while
/// `start_notification_loop` runs it on a spawned worker and dispatches a
/// handler per payload. Either way at most one poll is in flight, empty polls
/// back off on a capped curve, and any payload resets the curve so a freshly
/// drained source is polled aggressively again.
pub struct PollDriver<T> {
    id: Uuid,
    config: PollerConfig,
    state: Arc<DriverState>,
    poll_fn: Mutex<Option<PollFn<T>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T> std::fmt::Debug for PollDriver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollDriver")
            .field("id", &self.id)
            .field("mode", &self.mode())
            .field("empty_polls", &self.empty_poll_count())
            .field("payload_polls", &self.payload_poll_count())
            .finish()
    }
}

impl<T> PollDriver<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> DriverMode {
        DriverMode::from(self.state.mode.load(Ordering::Acquire))
    }

    /// Lifetime count of empty polls.
    pub fn empty_poll_count(&self) -> u64 {
        self.state.empty_polls.load(Ordering::Acquire)
    }

    /// Lifetime count of polls that produced a payload.
    pub fn payload_poll_count(&self) -> u64 {
        self.state.payload_polls.load(Ordering::Acquire)
    }

    /// Handle to this driver's cancellation signal.
    ///
    /// Lets the caller wire external cancellation: their own timeout, or a
    /// process-exit hook via [`signal_on_process_exit`](crate::shutdown::signal_on_process_exit).
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.state.shutdown.clone()
    }
}

impl<T: Send + 'static> PollDriver<T> {
    /// Construct an idle driver from a boxed poll function.
    pub fn new(config: PollerConfig, poll_fn: PollFn<T>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            id: Uuid::new_v4(),
            config,
            state: Arc::new(DriverState {
                mode: AtomicU8::new(DriverMode::Idle as u8),
                empty_polls: AtomicU64::new(0),
                payload_polls: AtomicU64::new(0),
                shutdown: ShutdownSignal::new(),
                failure: Mutex::new(None),
            }),
            poll_fn: Mutex::new(Some(poll_fn)),
            worker: Mutex::new(None),
        })
    }

    /// Construct an idle driver from a plain async closure.
    pub fn from_fn<F, Fut>(config: PollerConfig, mut f: F) -> Result<Self>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<PollOutcome<T>, anyhow::Error>> + Send + 'static,
    {
        Self::new(
            config,
            Box::new(move || {
                let fut: PollFuture<T> = Box::pin(f());
                fut
            }),
        )
    }

    /// Block the calling task until a payload is produced or the driver is
    /// canceled.
    ///
    /// Returns `Ok(Some(payload))` with the first payload, `Ok(None)` if
    /// canceled first, or the poll function's failure. The driver self-stops
    /// on return; the instance cannot be started again.
    pub async fn wait_for_payload(&self) -> Result<Option<T>> {
        self.transition_from_idle(DriverMode::BlockingWait)?;
        let poll_fn = self.take_poll_fn().await?;

        info!(driver_id = %self.id, "Entering blocking wait for payload");
        let exit = drive(&self.state, &self.config, poll_fn, None).await;

        self.state.shutdown.signal();
        self.state
            .mode
            .store(DriverMode::Stopped as u8, Ordering::Release);

        match exit {
            LoopExit::Payload(payload) => Ok(Some(payload)),
            LoopExit::Canceled => {
                debug!(driver_id = %self.id, "Blocking wait canceled before any payload");
                Ok(None)
            }
            LoopExit::Failed(failure) => Err(failure),
        }
    }

    /// Start a worker task that invokes `handler` for every payload, in
    /// arrival order, until [`stop`](Self::stop) is called.
    ///
    /// Returns immediately. The handler runs on the poll task itself, so a
    /// slow handler delays the next poll; handlers needing concurrency must
    /// fan out themselves. A poll or handler failure terminates the loop and
    /// is re-surfaced by `stop`.
    pub async fn start_notification_loop(&self, handler: PayloadHandler<T>) -> Result<()> {
        self.transition_from_idle(DriverMode::LoopRunning)?;
        let poll_fn = self.take_poll_fn().await?;

        let id = self.id;
        let state = Arc::clone(&self.state);
        let config = self.config.clone();
        info!(
            driver_id = %id,
            max_idle_delay_ms = config.max_idle_delay_ms,
            "Starting notification loop"
        );

        let handle = tokio::spawn(async move {
            match drive(&state, &config, poll_fn, Some(handler)).await {
                LoopExit::Canceled => {
                    debug!(driver_id = %id, "Notification loop canceled")
                }
                LoopExit::Failed(failure) => {
                    error!(driver_id = %id, error = %failure, "Notification loop terminated on failure");
                    *state.failure.lock().await = Some(failure);
                }
                LoopExit::Payload(_) => {
                    warn!(driver_id = %id, "Notification loop exited unexpectedly")
                }
            }
            state
                .mode
                .store(DriverMode::Stopped as u8, Ordering::Release);
        });

        *self.worker.lock().await = Some(handle);
        Ok(())
    }

    /// Signal cancellation, join the worker if any, and transition to
    /// `Stopped`.
    ///
    /// The in-flight poll and handler are allowed to complete; the current
    /// idle sleep is interrupted. A failure captured by the notification loop
    /// is returned exactly once. Idempotent: further calls are no-ops, and
    /// calling it on a never-started driver is safe.
    pub async fn stop(&self) -> Result<()> {
        self.state.shutdown.signal();

        let worker = self.worker.lock().await.take();
        if let Some(handle) = worker {
            debug!(driver_id = %self.id, "Waiting for notification loop to exit");
            match tokio::time::timeout(self.config.stop_timeout(), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_error)) => {
                    warn!(driver_id = %self.id, error = %join_error, "Notification loop task panicked");
                }
                Err(_) => {
                    self.state
                        .mode
                        .store(DriverMode::Stopped as u8, Ordering::Release);
                    return Err(PollError::Timeout(format!(
                        "notification loop did not stop within {} ms",
                        self.config.stop_timeout_ms
                    )));
                }
            }
        }

        self.state
            .mode
            .store(DriverMode::Stopped as u8, Ordering::Release);

        if let Some(failure) = self.state.failure.lock().await.take() {
            return Err(failure);
        }

        info!(driver_id = %self.id, "Driver stopped");
        Ok(())
    }

    fn transition_from_idle(&self, target: DriverMode) -> Result<()> {
        self.state
            .mode
            .compare_exchange(
                DriverMode::Idle as u8,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|actual| {
                PollError::invalid_state(format!(
                    "driver is {:?}; instances permit exactly one transition out of Idle",
                    DriverMode::from(actual)
                ))
            })
    }

    async fn take_poll_fn(&self) -> Result<PollFn<T>> {
        // The Idle CAS admits exactly one winner, so the slot is still full.
        self.poll_fn
            .lock()
            .await
            .take()
            .ok_or_else(|| PollError::invalid_state("poll function already consumed"))
    }
}

impl<T> Drop for PollDriver<T> {
    fn drop(&mut self) {
        // A dropped driver cannot join its worker; signaling lets the worker
        // exit at its next suspension point.
        self.state.shutdown.signal();
    }
}

/// The poll loop shared by both modes.
///
/// With `handler == None` the first payload is returned to the blocking
/// caller; with a handler the loop dispatches each payload and polls again
/// immediately. Any payload resets the back-off curve.
async fn drive<T>(
    state: &DriverState,
    config: &PollerConfig,
    mut poll_fn: PollFn<T>,
    mut handler: Option<PayloadHandler<T>>,
) -> LoopExit<T> {
    let max_idle_delay = config.max_idle_delay();
    let mut empty_count: u32 = 0;

    loop {
        if state.shutdown.is_signaled() {
            return LoopExit::Canceled;
        }

        match poll_fn().await {
            Err(source) => return LoopExit::Failed(PollError::Source(source)),
            Ok(PollOutcome::Payload(payload)) => {
                state.payload_polls.fetch_add(1, Ordering::Release);
                empty_count = 0;

                match handler.as_mut() {
                    None => return LoopExit::Payload(payload),
                    Some(handler) => {
                        if let Err(failure) = handler(payload).await {
                            return LoopExit::Failed(PollError::Handler(failure));
                        }
                    }
                }
            }
            Ok(PollOutcome::Empty) => {
                state.empty_polls.fetch_add(1, Ordering::Release);
                empty_count = empty_count.saturating_add(1);

                let delay = delay_for(empty_count, max_idle_delay);
                if state.shutdown.idle_wait(delay).await == WakeReason::Canceled {
                    return LoopExit::Canceled;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always_empty() -> Result<PollDriver<u32>> {
        PollDriver::from_fn(PollerConfig::default(), || async {
            Ok(PollOutcome::Empty)
        })
    }

    #[tokio::test]
    async fn new_driver_starts_idle_with_zero_counters() {
        let driver = always_empty().unwrap();
        assert_eq!(driver.mode(), DriverMode::Idle);
        assert_eq!(driver.empty_poll_count(), 0);
        assert_eq!(driver.payload_poll_count(), 0);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_at_construction() {
        let result = PollDriver::<u32>::from_fn(PollerConfig::with_max_idle_delay_ms(0), || async {
            Ok(PollOutcome::Empty)
        });
        assert!(matches!(result, Err(PollError::Configuration { .. })));
    }

    #[tokio::test]
    async fn stop_before_start_is_a_safe_no_op() {
        let driver = always_empty().unwrap();
        driver.stop().await.unwrap();
        driver.stop().await.unwrap();
        assert_eq!(driver.mode(), DriverMode::Stopped);
        assert_eq!(driver.empty_poll_count(), 0);
        assert_eq!(driver.payload_poll_count(), 0);
    }

    #[tokio::test]
    async fn stopped_driver_rejects_both_entrypoints() {
        let driver = always_empty().unwrap();
        driver.stop().await.unwrap();

        assert!(matches!(
            driver.wait_for_payload().await,
            Err(PollError::InvalidState(_))
        ));
        assert!(matches!(
            driver
                .start_notification_loop(handler_fn(|_| async { Ok(()) }))
                .await,
            Err(PollError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn immediate_payload_skips_every_sleep() {
        let driver = PollDriver::from_fn(PollerConfig::default(), || async {
            Ok(PollOutcome::Payload(7u32))
        })
        .unwrap();

        let payload = driver.wait_for_payload().await.unwrap();
        assert_eq!(payload, Some(7));
        assert_eq!(driver.empty_poll_count(), 0);
        assert_eq!(driver.payload_poll_count(), 1);
        assert_eq!(driver.mode(), DriverMode::Stopped);
    }
}
