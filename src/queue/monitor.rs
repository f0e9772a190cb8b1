//! Queue monitor: adapts a queue handle to the poll driver's contract.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::invoker::{DirectInvoker, ReceiveInvoker, ReceiveRequest};
use super::message::ReceivedMessage;
use super::MessageQueue;
use crate::config::PollerConfig;
use crate::error::{PollError, Result};
use crate::poller::{PayloadHandler, PollDriver, PollFn, PollFuture, PollOutcome};
use crate::shutdown::ShutdownSignal;

/// Most messages one receive call may request.
pub const RECEIVE_BATCH_MAX: usize = 32;

/// Configuration for a [`QueueMonitor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Queue to receive from.
    pub queue_name: String,
    /// Visibility timeout applied to every received message, in milliseconds.
    /// Providers impose their own upper limits (commonly seven days); staying
    /// under them is the caller's responsibility.
    pub visibility_timeout_ms: u64,
    /// Upper bound on the idle sleep between empty receives, in milliseconds.
    pub max_idle_delay_ms: u64,
    /// How long `stop` waits for the handler loop to exit, in milliseconds.
    pub stop_timeout_ms: u64,
    /// Messages requested per receive, at most [`RECEIVE_BATCH_MAX`].
    pub batch_size: usize,
}

impl MonitorConfig {
    /// Default configuration for the given queue.
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            visibility_timeout_ms: 30_000,
            max_idle_delay_ms: 500,
            stop_timeout_ms: 5_000,
            batch_size: RECEIVE_BATCH_MAX,
        }
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if self.queue_name.is_empty() {
            return Err(PollError::config("queue_name must not be empty"));
        }

        if self.visibility_timeout_ms == 0 {
            return Err(PollError::config(
                "visibility_timeout_ms must be greater than 0",
            ));
        }

        if self.batch_size == 0 || self.batch_size > RECEIVE_BATCH_MAX {
            return Err(PollError::config(format!(
                "batch_size must be between 1 and {RECEIVE_BATCH_MAX}"
            )));
        }

        self.poller_config().validate()
    }

    fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            max_idle_delay_ms: self.max_idle_delay_ms,
            stop_timeout_ms: self.stop_timeout_ms,
        }
    }
}

/// Watches one queue through an embedded poll driver.
///
/// Receives are serialized: however many tasks poke at the monitor, the
/// underlying queue sees at most one in-flight receive per monitor. The
/// monitor only receives; acknowledging or deleting messages is the
/// consumer's responsibility, and unacknowledged messages reappear once the
/// visibility timeout lapses.
pub struct QueueMonitor {
    driver: PollDriver<Vec<ReceivedMessage>>,
    queue_name: String,
}

impl QueueMonitor {
    /// Monitor that calls the queue directly.
    pub fn new(queue: Arc<dyn MessageQueue>, config: MonitorConfig) -> Result<Self> {
        Self::with_invoker(queue, Arc::new(DirectInvoker), config)
    }

    /// Monitor that routes every receive through `invoker`.
    pub fn with_invoker(
        queue: Arc<dyn MessageQueue>,
        invoker: Arc<dyn ReceiveInvoker>,
        config: MonitorConfig,
    ) -> Result<Self> {
        config.validate()?;

        let queue_name = config.queue_name.clone();
        let poll_fn = receive_poll_fn(queue, invoker, &config);
        let driver = PollDriver::new(config.poller_config(), poll_fn)?;
        debug!(driver_id = %driver.id(), queue_name = %queue_name, "Queue monitor created");

        Ok(Self { driver, queue_name })
    }

    /// Block until a batch of messages arrives or the monitor is canceled.
    ///
    /// Single-use, like the embedded driver: the monitor self-stops on
    /// return.
    pub async fn wait_for_messages(&self) -> Result<Option<Vec<ReceivedMessage>>> {
        self.driver.wait_for_payload().await
    }

    /// Start the handler loop; `handler` is invoked once per received batch.
    pub async fn start_message_handler(
        &self,
        handler: PayloadHandler<Vec<ReceivedMessage>>,
    ) -> Result<()> {
        self.driver.start_notification_loop(handler).await
    }

    /// Stop the handler loop and re-surface any captured failure.
    pub async fn stop(&self) -> Result<()> {
        self.driver.stop().await
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn empty_poll_count(&self) -> u64 {
        self.driver.empty_poll_count()
    }

    pub fn payload_poll_count(&self) -> u64 {
        self.driver.payload_poll_count()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.driver.shutdown_signal()
    }
}

/// Build the monitor's poll function: one serialized receive per call, with
/// an empty batch mapped to an empty poll.
fn receive_poll_fn(
    queue: Arc<dyn MessageQueue>,
    invoker: Arc<dyn ReceiveInvoker>,
    config: &MonitorConfig,
) -> PollFn<Vec<ReceivedMessage>> {
    // Guards the act of dequeuing only; the returned batch is the caller's.
    let receive_gate = Arc::new(Mutex::new(()));
    let request = ReceiveRequest {
        queue_name: config.queue_name.clone(),
        max_messages: config.batch_size.min(RECEIVE_BATCH_MAX),
        visibility_timeout: config.visibility_timeout(),
    };

    Box::new(move || {
        let queue = Arc::clone(&queue);
        let invoker = Arc::clone(&invoker);
        let receive_gate = Arc::clone(&receive_gate);
        let request = request.clone();

        let fut: PollFuture<Vec<ReceivedMessage>> = Box::pin(async move {
            let _in_flight = receive_gate.lock().await;
            let batch = invoker
                .invoke(queue.as_ref(), request)
                .await
                .map_err(anyhow::Error::from)?;

            if batch.is_empty() {
                Ok(PollOutcome::Empty)
            } else {
                Ok(PollOutcome::Payload(batch))
            }
        });
        fut
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::message::QueueResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Queue that records whether two receives ever overlapped.
    #[derive(Debug, Default)]
    struct OverlapDetectingQueue {
        in_flight: AtomicBool,
        overlapped: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageQueue for OverlapDetectingQueue {
        async fn receive_messages(
            &self,
            _queue_name: &str,
            _max_messages: usize,
            _visibility_timeout: Duration,
        ) -> QueueResult<Vec<ReceivedMessage>> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.store(false, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_polls_are_serialized() {
        let queue = Arc::new(OverlapDetectingQueue::default());
        let config = MonitorConfig::new("orders");
        let mut poll_fn = receive_poll_fn(
            Arc::clone(&queue) as Arc<dyn MessageQueue>,
            Arc::new(DirectInvoker),
            &config,
        );

        let first = poll_fn();
        let second = poll_fn();
        let (first, second) = tokio::join!(first, second);

        assert!(matches!(first, Ok(PollOutcome::Empty)));
        assert!(matches!(second, Ok(PollOutcome::Empty)));
        assert_eq!(queue.calls.load(Ordering::SeqCst), 2);
        assert!(
            !queue.overlapped.load(Ordering::SeqCst),
            "receives overlapped despite the gate"
        );
    }

    #[test]
    fn batch_size_is_capped() {
        let mut config = MonitorConfig::new("orders");
        config.batch_size = RECEIVE_BATCH_MAX + 1;
        assert!(config.validate().is_err());

        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_visibility_is_rejected() {
        let mut config = MonitorConfig::new("orders");
        config.visibility_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(PollError::Configuration { .. })
        ));
    }

    #[test]
    fn empty_queue_name_is_rejected() {
        let config = MonitorConfig::new("");
        assert!(config.validate().is_err());
    }
}
