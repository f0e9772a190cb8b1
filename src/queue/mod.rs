//! Message-queue specialization of the poll driver.
//!
//! A [`QueueMonitor`] adapts any [`MessageQueue`] handle to the driver's
//! poll-function contract: an empty batch is a normal empty poll, a
//! non-empty batch is the payload, concurrent dequeues are serialized, and
//! the configured visibility timeout is applied to every receive. Receives
//! may optionally be routed through a [`ReceiveInvoker`] so callers can
//! interpose logging, retries, or fault isolation without the monitor
//! knowing.

mod invoker;
mod memory;
mod message;
mod monitor;

pub use invoker::{DirectInvoker, ReceiveInvoker, ReceiveRequest};
pub use memory::InMemoryQueue;
pub use message::{QueueError, QueueResult, ReceivedMessage};
pub use monitor::{MonitorConfig, QueueMonitor, RECEIVE_BATCH_MAX};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::poller::PayloadHandler;

/// Handle to a message queue supporting visibility-timeout receives.
///
/// A returned message is hidden from other consumers for
/// `visibility_timeout`; if not deleted within that window it reappears.
#[async_trait]
pub trait MessageQueue: Send + Sync + 'static {
    /// Receive up to `max_messages` visible messages. An empty vec means the
    /// queue had nothing visible right now; it is not an error.
    async fn receive_messages(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> QueueResult<Vec<ReceivedMessage>>;
}

/// Construct a monitor, block until a batch arrives or cancellation, and
/// tear the monitor down on return.
pub async fn wait_for_messages(
    queue: Arc<dyn MessageQueue>,
    config: MonitorConfig,
) -> Result<Option<Vec<ReceivedMessage>>> {
    let monitor = QueueMonitor::new(queue, config)?;
    monitor.wait_for_messages().await
}

/// [`wait_for_messages`] with every receive routed through `invoker`.
pub async fn wait_for_messages_with_invoker(
    queue: Arc<dyn MessageQueue>,
    invoker: Arc<dyn ReceiveInvoker>,
    config: MonitorConfig,
) -> Result<Option<Vec<ReceivedMessage>>> {
    let monitor = QueueMonitor::with_invoker(queue, invoker, config)?;
    monitor.wait_for_messages().await
}

/// Construct a monitor and start its handler loop; the returned monitor is
/// the handle for a later [`QueueMonitor::stop`].
pub async fn register_message_handler(
    queue: Arc<dyn MessageQueue>,
    handler: PayloadHandler<Vec<ReceivedMessage>>,
    config: MonitorConfig,
) -> Result<QueueMonitor> {
    let monitor = QueueMonitor::new(queue, config)?;
    monitor.start_message_handler(handler).await?;
    Ok(monitor)
}

/// [`register_message_handler`] with every receive routed through `invoker`.
pub async fn register_message_handler_with_invoker(
    queue: Arc<dyn MessageQueue>,
    invoker: Arc<dyn ReceiveInvoker>,
    handler: PayloadHandler<Vec<ReceivedMessage>>,
    config: MonitorConfig,
) -> Result<QueueMonitor> {
    let monitor = QueueMonitor::with_invoker(queue, invoker, config)?;
    monitor.start_message_handler(handler).await?;
    Ok(monitor)
}
