//! # smartpoll
//!
//! Adaptive-backoff polling coordinator: turns a non-blocking, maybe-empty
//! poll function into two behaviors over one payload stream:
//!
//! - a blocking wait ([`PollDriver::wait_for_payload`]) that suspends the
//!   caller until a payload appears, and
//! - a notification loop ([`PollDriver::start_notification_loop`]) that
//!   dispatches a handler per payload until stopped.
//!
//! Empty polls back off on a deterministic capped curve so CPU and per-call
//! costs (cloud queue reads priced per transaction, say) stay bounded, while
//! any payload resets the curve and latency to the next payload stays small.
//! Cancellation is cooperative and prompt: `stop`, a caller-side timeout, or
//! a process-exit hook interrupts the current idle sleep but lets the
//! in-flight poll and handler finish.
//!
//! ## Components
//!
//! 1. [`shutdown`]: one-shot cancel signal and the cancelable idle sleep.
//! 2. [`backoff`]: the pure delay curve.
//! 3. [`poller`]: the generic [`PollDriver`].
//! 4. [`queue`]: the message-queue specialization ([`QueueMonitor`]) with
//!    serialized dequeues, visibility timeouts, an optional proxy boundary,
//!    and an in-memory provider for tests.
//!
//! ## Usage
//!
//! ```no_run
//! use smartpoll::{InMemoryQueue, MonitorConfig, QueueMonitor};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = Arc::new(InMemoryQueue::new());
//! queue.ensure_queue("orders").await;
//!
//! let monitor = QueueMonitor::new(queue.clone(), MonitorConfig::new("orders"))?;
//!
//! // Blocks until a batch arrives (or the monitor is canceled).
//! if let Some(batch) = monitor.wait_for_messages().await? {
//!     for message in batch {
//!         println!("received {}", message.msg_id);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod logging;
pub mod poller;
pub mod queue;
pub mod shutdown;

pub use config::PollerConfig;
pub use error::{PollError, Result};
pub use poller::{
    handler_fn, DriverMode, HandlerFuture, PayloadHandler, PollDriver, PollFn, PollFuture,
    PollOutcome,
};
pub use queue::{
    register_message_handler, register_message_handler_with_invoker, wait_for_messages,
    wait_for_messages_with_invoker, DirectInvoker, InMemoryQueue, MessageQueue, MonitorConfig,
    QueueError, QueueMonitor, ReceiveInvoker, ReceiveRequest, ReceivedMessage, RECEIVE_BATCH_MAX,
};
pub use shutdown::{signal_on_process_exit, ShutdownSignal, WakeReason};
