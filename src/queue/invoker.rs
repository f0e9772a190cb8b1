//! Pluggable boundary for routing queue receives.

use std::time::Duration;

use async_trait::async_trait;

use super::message::{QueueResult, ReceivedMessage};
use super::MessageQueue;

/// Parameters of one receive call, as passed across the invoker boundary.
#[derive(Debug, Clone)]
pub struct ReceiveRequest {
    pub queue_name: String,
    pub max_messages: usize,
    pub visibility_timeout: Duration,
}

/// Routes a receive to the underlying queue.
///
/// Implementations may interpose on the call (logging, retries, fault
/// isolation) but must preserve its contract: an empty batch means the queue
/// had nothing visible, and `Err` means a genuine backend failure.
#[async_trait]
pub trait ReceiveInvoker: Send + Sync + 'static {
    async fn invoke(
        &self,
        queue: &dyn MessageQueue,
        request: ReceiveRequest,
    ) -> QueueResult<Vec<ReceivedMessage>>;
}

/// Invoker that calls the queue with no interposition.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectInvoker;

#[async_trait]
impl ReceiveInvoker for DirectInvoker {
    async fn invoke(
        &self,
        queue: &dyn MessageQueue,
        request: ReceiveRequest,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        queue
            .receive_messages(
                &request.queue_name,
                request.max_messages,
                request.visibility_timeout,
            )
            .await
    }
}
