//! In-memory queue with visibility simulation, for tests and development.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::message::{QueueError, QueueResult, ReceivedMessage};
use super::MessageQueue;

#[derive(Debug, Clone)]
struct StoredMessage {
    msg_id: i64,
    payload: serde_json::Value,
    enqueued_at: DateTime<Utc>,
    /// When the message becomes visible again; `None` means visible now.
    visible_at: Option<DateTime<Utc>>,
    read_count: i32,
}

#[derive(Debug, Default)]
struct QueueSlot {
    messages: VecDeque<StoredMessage>,
    next_id: i64,
}

/// Thread-safe in-memory queue collection.
///
/// Messages become invisible after a receive and reappear once the
/// visibility timeout lapses without deletion, mirroring cloud-queue
/// semantics closely enough for driver and monitor tests.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    queues: RwLock<HashMap<String, QueueSlot>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the queue if it does not exist. Idempotent.
    pub async fn ensure_queue(&self, queue_name: &str) {
        let mut queues = self.queues.write().await;
        queues.entry(queue_name.to_string()).or_default();
    }

    /// Enqueue a JSON payload, creating the queue on first use. Returns the
    /// assigned message ID.
    pub async fn send_json(&self, queue_name: &str, payload: serde_json::Value) -> i64 {
        let mut queues = self.queues.write().await;
        let slot = queues.entry(queue_name.to_string()).or_default();

        slot.next_id += 1;
        let msg_id = slot.next_id;
        slot.messages.push_back(StoredMessage {
            msg_id,
            payload,
            enqueued_at: Utc::now(),
            visible_at: None,
            read_count: 0,
        });

        msg_id
    }

    /// Messages currently stored, visible or not.
    pub async fn queue_len(&self, queue_name: &str) -> usize {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|slot| slot.messages.len())
            .unwrap_or(0)
    }

    /// Remove a message, as an acknowledging consumer would. Returns whether
    /// anything was removed.
    pub async fn delete_message(&self, queue_name: &str, msg_id: i64) -> bool {
        let mut queues = self.queues.write().await;
        match queues.get_mut(queue_name) {
            Some(slot) => {
                let before = slot.messages.len();
                slot.messages.retain(|message| message.msg_id != msg_id);
                slot.messages.len() < before
            }
            None => false,
        }
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn receive_messages(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> QueueResult<Vec<ReceivedMessage>> {
        let mut queues = self.queues.write().await;
        let slot = queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::QueueNotFound(queue_name.to_string()))?;

        let now = Utc::now();
        let visible_again_at = now
            + chrono::Duration::from_std(visibility_timeout)
                .map_err(|error| QueueError::Backend(anyhow::anyhow!(error)))?;

        let mut received = Vec::new();
        for message in slot.messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }

            let is_visible = message.visible_at.map(|at| at <= now).unwrap_or(true);
            if is_visible {
                message.visible_at = Some(visible_again_at);
                message.read_count += 1;
                received.push(ReceivedMessage {
                    msg_id: message.msg_id,
                    payload: message.payload.clone(),
                    enqueued_at: message.enqueued_at,
                    visible_again_at,
                    read_count: message.read_count,
                });
            }
        }

        Ok(received)
    }
}
