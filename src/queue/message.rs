//! Received-message record and queue-boundary errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// A message handed back by a queue receive.
///
/// The monitor neither acknowledges nor deletes messages; a consumer that
/// does not do so before `visible_again_at` will see the queue re-deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    /// Message ID assigned by the queue.
    pub msg_id: i64,
    /// Message content as JSON.
    pub payload: serde_json::Value,
    /// When the message was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// When the message becomes visible to other consumers again.
    pub visible_again_at: DateTime<Utc>,
    /// How many times the message has been received.
    pub read_count: i32,
}

/// Errors from a queue backend.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The named queue does not exist.
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// Message payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Provider-specific failure.
    #[error("Backend error: {0}")]
    Backend(#[from] anyhow::Error),
}
