//! # Durable MCP Queue
//!
//! FIFO queue with visibility-timeout lease semantics, the contract of a
//! typical cloud queue: enqueue, dequeue with a timeout, update-timeout
//! (refreshing the pop receipt), delete. Messages are delivered at least
//! once; a consumer that dies simply lets its lease expire, making the
//! message visible again for the next dequeue.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;

pub use memory::MemoryQueue;

/// Queue failures.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The pop receipt is stale: the lease expired and another consumer
    /// holds the message now.
    #[error("pop receipt no longer valid")]
    ReceiptMismatch,

    /// Backend I/O failure.
    #[error("queue backend error: {message}")]
    Backend { message: String },
}

impl QueueError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

/// A leased message handed to one consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Stable message id, constant across redeliveries
    pub id: String,
    /// Lease token; refreshed by every visibility update
    pub pop_receipt: String,
    /// How many times this message has been dequeued (including this one)
    pub dequeue_count: u32,
    /// Opaque payload
    pub body: String,
}

/// Behavioural contract for the phase-manager queue.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Name of the queue, recorded on each tool call as its advance queue.
    fn queue_name(&self) -> &str;

    /// Create the queue if it does not already exist.
    async fn ensure_queue(&self) -> QueueResult<()>;

    /// Append a message to the tail of the queue.
    async fn enqueue(&self, body: String) -> QueueResult<()>;

    /// Lease up to `max_messages` visible messages for `visibility`.
    async fn dequeue(
        &self,
        max_messages: usize,
        visibility: Duration,
    ) -> QueueResult<Vec<QueueMessage>>;

    /// Extend the lease on a message, returning the fresh pop receipt.
    /// Fails with [`QueueError::ReceiptMismatch`] if the lease was lost.
    async fn update_visibility(
        &self,
        message: &QueueMessage,
        visibility: Duration,
    ) -> QueueResult<String>;

    /// Remove a message for good. Deleting an already-removed message is a
    /// no-op; deleting with a stale receipt fails.
    async fn delete(&self, message: &QueueMessage) -> QueueResult<()>;
}
