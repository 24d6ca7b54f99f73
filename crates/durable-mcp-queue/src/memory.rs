//! In-memory queue with visibility-timeout leases.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{MessageQueue, QueueError, QueueMessage, QueueResult};

/// Messages older than this are dropped during dequeue scans, which is how
/// poison messages eventually age out.
const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
struct Entry {
    id: String,
    body: String,
    pop_receipt: String,
    dequeue_count: u32,
    visible_at: Instant,
    enqueued_at: Instant,
}

/// FIFO queue backed by a mutex-guarded vector. Suits a single-process
/// deployment; the contract is identical to a cloud queue so swapping one in
/// is a constructor change.
pub struct MemoryQueue {
    name: String,
    entries: Mutex<Vec<Entry>>,
    message_ttl: Duration,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(Vec::new()),
            message_ttl: DEFAULT_MESSAGE_TTL,
        }
    }

    pub fn with_message_ttl(mut self, ttl: Duration) -> Self {
        self.message_ttl = ttl;
        self
    }

    /// Number of messages currently stored, visible or leased.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl MessageQueue for MemoryQueue {
    fn queue_name(&self) -> &str {
        &self.name
    }

    async fn ensure_queue(&self) -> QueueResult<()> {
        Ok(())
    }

    async fn enqueue(&self, body: String) -> QueueResult<()> {
        let now = Instant::now();
        self.entries.lock().await.push(Entry {
            id: Uuid::new_v4().to_string(),
            body,
            pop_receipt: Uuid::new_v4().to_string(),
            dequeue_count: 0,
            visible_at: now,
            enqueued_at: now,
        });
        Ok(())
    }

    async fn dequeue(
        &self,
        max_messages: usize,
        visibility: Duration,
    ) -> QueueResult<Vec<QueueMessage>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|entry| now.duration_since(entry.enqueued_at) < self.message_ttl);

        let mut leased = Vec::new();
        for entry in entries.iter_mut() {
            if leased.len() >= max_messages {
                break;
            }
            if entry.visible_at > now {
                continue;
            }
            entry.dequeue_count += 1;
            entry.visible_at = now + visibility;
            entry.pop_receipt = Uuid::new_v4().to_string();
            leased.push(QueueMessage {
                id: entry.id.clone(),
                pop_receipt: entry.pop_receipt.clone(),
                dequeue_count: entry.dequeue_count,
                body: entry.body.clone(),
            });
        }
        Ok(leased)
    }

    async fn update_visibility(
        &self,
        message: &QueueMessage,
        visibility: Duration,
    ) -> QueueResult<String> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == message.id)
            .ok_or(QueueError::ReceiptMismatch)?;
        if entry.pop_receipt != message.pop_receipt {
            return Err(QueueError::ReceiptMismatch);
        }
        entry.visible_at = Instant::now() + visibility;
        entry.pop_receipt = Uuid::new_v4().to_string();
        Ok(entry.pop_receipt.clone())
    }

    async fn delete(&self, message: &QueueMessage) -> QueueResult<()> {
        let mut entries = self.entries.lock().await;
        let Some(index) = entries.iter().position(|entry| entry.id == message.id) else {
            return Ok(());
        };
        if entries[index].pop_receipt != message.pop_receipt {
            return Err(QueueError::ReceiptMismatch);
        }
        entries.remove(index);
        Ok(())
    }
}
