//! Phase manager: drives server-induced tool-call progression off a queue.
//!
//! Create/advance handlers enqueue a small locator message after persisting
//! a call in `running`; the dispatcher leases messages and advances phases
//! until the call leaves `running`. Delivery is at-least-once; the If-Match
//! on every put plus the absorbing terminal states make each phase
//! transition commit at most once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use durable_mcp_core::{AccessConditions, ToolCall, ToolCallStatus};
use durable_mcp_monitoring::MetricsCollector;
use durable_mcp_queue::{MessageQueue, QueueError, QueueMessage, QueueResult};
use durable_mcp_store::{StoreError, ToolCallStore};

use crate::tools::ToolRegistry;

/// Phase-manager tuning knobs.
#[derive(Debug, Clone)]
pub struct PhaseManagerConfig {
    /// How often the dispatcher polls the queue.
    pub dispatch_interval: Duration,
    /// Messages leased per poll; bounds worker concurrency.
    pub messages_per_dequeue: usize,
    /// Visibility timeout: the execution budget for one message.
    pub phase_budget: Duration,
    /// Dequeue count beyond which a message is considered poison.
    pub poison_threshold: u32,
}

impl Default for PhaseManagerConfig {
    fn default() -> Self {
        Self {
            dispatch_interval: Duration::from_millis(500),
            messages_per_dequeue: 8,
            phase_budget: Duration::from_secs(30),
            poison_threshold: 3,
        }
    }
}

/// Queue payload: just enough to re-locate the call. Never the record
/// itself, so the queue cannot drift out of sync with the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseMessage {
    pub tenant: String,
    pub name: String,
    pub tool_call_id: String,
}

/// Handle a tool uses to cooperatively extend its execution budget before
/// heavy work.
#[async_trait]
pub trait ProcessingLease: Send + Sync {
    async fn extend_processing_time(&self, additional: Duration) -> QueueResult<()>;
}

/// Lease over one dequeued message; extension refreshes the pop receipt so
/// the final delete still succeeds.
struct QueueLease {
    queue: Arc<dyn MessageQueue>,
    message: Mutex<QueueMessage>,
}

impl QueueLease {
    fn new(queue: Arc<dyn MessageQueue>, message: QueueMessage) -> Self {
        Self {
            queue,
            message: Mutex::new(message),
        }
    }

    async fn delete(&self) -> QueueResult<()> {
        let message = self.message.lock().await;
        self.queue.delete(&message).await
    }
}

#[async_trait]
impl ProcessingLease for QueueLease {
    async fn extend_processing_time(&self, additional: Duration) -> QueueResult<()> {
        let mut message = self.message.lock().await;
        let receipt = self.queue.update_visibility(&message, additional).await?;
        message.pop_receipt = receipt;
        Ok(())
    }
}

/// Owns the queue and the dispatcher task.
pub struct PhaseManager {
    store: Arc<dyn ToolCallStore>,
    queue: Arc<dyn MessageQueue>,
    registry: Arc<ToolRegistry>,
    metrics: Arc<MetricsCollector>,
    config: PhaseManagerConfig,
    cancel: CancellationToken,
}

impl PhaseManager {
    pub fn new(
        store: Arc<dyn ToolCallStore>,
        queue: Arc<dyn MessageQueue>,
        registry: Arc<ToolRegistry>,
        metrics: Arc<MetricsCollector>,
        config: PhaseManagerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            queue,
            registry,
            metrics,
            config,
            cancel,
        }
    }

    pub fn queue_name(&self) -> &str {
        self.queue.queue_name()
    }

    /// Create the queue if absent and launch the dispatcher.
    pub async fn start(self: &Arc<Self>) -> QueueResult<()> {
        self.queue.ensure_queue().await?;
        let manager = self.clone();
        tokio::spawn(async move {
            manager.dispatch_loop().await;
        });
        info!("phase manager started on queue {}", self.queue.queue_name());
        Ok(())
    }

    /// Enqueue a phase message for a call just persisted in `running`.
    pub async fn start_phase_processing(&self, call: &ToolCall) -> QueueResult<()> {
        let message = PhaseMessage {
            tenant: call.tenant.clone(),
            name: call.name.clone(),
            tool_call_id: call.tool_call_id.clone(),
        };
        let body = serde_json::to_string(&message)
            .map_err(|err| QueueError::backend(format!("encode phase message: {err}")))?;
        self.queue.enqueue(body).await
    }

    async fn dispatch_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.dispatch_interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("phase manager stopping");
                    return;
                }
                _ = interval.tick() => {}
            }
            let messages = match self
                .queue
                .dequeue(self.config.messages_per_dequeue, self.config.phase_budget)
                .await
            {
                Ok(messages) => messages,
                Err(err) => {
                    warn!("dequeue failed, backing off: {}", err);
                    tokio::time::sleep(self.config.dispatch_interval).await;
                    continue;
                }
            };
            for message in messages {
                let manager = self.clone();
                tokio::spawn(async move {
                    manager.process_message(message).await;
                });
            }
        }
    }

    /// Drive one leased message to completion. Returning without deleting
    /// lets the lease expire and the message retry.
    async fn process_message(self: Arc<Self>, message: QueueMessage) {
        let _worker = self.metrics.phase_worker_started();

        if message.dequeue_count > self.config.poison_threshold {
            warn!(
                "poison message {} after {} deliveries, leaving it to expire",
                message.id, message.dequeue_count
            );
            return;
        }

        let locator: PhaseMessage = match serde_json::from_str(&message.body) {
            Ok(locator) => locator,
            Err(err) => {
                warn!("unreadable phase message {}: {}", message.id, err);
                let _ = self.queue.delete(&message).await;
                return;
            }
        };
        let lease = QueueLease::new(self.queue.clone(), message);

        let mut call = match self
            .store
            .get(
                &locator.tenant,
                &locator.name,
                &locator.tool_call_id,
                &AccessConditions::none(),
            )
            .await
        {
            Ok(call) => call,
            Err(StoreError::NotFound) => {
                debug!("tool call {} gone, dropping message", locator.tool_call_id);
                let _ = lease.delete().await;
                return;
            }
            Err(err) => {
                warn!("reload of {} failed: {}", locator.tool_call_id, err);
                return;
            }
        };

        let Some(tool) = self.registry.get(&locator.name) else {
            warn!("no registered tool {} for phase message", locator.name);
            let _ = lease.delete().await;
            return;
        };
        if !tool.has_phases() {
            warn!("tool {} has no phase processor", locator.name);
            let _ = lease.delete().await;
            return;
        }

        while call.status == ToolCallStatus::Running && !self.cancel.is_cancelled() {
            call.attempt += 1;
            if let Err(err) = tool.process_phase(&mut call, &lease).await {
                warn!(
                    "process_phase for {} failed, will retry after lease expiry: {}",
                    call.tool_call_id, err
                );
                return;
            }
            let conditions = AccessConditions::if_match(&call.etag);
            match self.store.put(&call.tenant, &call, &conditions).await {
                Ok(updated) => call = updated,
                Err(StoreError::PreconditionFailed) => {
                    // Another worker advanced this call; it owns it now.
                    debug!("lost phase race for {}", call.tool_call_id);
                    let _ = lease.delete().await;
                    return;
                }
                Err(err) => {
                    warn!("phase put for {} failed: {}", call.tool_call_id, err);
                    return;
                }
            }
        }

        let _ = lease.delete().await;
    }
}
