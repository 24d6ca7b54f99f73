//! Graceful-shutdown stage and the /health probe it owns.
//!
//! Once shutdown is signalled the probe fails immediately (so load balancers
//! drain the instance) and new requests are rejected with 503; after the
//! configured delay the root token cancels in-flight work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use durable_mcp_core::ServiceError;
use durable_mcp_monitoring::HealthChecker;

use crate::pipeline::{ServerResult, Stage};
use crate::reqres::{RequestContext, ResponseHeaders};

/// Process-wide shutdown coordinator.
pub struct ShutdownState {
    draining: AtomicBool,
    drain_delay: Duration,
    cancel: CancellationToken,
}

impl ShutdownState {
    pub fn new(drain_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            draining: AtomicBool::new(false),
            drain_delay,
            cancel: CancellationToken::new(),
        })
    }

    /// Signal shutdown: the probe starts failing now; in-flight requests are
    /// cancelled after the drain delay.
    pub fn begin_shutdown(self: &Arc<Self>) {
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutdown signalled, draining for {:?}", self.drain_delay);
        let state = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(state.drain_delay).await;
            state.cancel.cancel();
        });
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Root token that request contexts and background workers derive from.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

pub struct ShutdownStage {
    state: Arc<ShutdownState>,
    health: Arc<HealthChecker>,
}

impl ShutdownStage {
    pub fn new(state: Arc<ShutdownState>, health: Arc<HealthChecker>) -> Self {
        Self { state, health }
    }
}

#[async_trait]
impl Stage for ShutdownStage {
    fn name(&self) -> &'static str {
        "shutdown"
    }

    async fn call(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        if ctx.path == "/health" {
            if self.state.is_draining() {
                return Err(ctx.error(&ServiceError::ServiceUnavailable, None));
            }
            let status = self.health.check_all().await;
            if !status.is_healthy() {
                return Err(ctx.error(&ServiceError::ServiceUnavailable, None));
            }
            return ctx.write_response(
                200,
                ResponseHeaders::default(),
                Some(&json!({"status": status.to_string()})),
            );
        }

        if self.state.is_draining() {
            return Err(ctx.error(&ServiceError::ServiceUnavailable, None));
        }
        ctx.next().await
    }
}
