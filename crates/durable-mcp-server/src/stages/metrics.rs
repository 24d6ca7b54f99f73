//! Metrics stage: wraps the downstream call and records the outcome.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use durable_mcp_monitoring::MetricsCollector;

use crate::pipeline::{ServerError, ServerResult, Stage};
use crate::reqres::RequestContext;

pub struct MetricsStage {
    collector: Arc<MetricsCollector>,
}

impl MetricsStage {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl Stage for MetricsStage {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn call(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        let start = Instant::now();
        let method = ctx.method.as_str().to_string();

        let result = ctx.next().await;

        let status = match &result {
            Err(ServerError::Responded { status }) => *status,
            Err(ServerError::Internal(_)) => 500,
            Ok(()) => ctx.response.status().unwrap_or(200),
        };
        self.collector
            .record_request(&method, status, start.elapsed())
            .await;
        result
    }
}
