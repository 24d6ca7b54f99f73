//! Tracing stage: one span per request over the downstream call.

use async_trait::async_trait;
use tracing::{info_span, Instrument};

use crate::pipeline::{ServerResult, Stage};
use crate::reqres::RequestContext;

pub struct TracingStage;

#[async_trait]
impl Stage for TracingStage {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn call(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        let span = info_span!(
            "request",
            method = %ctx.method,
            path = %ctx.original_path,
        );
        async { ctx.next().await }.instrument(span).await
    }
}
