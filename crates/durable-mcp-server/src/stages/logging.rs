//! Request logging stage: method, URL, status, duration.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::pipeline::{ServerError, ServerResult, Stage};
use crate::reqres::RequestContext;

pub struct LoggingStage;

#[async_trait]
impl Stage for LoggingStage {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn call(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        let start = Instant::now();
        let method = ctx.method.clone();
        let url = ctx.uri.to_string();

        let result = ctx.next().await;

        let status = match &result {
            Err(ServerError::Responded { status }) => *status,
            _ => ctx.response.status().unwrap_or(0),
        };
        let elapsed_ms = start.elapsed().as_millis();
        if status >= 500 {
            warn!("{} {} -> {} ({} ms)", method, url, status, elapsed_ms);
        } else {
            info!("{} {} -> {} ({} ms)", method, url, status, elapsed_ms);
        }
        result
    }
}
