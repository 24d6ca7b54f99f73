//! Per-second request throttle.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use durable_mcp_core::ServiceError;

use crate::pipeline::{ServerResult, Stage};
use crate::reqres::RequestContext;

/// Counts requests in the current wall-clock second; at the limit, requests
/// are refused with 429 and a one-second Retry-After.
pub struct ThrottleStage {
    limit: u32,
    window: Mutex<(u64, u32)>, // (second, count)
}

impl ThrottleStage {
    /// `limit` of zero disables throttling.
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            window: Mutex::new((0, 0)),
        }
    }

    fn admit(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let mut window = match self.window.lock() {
            Ok(window) => window,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (second, count) = *window;
        if second == now {
            if count >= self.limit {
                return false;
            }
            *window = (now, count + 1);
        } else {
            *window = (now, 1);
        }
        true
    }
}

#[async_trait]
impl Stage for ThrottleStage {
    fn name(&self) -> &'static str {
        "throttle"
    }

    async fn call(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        if self.limit > 0 && !self.admit() {
            ctx.response.insert_header("retry-after", "1".to_string());
            return Err(ctx.error(&ServiceError::TooManyRequests, None));
        }
        ctx.next().await
    }
}
