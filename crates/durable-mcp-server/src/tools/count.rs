//! Server-driven tool: counts up in the background, one increment per phase.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use durable_mcp_core::ToolCall;

use crate::phase::ProcessingLease;

use super::{AdvanceResult, ToolError, ToolHandler};

/// Above this many remaining increments the tool asks for more lease time
/// before chewing through the next phase.
const EXTEND_THRESHOLD: i64 = 100;
const EXTENSION: Duration = Duration::from_secs(30);

pub struct CountTool;

#[derive(Debug, Deserialize)]
struct CountRequest {
    start: i64,
    increments: i64,
}

impl CountTool {
    fn request_of(call: &ToolCall) -> Result<CountRequest, ToolError> {
        let body = call
            .request
            .clone()
            .ok_or_else(|| ToolError::Execution("count call lost its request".to_string()))?;
        serde_json::from_value(body)
            .map_err(|err| ToolError::Execution(format!("stored request unreadable: {err}")))
    }
}

#[async_trait]
impl ToolHandler for CountTool {
    fn name(&self) -> &'static str {
        "count"
    }

    fn description(&self) -> &'static str {
        "Counts from start by the requested number of increments, one per phase"
    }

    async fn create(&self, call: &mut ToolCall, body: &Value) -> Result<(), ToolError> {
        let request: CountRequest = serde_json::from_value(body.clone())
            .map_err(|err| ToolError::InvalidInput(format!("expected {{start, increments}}: {err}")))?;
        if request.increments < 0 {
            return Err(ToolError::InvalidInput(
                "increments must be non-negative".to_string(),
            ));
        }
        call.progress = Some(json!({"n": request.start}));
        call.start_running(request.increments.to_string())?;
        Ok(())
    }

    async fn advance(&self, _call: &mut ToolCall, _result: AdvanceResult) -> Result<(), ToolError> {
        Err(ToolError::InvalidInput(
            "count progresses on the server and takes no client results".to_string(),
        ))
    }

    fn has_phases(&self) -> bool {
        true
    }

    async fn process_phase(
        &self,
        call: &mut ToolCall,
        lease: &dyn ProcessingLease,
    ) -> Result<(), ToolError> {
        let request = Self::request_of(call)?;
        let remaining: i64 = call
            .phase
            .as_deref()
            .unwrap_or("0")
            .parse()
            .map_err(|_| ToolError::Execution("phase is not a number".to_string()))?;

        if remaining <= 0 {
            call.succeed(json!({"n": request.start + request.increments}))?;
            return Ok(());
        }
        if remaining > EXTEND_THRESHOLD {
            lease.extend_processing_time(EXTENSION).await?;
        }

        let remaining = remaining - 1;
        let n = request.start + (request.increments - remaining);
        call.progress = Some(json!({"n": n}));
        if remaining == 0 {
            call.succeed(json!({"n": request.start + request.increments}))?;
        } else {
            call.advance_phase(remaining.to_string())?;
        }
        Ok(())
    }
}
