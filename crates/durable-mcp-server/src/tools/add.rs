//! Stateless compute tool: adds two integers at create time.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use durable_mcp_core::ToolCall;

use super::{AdvanceResult, ToolError, ToolHandler};

pub struct AddTool;

#[derive(Debug, Deserialize)]
struct AddRequest {
    x: i64,
    y: i64,
}

#[async_trait]
impl ToolHandler for AddTool {
    fn name(&self) -> &'static str {
        "add"
    }

    fn description(&self) -> &'static str {
        "Adds two numbers and completes immediately"
    }

    async fn create(&self, call: &mut ToolCall, body: &Value) -> Result<(), ToolError> {
        let request: AddRequest = serde_json::from_value(body.clone())
            .map_err(|err| ToolError::InvalidInput(format!("expected {{x, y}}: {err}")))?;
        call.succeed(json!({"sum": request.x + request.y}))?;
        Ok(())
    }

    // Legal but trivial: an add call is terminal the moment it exists, so
    // the generic handlers never reach this.
    async fn advance(&self, _call: &mut ToolCall, _result: AdvanceResult) -> Result<(), ToolError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use durable_mcp_core::ToolCallStatus;

    fn call() -> ToolCall {
        ToolCall::new("default", "add", "t1", vec![], "phases")
    }

    #[tokio::test]
    async fn test_create_computes_sum() {
        let mut call = call();
        AddTool
            .create(&mut call, &json!({"x": 5, "y": 3}))
            .await
            .unwrap();
        assert_eq!(call.status, ToolCallStatus::Success);
        assert_eq!(call.result, Some(json!({"sum": 8})));
        assert!(call.validate().is_ok());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_body() {
        let mut call = call();
        let err = AddTool
            .create(&mut call, &json!({"x": "five"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
        assert_eq!(call.status, ToolCallStatus::Submitted);
    }
}
