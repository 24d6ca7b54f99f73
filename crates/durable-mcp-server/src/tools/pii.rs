//! Elicitation-gated read: the client must approve before the data is
//! released.

use async_trait::async_trait;
use serde_json::{json, Value};

use durable_mcp_core::{ElicitationRequest, ToolCall};

use super::{AdvanceResult, ToolError, ToolHandler};

pub struct PiiTool;

#[async_trait]
impl ToolHandler for PiiTool {
    fn name(&self) -> &'static str {
        "pii"
    }

    fn description(&self) -> &'static str {
        "Returns PII after the client approves an elicitation"
    }

    async fn create(&self, call: &mut ToolCall, _body: &Value) -> Result<(), ToolError> {
        call.await_elicitation(ElicitationRequest::boolean(
            "This tool returns PII. Do you approve sharing it?",
            "approved",
        ))?;
        Ok(())
    }

    async fn advance(&self, call: &mut ToolCall, result: AdvanceResult) -> Result<(), ToolError> {
        let AdvanceResult::Elicitation(answer) = result else {
            return Err(ToolError::InvalidInput(
                "pii expects an elicitation result".to_string(),
            ));
        };
        // Everything that is not an explicit approval (decline, reject,
        // cancel, accept-without-approval) collapses to a cancellation.
        let approved = answer.is_accept()
            && answer
                .content
                .as_ref()
                .and_then(|content| content.get("approved"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
        if approved {
            call.succeed(json!({"data": "here's your PII"}))?;
        } else {
            call.cancel()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use durable_mcp_core::{ElicitationResult, ToolCallStatus};

    async fn awaiting_call() -> ToolCall {
        let mut call = ToolCall::new("default", "pii", "t2", vec![], "phases");
        PiiTool
            .create(&mut call, &json!({"key": "test"}))
            .await
            .unwrap();
        call
    }

    fn answer(action: &str, content: Option<Value>) -> AdvanceResult {
        AdvanceResult::Elicitation(ElicitationResult {
            action: action.to_string(),
            content,
        })
    }

    #[tokio::test]
    async fn test_create_awaits_elicitation() {
        let call = awaiting_call().await;
        assert_eq!(call.status, ToolCallStatus::AwaitingElicitationResult);
        let request = call.elicitation_request.as_ref().unwrap();
        assert!(request.message.contains("PII"));
        assert!(call.validate().is_ok());
    }

    #[tokio::test]
    async fn test_accept_approved() {
        let mut call = awaiting_call().await;
        PiiTool
            .advance(&mut call, answer("accept", Some(json!({"approved": true}))))
            .await
            .unwrap();
        assert_eq!(call.status, ToolCallStatus::Success);
        assert_eq!(call.result, Some(json!({"data": "here's your PII"})));
        assert!(call.elicitation_request.is_none());
    }

    #[tokio::test]
    async fn test_accept_disapproved_cancels() {
        let mut call = awaiting_call().await;
        PiiTool
            .advance(&mut call, answer("accept", Some(json!({"approved": false}))))
            .await
            .unwrap();
        assert_eq!(call.status, ToolCallStatus::Canceled);
        assert!(call.result.is_none());
    }

    #[tokio::test]
    async fn test_non_accept_actions_cancel() {
        for action in ["decline", "reject", "cancel"] {
            let mut call = awaiting_call().await;
            PiiTool.advance(&mut call, answer(action, None)).await.unwrap();
            assert_eq!(call.status, ToolCallStatus::Canceled, "action {action}");
        }
    }
}
