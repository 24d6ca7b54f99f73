//! Sampling-driven tool: asks the client's LLM for a one-line summary.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use durable_mcp_core::{SamplingMessage, SamplingRequest, ToolCall};

use super::{AdvanceResult, ToolError, ToolHandler};

pub struct SummarizeTool;

#[derive(Debug, Deserialize)]
struct SummarizeRequest {
    text: String,
}

#[async_trait]
impl ToolHandler for SummarizeTool {
    fn name(&self) -> &'static str {
        "summarize"
    }

    fn description(&self) -> &'static str {
        "Asks the client's model to summarize the supplied text in one line"
    }

    async fn create(&self, call: &mut ToolCall, body: &Value) -> Result<(), ToolError> {
        let request: SummarizeRequest = serde_json::from_value(body.clone())
            .map_err(|err| ToolError::InvalidInput(format!("expected {{text}}: {err}")))?;
        if request.text.is_empty() {
            return Err(ToolError::InvalidInput("text must be non-empty".to_string()));
        }
        call.await_sampling(SamplingRequest {
            messages: vec![SamplingMessage::user(format!(
                "Summarize in one line: {}",
                request.text
            ))],
            system_prompt: Some("Reply with a single short sentence.".to_string()),
            max_tokens: Some(64),
        })?;
        Ok(())
    }

    async fn advance(&self, call: &mut ToolCall, result: AdvanceResult) -> Result<(), ToolError> {
        let AdvanceResult::Sampling(answer) = result else {
            return Err(ToolError::InvalidInput(
                "summarize expects a sampling result".to_string(),
            ));
        };
        match answer.text().filter(|text| !text.is_empty()) {
            Some(summary) => call.succeed(json!({"summary": summary}))?,
            None => call.fail(json!({"message": "client returned no content"}))?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use durable_mcp_core::{SamplingResult, ToolCallStatus};

    async fn awaiting_call() -> ToolCall {
        let mut call = ToolCall::new("default", "summarize", "t4", vec![], "phases");
        SummarizeTool
            .create(&mut call, &json!({"text": "a long document"}))
            .await
            .unwrap();
        call
    }

    fn sampled(content: Value) -> AdvanceResult {
        AdvanceResult::Sampling(SamplingResult {
            role: "assistant".to_string(),
            content,
            model: None,
            stop_reason: Some("endTurn".to_string()),
        })
    }

    #[tokio::test]
    async fn test_create_awaits_sampling() {
        let call = awaiting_call().await;
        assert_eq!(call.status, ToolCallStatus::AwaitingSamplingResult);
        let request = call.sampling_request.as_ref().unwrap();
        assert!(request.messages[0]
            .content
            .as_str()
            .unwrap()
            .contains("a long document"));
        assert!(call.validate().is_ok());
    }

    #[tokio::test]
    async fn test_sampled_text_becomes_result() {
        let mut call = awaiting_call().await;
        SummarizeTool
            .advance(&mut call, sampled(json!("it is long")))
            .await
            .unwrap();
        assert_eq!(call.status, ToolCallStatus::Success);
        assert_eq!(call.result, Some(json!({"summary": "it is long"})));
        assert!(call.sampling_request.is_none());
    }

    #[tokio::test]
    async fn test_empty_content_fails_the_call() {
        let mut call = awaiting_call().await;
        SummarizeTool
            .advance(&mut call, sampled(json!("")))
            .await
            .unwrap();
        assert_eq!(call.status, ToolCallStatus::Failed);
        assert!(call.error.is_some());
    }
}
