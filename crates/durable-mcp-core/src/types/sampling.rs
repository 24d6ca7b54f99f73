//! Sampling types
//!
//! Server-initiated request for the client's LLM to produce a message,
//! answered by an advance POST.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in a sampling conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplingMessage {
    pub role: String,
    pub content: Value,
}

impl SamplingMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Value::String(content.into()),
        }
    }
}

/// Sub-document set on a tool call while it awaits a sampling result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SamplingRequest {
    pub messages: Vec<SamplingMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Body of an advance POST answering a sampling request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingResult {
    pub role: String,
    pub content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl SamplingResult {
    /// Extract the produced text, if the content is textual.
    pub fn text(&self) -> Option<&str> {
        self.content.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let req = SamplingRequest {
            messages: vec![SamplingMessage::user("summarize this")],
            system_prompt: Some("one line".to_string()),
            max_tokens: Some(64),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["systemPrompt"], "one line");
        assert_eq!(json["maxTokens"], 64);
    }

    #[test]
    fn test_result_text() {
        let result: SamplingResult = serde_json::from_value(serde_json::json!({
            "role": "assistant",
            "content": "a summary",
            "stopReason": "endTurn",
        }))
        .unwrap();
        assert_eq!(result.text(), Some("a summary"));
    }
}
