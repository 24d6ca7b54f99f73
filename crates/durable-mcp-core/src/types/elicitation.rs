//! Elicitation types
//!
//! Server-initiated request for one piece of structured client input,
//! answered by an advance POST.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sub-document set on a tool call while it awaits an elicitation result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElicitationRequest {
    /// Prompt shown to the user
    pub message: String,
    /// JSON Schema describing the expected `content` of the answer
    pub requested_schema: Value,
}

impl ElicitationRequest {
    /// Request a single boolean field named `field`.
    pub fn boolean(message: impl Into<String>, field: &str) -> Self {
        Self {
            message: message.into(),
            requested_schema: serde_json::json!({
                "type": "object",
                "properties": { field: { "type": "boolean" } },
                "required": [field],
            }),
        }
    }
}

/// Body of an advance POST answering an elicitation.
///
/// `action` is required; everything other than `"accept"` (decline, reject,
/// cancel, …) is treated as a cancellation of the tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitationResult {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl ElicitationResult {
    pub fn is_accept(&self) -> bool {
        self.action == "accept"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_schema() {
        let req = ElicitationRequest::boolean("Share PII?", "approved");
        assert_eq!(req.requested_schema["required"][0], "approved");
        assert_eq!(
            req.requested_schema["properties"]["approved"]["type"],
            "boolean"
        );
    }

    #[test]
    fn test_action_required() {
        let err = serde_json::from_str::<ElicitationResult>("{\"content\":{}}");
        assert!(err.is_err());

        let ok: ElicitationResult =
            serde_json::from_str("{\"action\":\"decline\"}").unwrap();
        assert!(!ok.is_accept());
        assert!(ok.content.is_none());
    }
}
