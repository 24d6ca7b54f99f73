//! The tool-call resource and its status machine.
//!
//! A tool call is keyed by `(tenant, name, toolCallId)`. The stored document
//! carries everything including audit fields and the idempotency key; the
//! wire body is the trimmed [`WireToolCall`] view.
//!
//! Status machine:
//!
//! ```text
//! submitted ── create ──► running ──► success | failed
//!     │                      │ ▲
//!     │                      ▼ │ (advance)
//!     └──► awaitingElicitationResult / awaitingSamplingResult
//!                            │
//!                            └──► success | failed | canceled
//! ```
//!
//! Terminal states (success, failed, canceled) are absorbing; transition
//! methods reject any attempt to leave them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ServiceError, ServiceResult};
use crate::types::elicitation::ElicitationRequest;
use crate::types::sampling::SamplingRequest;

/// How long a freshly created tool call lives before it is eligible for GC.
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Lifecycle status of a tool call. Exactly one value at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolCallStatus {
    Submitted,
    Running,
    AwaitingSamplingResult,
    AwaitingElicitationResult,
    Success,
    Failed,
    Canceled,
}

impl ToolCallStatus {
    /// Terminal states admit no further status changes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }

    /// States in which an advance POST is legal.
    pub fn is_awaiting(&self) -> bool {
        matches!(
            self,
            Self::AwaitingSamplingResult | Self::AwaitingElicitationResult
        )
    }
}

impl std::fmt::Display for ToolCallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::AwaitingSamplingResult => "awaitingSamplingResult",
            Self::AwaitingElicitationResult => "awaitingElicitationResult",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Persistence model for one tool call.
///
/// Handlers own a copy for the duration of a single request and must write it
/// back through the store with an If-Match condition; the store owns the ETag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tenant: String,
    /// Registered tool name
    pub name: String,
    pub tool_call_id: String,
    pub status: ToolCallStatus,
    /// Tool-private subdivision of `running`; non-empty iff status = running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Server-assigned version token, replaced on every successful put
    pub etag: String,
    /// Absolute time after which the record is eligible for GC
    pub expiration: DateTime<Utc>,
    /// Fingerprint of the logical create, for recognising retried PUTs
    #[serde(with = "base64_bytes")]
    pub idempotency_key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_request: Option<SamplingRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elicitation_request: Option<ElicitationRequest>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Phase-processing attempts so far
    #[serde(default)]
    pub attempt: u32,
    /// Queue that carries this call's phase messages
    pub advance_queue: String,
}

impl ToolCall {
    /// A freshly submitted tool call with the default 24h expiration.
    pub fn new(
        tenant: impl Into<String>,
        name: impl Into<String>,
        tool_call_id: impl Into<String>,
        idempotency_key: Vec<u8>,
        advance_queue: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            tenant: tenant.into(),
            name: name.into(),
            tool_call_id: tool_call_id.into(),
            status: ToolCallStatus::Submitted,
            phase: None,
            etag: String::new(),
            expiration: now + Duration::hours(DEFAULT_TTL_HOURS),
            idempotency_key,
            request: None,
            progress: None,
            result: None,
            error: None,
            sampling_request: None,
            elicitation_request: None,
            created: now,
            modified: now,
            attempt: 0,
            advance_queue: advance_queue.into(),
        }
    }

    /// Store key, `tenant/name/id`.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.tenant, self.name, self.tool_call_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }

    fn transition(&mut self, next: ToolCallStatus) -> ServiceResult<()> {
        if self.status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "tool call {} is already {}",
                self.tool_call_id, self.status
            )));
        }
        self.status = next;
        if next != ToolCallStatus::Running {
            self.phase = None;
        }
        if next != ToolCallStatus::AwaitingElicitationResult {
            self.elicitation_request = None;
        }
        if next != ToolCallStatus::AwaitingSamplingResult {
            self.sampling_request = None;
        }
        Ok(())
    }

    /// Enter `running` with a non-empty tool-private phase.
    pub fn start_running(&mut self, phase: impl Into<String>) -> ServiceResult<()> {
        let phase = phase.into();
        if phase.is_empty() {
            return Err(ServiceError::Internal(
                "running requires a non-empty phase".to_string(),
            ));
        }
        self.transition(ToolCallStatus::Running)?;
        self.phase = Some(phase);
        Ok(())
    }

    /// Replace the phase while already running.
    pub fn advance_phase(&mut self, phase: impl Into<String>) -> ServiceResult<()> {
        if self.status != ToolCallStatus::Running {
            return Err(ServiceError::Internal(format!(
                "cannot advance phase while {}",
                self.status
            )));
        }
        let phase = phase.into();
        if phase.is_empty() {
            return Err(ServiceError::Internal(
                "running requires a non-empty phase".to_string(),
            ));
        }
        self.phase = Some(phase);
        Ok(())
    }

    /// Suspend awaiting an elicitation answer.
    pub fn await_elicitation(&mut self, request: ElicitationRequest) -> ServiceResult<()> {
        self.transition(ToolCallStatus::AwaitingElicitationResult)?;
        self.elicitation_request = Some(request);
        Ok(())
    }

    /// Suspend awaiting a sampling answer.
    pub fn await_sampling(&mut self, request: SamplingRequest) -> ServiceResult<()> {
        self.transition(ToolCallStatus::AwaitingSamplingResult)?;
        self.sampling_request = Some(request);
        Ok(())
    }

    pub fn succeed(&mut self, result: Value) -> ServiceResult<()> {
        self.transition(ToolCallStatus::Success)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: Value) -> ServiceResult<()> {
        self.transition(ToolCallStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Cancel: clears the awaiting sub-documents, any result, and any error.
    pub fn cancel(&mut self) -> ServiceResult<()> {
        self.transition(ToolCallStatus::Canceled)?;
        self.result = None;
        self.error = None;
        Ok(())
    }

    /// Check the resource invariants; violations are internal errors.
    pub fn validate(&self) -> ServiceResult<()> {
        let running = self.status == ToolCallStatus::Running;
        let has_phase = self.phase.as_deref().is_some_and(|p| !p.is_empty());
        if running != has_phase {
            return Err(ServiceError::Internal(format!(
                "phase must be non-empty iff running (status={}, phase={:?})",
                self.status, self.phase
            )));
        }
        let awaiting_elicitation = self.status == ToolCallStatus::AwaitingElicitationResult;
        if awaiting_elicitation != self.elicitation_request.is_some() {
            return Err(ServiceError::Internal(
                "elicitationRequest must be set iff awaitingElicitationResult".to_string(),
            ));
        }
        let awaiting_sampling = self.status == ToolCallStatus::AwaitingSamplingResult;
        if awaiting_sampling != self.sampling_request.is_some() {
            return Err(ServiceError::Internal(
                "samplingRequest must be set iff awaitingSamplingResult".to_string(),
            ));
        }
        Ok(())
    }

    /// The client-visible representation.
    pub fn to_wire(&self) -> WireToolCall {
        WireToolCall {
            name: self.name.clone(),
            tool_call_id: self.tool_call_id.clone(),
            tenant: self.tenant.clone(),
            status: self.status,
            phase: self.phase.clone(),
            expiration: self.expiration,
            etag: self.etag.clone(),
            request: self.request.clone(),
            progress: self.progress.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            sampling_request: self.sampling_request.clone(),
            elicitation_request: self.elicitation_request.clone(),
        }
    }
}

/// Wire body of a tool call; audit fields and the idempotency key stay
/// server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireToolCall {
    pub name: String,
    pub tool_call_id: String,
    pub tenant: String,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub expiration: DateTime<Utc>,
    pub etag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_request: Option<SamplingRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elicitation_request: Option<ElicitationRequest>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> ToolCall {
        ToolCall::new("default", "count", "call_1", vec![1, 2, 3], "phases")
    }

    #[test]
    fn test_new_is_submitted() {
        let c = call();
        assert_eq!(c.status, ToolCallStatus::Submitted);
        assert!(c.phase.is_none());
        assert!(c.validate().is_ok());
        assert!(c.expiration > Utc::now() + Duration::hours(23));
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&ToolCallStatus::AwaitingElicitationResult).unwrap();
        assert_eq!(json, "\"awaitingElicitationResult\"");
        let json = serde_json::to_string(&ToolCallStatus::Submitted).unwrap();
        assert_eq!(json, "\"submitted\"");
    }

    #[test]
    fn test_running_requires_phase() {
        let mut c = call();
        assert!(c.start_running("").is_err());
        c.start_running("3").unwrap();
        assert_eq!(c.status, ToolCallStatus::Running);
        assert_eq!(c.phase.as_deref(), Some("3"));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_phase_cleared_on_success() {
        let mut c = call();
        c.start_running("3").unwrap();
        c.succeed(serde_json::json!({"n": 3})).unwrap();
        assert!(c.phase.is_none());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_terminal_states_absorb() {
        let mut c = call();
        c.succeed(serde_json::json!({})).unwrap();
        assert!(c.start_running("1").is_err());
        assert!(c.cancel().is_err());
        assert!(c.fail(serde_json::json!({})).is_err());
        assert_eq!(c.status, ToolCallStatus::Success);
    }

    #[test]
    fn test_cancel_clears_outputs() {
        let mut c = call();
        c.await_elicitation(ElicitationRequest::boolean("ok?", "approved"))
            .unwrap();
        c.result = Some(serde_json::json!({"leftover": true}));
        c.cancel().unwrap();
        assert!(c.elicitation_request.is_none());
        assert!(c.result.is_none());
        assert!(c.error.is_none());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_awaiting_invariants() {
        let mut c = call();
        c.await_sampling(SamplingRequest {
            messages: vec![],
            system_prompt: None,
            max_tokens: None,
        })
        .unwrap();
        assert!(c.validate().is_ok());
        assert!(c.status.is_awaiting());

        // Dangling sub-document is an invariant violation.
        c.status = ToolCallStatus::Submitted;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_stored_roundtrip_keeps_internal_fields() {
        let mut c = call();
        c.start_running("2").unwrap();
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains("idempotencyKey"));
        assert!(json.contains("advanceQueue"));
        let back: ToolCall = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_wire_elides_internal_fields() {
        let c = call();
        let wire = serde_json::to_value(c.to_wire()).unwrap();
        assert!(wire.get("idempotencyKey").is_none());
        assert!(wire.get("advanceQueue").is_none());
        assert!(wire.get("created").is_none());
        assert_eq!(wire["toolCallId"], "call_1");
        assert_eq!(wire["status"], "submitted");
    }
}
