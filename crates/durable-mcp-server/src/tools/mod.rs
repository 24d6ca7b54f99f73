//! Tool handler contract and the per-version registry.
//!
//! Every tool implements [`ToolHandler`]: `create` runs inside the PUT
//! handler, `advance` inside the advance POST (already parsed into the shape
//! matching the awaited status), and `process_phase` inside the phase
//! manager for tools whose progression is server-induced.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use durable_mcp_core::{ElicitationResult, SamplingResult, ServiceError, ToolCall};
use durable_mcp_queue::QueueError;

use crate::phase::ProcessingLease;

pub mod add;
pub mod count;
pub mod pii;
pub mod summarize;

pub use add::AddTool;
pub use count::CountTool;
pub use pii::PiiTool;
pub use summarize::SummarizeTool;

/// Tool-level failures, mapped onto the wire taxonomy by the handlers.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The request or advance body is not what the tool expects ⇒ 400.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The tool itself failed ⇒ 500.
    #[error("tool execution failed: {0}")]
    Execution(String),
}

impl From<ToolError> for ServiceError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::InvalidInput(msg) => ServiceError::BadRequest(msg),
            ToolError::Execution(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<ServiceError> for ToolError {
    fn from(err: ServiceError) -> Self {
        ToolError::Execution(err.to_string())
    }
}

impl From<QueueError> for ToolError {
    fn from(err: QueueError) -> Self {
        ToolError::Execution(err.to_string())
    }
}

/// The advance body, parsed into the shape matching the awaited status.
#[derive(Debug, Clone)]
pub enum AdvanceResult {
    Elicitation(ElicitationResult),
    Sampling(SamplingResult),
}

/// Per-tool behaviour behind the generic create/get/advance/cancel handlers.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Transition a freshly submitted call; `body` is the PUT body.
    async fn create(&self, call: &mut ToolCall, body: &Value) -> Result<(), ToolError>;

    /// Hook before the stored record is returned; a passthrough by default.
    async fn get(&self, _call: &ToolCall) -> Result<(), ToolError> {
        Ok(())
    }

    /// Consume a client result and transition out of the awaiting status.
    async fn advance(&self, call: &mut ToolCall, result: AdvanceResult) -> Result<(), ToolError>;

    /// Hook before the generic cancel transition; a no-op by default.
    async fn cancel(&self, _call: &mut ToolCall) -> Result<(), ToolError> {
        Ok(())
    }

    /// Whether this tool's calls progress through server-driven phases.
    fn has_phases(&self) -> bool {
        false
    }

    /// Advance one phase of a running call. Only invoked by the phase
    /// manager, and only for tools reporting `has_phases()`.
    async fn process_phase(
        &self,
        _call: &mut ToolCall,
        _lease: &dyn ProcessingLease,
    ) -> Result<(), ToolError> {
        Err(ToolError::Execution(
            "tool has no server-driven phases".to_string(),
        ))
    }
}

/// Wire shape of one registry entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Tools registered for one api-version. Cloned and mutated the same way
/// route tables are derived.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tool: Arc<dyn ToolHandler>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn remove(&mut self, name: &str) {
        self.tools.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn list(&self) -> Vec<ToolInfo> {
        self.tools
            .values()
            .map(|tool| ToolInfo {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
            })
            .collect()
    }
}
