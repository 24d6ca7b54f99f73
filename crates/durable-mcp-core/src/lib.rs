//! # Durable MCP Core
//!
//! Resource model for long-running MCP tool calls.
//!
//! A tool call is a persistent, multi-tenant resource keyed by
//! `(tenant, toolName, toolCallId)`. Its lifecycle is a small status machine
//! (submitted → running / awaiting a client result → terminal) driven by HTTP
//! handlers and by the background phase manager. Every write advances an
//! opaque ETag; writers pass [`conditions::AccessConditions`] so the store can
//! reject lost updates.
//!
//! This crate holds only the data shapes, the status machine, identifier
//! validation, and the wire error taxonomy. Persistence and HTTP live in the
//! sibling crates.

pub mod conditions;
pub mod error;
pub mod types;
pub mod validation;

pub use conditions::{etag_matches, AccessConditions};
pub use error::{ErrorBody, ErrorDetail, ServiceError, ServiceResult};
pub use types::elicitation::{ElicitationRequest, ElicitationResult};
pub use types::sampling::{SamplingMessage, SamplingRequest, SamplingResult};
pub use types::tool_call::{ToolCall, ToolCallStatus, WireToolCall};
