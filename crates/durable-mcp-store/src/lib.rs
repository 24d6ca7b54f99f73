//! # Durable MCP Store
//!
//! Persistence contract for tool calls, plus two backends:
//!
//! - [`memory::MemoryStore`]: process-local map with a GC reaper, for local
//!   and test deployments; state is lost on restart by design.
//! - [`s3::S3Store`]: one object per tool call in a tenant-named bucket,
//!   using the object store's conditional-write primitives.
//!
//! Both enforce [`AccessConditions`] atomically with the mutation, and both
//! assign a fresh ETag on every successful put.

use async_trait::async_trait;
use durable_mcp_core::{AccessConditions, ToolCall};
use thiserror::Error;

pub mod memory;
pub mod s3;

pub use memory::MemoryStore;
pub use s3::S3Store;

/// Unified error type for storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No such tool call (or it was reaped).
    #[error("tool call not found")]
    NotFound,

    /// An If-Match / If-None-Match condition rejected the operation.
    #[error("precondition failed")]
    PreconditionFailed,

    /// Safe read whose If-None-Match matched the stored ETag.
    #[error("not modified")]
    NotModified,

    /// Backend I/O or serialization failure.
    #[error("store backend error: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::backend(format!("serialization: {err}"))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Behavioural contract for tool-call persistence.
///
/// Implementations must be safe under concurrent callers: conditions are
/// checked atomically with the mutation, either by serialising per key or by
/// delegating to the backend's conditional-write primitive.
#[async_trait]
pub trait ToolCallStore: Send + Sync {
    /// Human-readable backend name (e.g. "in-memory", "s3").
    fn backend_name(&self) -> &'static str;

    /// Load one tool call.
    ///
    /// If-Match mismatch ⇒ [`StoreError::PreconditionFailed`];
    /// If-None-Match match ⇒ [`StoreError::NotModified`].
    async fn get(
        &self,
        tenant: &str,
        name: &str,
        tool_call_id: &str,
        conditions: &AccessConditions,
    ) -> StoreResult<ToolCall>;

    /// Persist a tool call, returning the stored record with its new ETag
    /// and refreshed `modified` timestamp.
    ///
    /// If-Match mismatch ⇒ [`StoreError::PreconditionFailed`];
    /// If-None-Match `*` with the resource present ⇒
    /// [`StoreError::PreconditionFailed`] (create-only idiom).
    async fn put(
        &self,
        tenant: &str,
        tool_call: &ToolCall,
        conditions: &AccessConditions,
    ) -> StoreResult<ToolCall>;

    /// Delete a tool call. Honours If-Match; deleting a missing resource is
    /// a no-op success.
    async fn delete(
        &self,
        tenant: &str,
        name: &str,
        tool_call_id: &str,
        conditions: &AccessConditions,
    ) -> StoreResult<()>;

    /// List a tenant's calls for one tool. Expired records are excluded.
    async fn list(&self, tenant: &str, name: &str) -> StoreResult<Vec<ToolCall>>;
}
