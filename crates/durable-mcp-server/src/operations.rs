//! Generic tool-call operations behind the versioned routes.
//!
//! Each operation loads the call through the store (with the caller's
//! conditional headers), applies the tool's behaviour, and persists with an
//! If-Match on the ETag it loaded, the optimistic-concurrency contract that
//! makes concurrent writers lose cleanly with a 412.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use durable_mcp_core::validation::{validate_identifier, validate_tenant};
use durable_mcp_core::{AccessConditions, ServiceError, ToolCall, WireToolCall};
use durable_mcp_store::StoreError;

use crate::phase::PhaseManager;
use crate::pipeline::{ServerError, ServerResult};
use crate::reqres::{RequestContext, RequestHeaders, ResponseHeaders};
use crate::router::Operation;
use crate::tools::{AdvanceResult, ToolHandler, ToolRegistry};

/// Shared dependencies for every operation.
pub struct ServiceState {
    pub store: Arc<dyn durable_mcp_store::ToolCallStore>,
    pub phase_manager: Arc<PhaseManager>,
    pub registries: HashMap<String, Arc<ToolRegistry>>,
}

impl ServiceState {
    fn registry_for(&self, version: &str) -> Result<&Arc<ToolRegistry>, ServiceError> {
        self.registries
            .get(version)
            .ok_or_else(|| ServiceError::Internal(format!("no tool registry for version {version:?}")))
    }

    fn tool_for(
        &self,
        version: &str,
        name: &str,
    ) -> Result<Arc<dyn ToolHandler>, ServiceError> {
        self.registry_for(version)?
            .get(name)
            .ok_or_else(|| ServiceError::UnknownTool(name.to_string()))
    }
}

/// Fingerprint of a logical create: SHA-256 of the Date header when the
/// client sent one, else of the body.
pub fn idempotency_key(headers: &RequestHeaders, body: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    match &headers.date {
        Some(date) => hasher.update(date.as_bytes()),
        None => hasher.update(body),
    }
    hasher.finalize().to_vec()
}

fn call_vars(ctx: &RequestContext) -> Result<(String, String), ServiceError> {
    let name = path_var(ctx, "toolName")?;
    let id = path_var(ctx, "toolCallId")?;
    validate_identifier("toolName", &name)?;
    validate_identifier("toolCallId", &id)?;
    validate_tenant(&ctx.tenant)?;
    Ok((name, id))
}

fn path_var(ctx: &RequestContext, name: &str) -> Result<String, ServiceError> {
    ctx.path_vars
        .get(name)
        .cloned()
        .ok_or_else(|| ServiceError::BadRequest(format!("missing path variable {name}")))
}

fn map_store_error(err: StoreError, id: &str) -> ServiceError {
    match err {
        StoreError::NotFound => ServiceError::NotFound(id.to_string()),
        // Unsafe operations turn a matched If-None-Match into a 412.
        StoreError::PreconditionFailed | StoreError::NotModified => {
            ServiceError::PreconditionFailed
        }
        StoreError::Backend { message } => ServiceError::Internal(message),
    }
}

fn write_call(ctx: &mut RequestContext, status: u16, call: &ToolCall) -> ServerResult<()> {
    ctx.write_response(
        status,
        ResponseHeaders::for_resource(&call.etag, call.modified),
        Some(&call.to_wire()),
    )
}

fn first_etag(header: &str) -> String {
    header
        .split(',')
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches('"')
        .to_string()
}

/// PUT /mcp/tools/{toolName}/calls/{toolCallId}
pub struct CreateToolCall {
    pub state: Arc<ServiceState>,
}

#[async_trait]
impl Operation for CreateToolCall {
    async fn invoke(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        let (name, id) = call_vars(ctx).map_err(|err| ctx.error(&err, None))?;
        let tool = self
            .state
            .tool_for(&ctx.api_version, &name)
            .map_err(|err| ctx.error(&err, Some(name.clone())))?;

        let key = idempotency_key(&ctx.headers, &ctx.body);
        match self
            .state
            .store
            .get(&ctx.tenant, &name, &id, &AccessConditions::none())
            .await
        {
            Ok(existing) => {
                return if existing.idempotency_key == key {
                    // A retried PUT of the same logical create.
                    write_call(ctx, 200, &existing)
                } else {
                    Err(ctx.error(
                        &ServiceError::Conflict(format!(
                            "tool call {id} already exists with a different create"
                        )),
                        Some(id),
                    ))
                };
            }
            Err(StoreError::NotFound) => {}
            Err(err) => return Err(ctx.error(&map_store_error(err, &id), Some(id))),
        }

        let body: Value = ctx
            .unmarshal_body()
            .map_err(|err| ctx.error(&err, Some(id.clone())))?;
        let mut call = ToolCall::new(
            ctx.tenant.clone(),
            name,
            id.clone(),
            key,
            self.state.phase_manager.queue_name(),
        );
        call.request = Some(body.clone());
        tool.create(&mut call, &body)
            .await
            .map_err(|err| ctx.error(&err.into(), Some(id.clone())))?;
        call.validate()
            .map_err(|err| ctx.error(&err, Some(id.clone())))?;

        let stored = self
            .state
            .store
            .put(&ctx.tenant, &call, &AccessConditions::if_none_match_any())
            .await
            .map_err(|err| ctx.error(&map_store_error(err, &id), Some(id.clone())))?;

        if stored.status == durable_mcp_core::ToolCallStatus::Running && tool.has_phases() {
            self.state
                .phase_manager
                .start_phase_processing(&stored)
                .await
                .map_err(|err| {
                    ctx.error(
                        &ServiceError::Internal(format!("enqueue phase message: {err}")),
                        Some(id.clone()),
                    )
                })?;
        }
        write_call(ctx, 200, &stored)
    }
}

/// GET /mcp/tools/{toolName}/calls/{toolCallId}
pub struct GetToolCall {
    pub state: Arc<ServiceState>,
}

#[async_trait]
impl Operation for GetToolCall {
    async fn invoke(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        let (name, id) = call_vars(ctx).map_err(|err| ctx.error(&err, None))?;
        let tool = self
            .state
            .tool_for(&ctx.api_version, &name)
            .map_err(|err| ctx.error(&err, Some(name.clone())))?;

        let conditions = ctx.headers.access_conditions();
        let call = match self.state.store.get(&ctx.tenant, &name, &id, &conditions).await {
            Ok(call) => call,
            Err(StoreError::NotModified) => {
                let etag = ctx
                    .headers
                    .if_none_match
                    .as_deref()
                    .map(first_etag)
                    .unwrap_or_default();
                return Err(ctx.write_not_modified(&etag));
            }
            Err(StoreError::NotFound) => {
                return Err(ctx.error(&ServiceError::NotFound(id.clone()), Some(id)));
            }
            Err(err) => return Err(ctx.error(&map_store_error(err, &id), Some(id))),
        };

        ctx.validate_preconditions(Some(&call.etag), Some(call.modified))?;
        tool.get(&call)
            .await
            .map_err(|err| ctx.error(&err.into(), Some(id)))?;
        write_call(ctx, 200, &call)
    }
}

/// POST /mcp/tools/{toolName}/calls/{toolCallId}/advance
pub struct AdvanceToolCall {
    pub state: Arc<ServiceState>,
}

#[async_trait]
impl Operation for AdvanceToolCall {
    async fn invoke(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        let (name, id) = call_vars(ctx).map_err(|err| ctx.error(&err, None))?;
        let tool = self
            .state
            .tool_for(&ctx.api_version, &name)
            .map_err(|err| ctx.error(&err, Some(name.clone())))?;

        let conditions = ctx.headers.access_conditions();
        let mut call = self
            .state
            .store
            .get(&ctx.tenant, &name, &id, &conditions)
            .await
            .map_err(|err| ctx.error(&map_store_error(err, &id), Some(id.clone())))?;
        ctx.validate_preconditions(Some(&call.etag), Some(call.modified))?;

        let advance_result = match call.status {
            durable_mcp_core::ToolCallStatus::AwaitingElicitationResult => AdvanceResult::Elicitation(
                ctx.unmarshal_body()
                    .map_err(|err| ctx.error(&err, Some(id.clone())))?,
            ),
            durable_mcp_core::ToolCallStatus::AwaitingSamplingResult => AdvanceResult::Sampling(
                ctx.unmarshal_body()
                    .map_err(|err| ctx.error(&err, Some(id.clone())))?,
            ),
            status => {
                return Err(ctx.error(
                    &ServiceError::Conflict(format!(
                        "tool call is {status}, not awaiting a client result"
                    )),
                    Some(id),
                ));
            }
        };

        let loaded_etag = call.etag.clone();
        tool.advance(&mut call, advance_result)
            .await
            .map_err(|err| ctx.error(&err.into(), Some(id.clone())))?;
        call.validate()
            .map_err(|err| ctx.error(&err, Some(id.clone())))?;

        let stored = self
            .state
            .store
            .put(&ctx.tenant, &call, &AccessConditions::if_match(loaded_etag))
            .await
            .map_err(|err| ctx.error(&map_store_error(err, &id), Some(id.clone())))?;

        if stored.status == durable_mcp_core::ToolCallStatus::Running && tool.has_phases() {
            self.state
                .phase_manager
                .start_phase_processing(&stored)
                .await
                .map_err(|err| {
                    ctx.error(
                        &ServiceError::Internal(format!("enqueue phase message: {err}")),
                        Some(id.clone()),
                    )
                })?;
        }
        write_call(ctx, 200, &stored)
    }
}

/// POST /mcp/tools/{toolName}/calls/{toolCallId}/cancel
pub struct CancelToolCall {
    pub state: Arc<ServiceState>,
}

#[async_trait]
impl Operation for CancelToolCall {
    async fn invoke(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        let (name, id) = call_vars(ctx).map_err(|err| ctx.error(&err, None))?;
        let tool = self
            .state
            .tool_for(&ctx.api_version, &name)
            .map_err(|err| ctx.error(&err, Some(name.clone())))?;

        let conditions = ctx.headers.access_conditions();
        let mut call = self
            .state
            .store
            .get(&ctx.tenant, &name, &id, &conditions)
            .await
            .map_err(|err| ctx.error(&map_store_error(err, &id), Some(id.clone())))?;

        if call.is_terminal() {
            // Cancel of a settled call returns it unchanged.
            return write_call(ctx, 200, &call);
        }

        let loaded_etag = call.etag.clone();
        tool.cancel(&mut call)
            .await
            .map_err(|err| ctx.error(&err.into(), Some(id.clone())))?;
        call.cancel()
            .map_err(|err| ctx.error(&err, Some(id.clone())))?;

        let stored = self
            .state
            .store
            .put(&ctx.tenant, &call, &AccessConditions::if_match(loaded_etag))
            .await
            .map_err(|err| ctx.error(&map_store_error(err, &id), Some(id.clone())))?;
        write_call(ctx, 200, &stored)
    }
}

#[derive(Serialize)]
struct ToolListBody {
    tools: Vec<crate::tools::ToolInfo>,
}

/// GET /mcp/tools
pub struct ListTools {
    pub state: Arc<ServiceState>,
}

#[async_trait]
impl Operation for ListTools {
    async fn invoke(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        let registry = match self.state.registry_for(&ctx.api_version) {
            Ok(registry) => registry.clone(),
            Err(err) => return Err(ctx.error(&err, None)),
        };
        let body = ToolListBody {
            tools: registry.list(),
        };
        ctx.write_response(200, ResponseHeaders::default(), Some(&body))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallListBody {
    tool_calls: Vec<WireToolCall>,
}

/// GET /mcp/tools/{toolName}/calls
pub struct ListToolCalls {
    pub state: Arc<ServiceState>,
}

#[async_trait]
impl Operation for ListToolCalls {
    async fn invoke(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        let name = path_var(ctx, "toolName")
            .and_then(|name| {
                validate_identifier("toolName", &name)?;
                Ok(name)
            })
            .map_err(|err| ctx.error(&err, None))?;
        self.state
            .tool_for(&ctx.api_version, &name)
            .map_err(|err| ctx.error(&err, Some(name.clone())))?;

        let calls = self
            .state
            .store
            .list(&ctx.tenant, &name)
            .await
            .map_err(|err| ctx.error(&map_store_error(err, &name), Some(name.clone())))?;
        let body = CallListBody {
            tool_calls: calls.iter().map(ToolCall::to_wire).collect(),
        };
        ctx.write_response(200, ResponseHeaders::default(), Some(&body))
    }
}

/// The MCP surface this service does not model: 204 with no body.
pub struct StubNoContent;

#[async_trait]
impl Operation for StubNoContent {
    async fn invoke(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        ctx.write_response(204, ResponseHeaders::default(), None::<&()>)
    }
}
