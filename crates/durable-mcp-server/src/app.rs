//! Application assembly: stores, registries, versioned routes, the stage
//! chain, and the axum entry point.
//!
//! Everything is built explicitly here and passed into stages and handlers
//! by capture; there are no process-wide singletons, and tests swap the
//! store/queue through [`build_with`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::info;

use durable_mcp_monitoring::{start_saturation_sampler, MonitoringSystem};
use durable_mcp_queue::{MemoryQueue, MessageQueue};
use durable_mcp_store::{memory::start_expiration_reaper, MemoryStore, S3Store, ToolCallStore};

use crate::config::ServerConfig;
use crate::operations::{
    AdvanceToolCall, CancelToolCall, CreateToolCall, GetToolCall, ListToolCalls, ListTools,
    ServiceState, StubNoContent,
};
use crate::phase::PhaseManager;
use crate::pipeline::{Pipeline, Stage};
use crate::reqres::HeaderSpec;
use crate::router::{ApiVersion, RouteTable, VersionedRouter};
use crate::stages::{
    AuthStage, DispatchStage, LoggingStage, MetricsStage, ShutdownStage, ShutdownState,
    ThrottleStage, TracingStage,
};
use crate::tools::{AddTool, CountTool, PiiTool, SummarizeTool, ToolRegistry};

/// Newest api-version; also the registry the phase manager resolves tools
/// from (a superset of every shipped version).
pub const LATEST_VERSION: &str = "2025-06-18";

/// Hard cap on request bodies read into memory.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Name of the single process-wide phase queue.
const PHASE_QUEUE: &str = "phase_processing";

/// The assembled service.
pub struct App {
    pub router: axum::Router,
    pub shutdown: Arc<ShutdownState>,
    pub monitoring: MonitoringSystem,
    pub state: Arc<ServiceState>,
}

/// Build with the store/queue chosen by configuration.
pub async fn build(config: &ServerConfig) -> anyhow::Result<App> {
    let store: Arc<dyn ToolCallStore> = if config.local {
        let store = Arc::new(MemoryStore::new());
        start_expiration_reaper(store.clone());
        store
    } else {
        let url = config
            .storage_url
            .as_deref()
            .context("storage url required outside local mode")?;
        Arc::new(
            S3Store::connect(
                url,
                config.storage_account.as_deref(),
                config.storage_key.as_deref(),
                config.bucket_prefix.clone(),
            )
            .await,
        )
    };
    let queue = Arc::new(MemoryQueue::new(PHASE_QUEUE));
    build_with(config, store, queue).await
}

/// Build against explicit store and queue implementations.
pub async fn build_with(
    config: &ServerConfig,
    store: Arc<dyn ToolCallStore>,
    queue: Arc<dyn MessageQueue>,
) -> anyhow::Result<App> {
    let monitoring = MonitoringSystem::new();
    let shutdown = ShutdownState::new(config.drain_delay);

    let registries = build_registries();
    let worker_registry = registries
        .get(LATEST_VERSION)
        .cloned()
        .context("latest version has no registry")?;

    let phase_manager = Arc::new(PhaseManager::new(
        store.clone(),
        queue,
        worker_registry,
        monitoring.metrics(),
        config.phase.clone(),
        shutdown.cancellation_token(),
    ));
    phase_manager
        .start()
        .await
        .map_err(|err| anyhow::anyhow!("start phase manager: {err}"))?;

    let state = Arc::new(ServiceState {
        store,
        phase_manager,
        registries,
    });
    let router = Arc::new(
        build_versioned_router(state.clone())
            .map_err(|err| anyhow::anyhow!("build route tables: {err}"))?,
    );

    let stages: Vec<Arc<dyn Stage>> = vec![
        Arc::new(ShutdownStage::new(shutdown.clone(), monitoring.health())),
        Arc::new(LoggingStage),
        Arc::new(ThrottleStage::new(config.throttle_limit)),
        Arc::new(AuthStage::new(
            config.shared_key.clone(),
            config.tenant.clone(),
        )),
        Arc::new(MetricsStage::new(monitoring.metrics())),
        Arc::new(TracingStage),
        Arc::new(DispatchStage::new(
            router,
            config.api_version_param.clone(),
        )),
    ];
    let pipeline = Arc::new(Pipeline::new(
        stages,
        config.request_deadline,
        shutdown.cancellation_token(),
    ));

    Ok(App {
        router: axum_router(pipeline),
        shutdown,
        monitoring,
        state,
    })
}

/// Bind and serve until ctrl-c, then drain gracefully.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let app = build(&config).await?;
    start_saturation_sampler(app.monitoring.metrics(), Duration::from_secs(30));

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("bind {}:{}", config.host, config.port))?;
    info!("listening on {}", listener.local_addr()?);

    let shutdown = app.shutdown.clone();
    axum::serve(listener, app.router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.begin_shutdown();
            shutdown.cancellation_token().cancelled().await;
        })
        .await
        .context("serve")?;
    Ok(())
}

/// Tool registries per api-version: the base set, and the latest version's
/// clone with the sampling-driven tool added.
fn build_registries() -> HashMap<String, Arc<ToolRegistry>> {
    let mut base = ToolRegistry::new();
    base.insert(Arc::new(AddTool));
    base.insert(Arc::new(PiiTool));
    base.insert(Arc::new(CountTool));

    let mut latest = base.clone();
    latest.insert(Arc::new(SummarizeTool));

    let mut registries = HashMap::new();
    registries.insert(String::new(), Arc::new(base));
    registries.insert(LATEST_VERSION.to_string(), Arc::new(latest));
    registries
}

fn build_versioned_router(state: Arc<ServiceState>) -> Result<VersionedRouter, durable_mcp_core::ServiceError> {
    let base_state = state;
    VersionedRouter::build(vec![
        ApiVersion {
            version: "",
            base: None,
            retire_at: None,
            derive: Box::new(move |table| install_base_routes(table, base_state.clone())),
        },
        ApiVersion {
            version: LATEST_VERSION,
            base: Some(""),
            retire_at: None,
            // Same surface; the tool registry is what differs.
            derive: Box::new(|_table| {}),
        },
    ])
}

fn install_base_routes(table: &mut RouteTable, state: Arc<ServiceState>) {
    use axum::http::Method;

    let json = HeaderSpec::json_body(MAX_BODY_BYTES as u64);
    let read = HeaderSpec::read_only();

    table.insert(
        Method::GET,
        "/mcp/tools",
        read,
        Arc::new(ListTools {
            state: state.clone(),
        }),
    );
    table.insert(
        Method::GET,
        "/mcp/tools/{toolName}/calls",
        read,
        Arc::new(ListToolCalls {
            state: state.clone(),
        }),
    );
    table.insert(
        Method::PUT,
        "/mcp/tools/{toolName}/calls/{toolCallId}",
        json,
        Arc::new(CreateToolCall {
            state: state.clone(),
        }),
    );
    table.insert(
        Method::GET,
        "/mcp/tools/{toolName}/calls/{toolCallId}",
        read,
        Arc::new(GetToolCall {
            state: state.clone(),
        }),
    );
    table.insert(
        Method::POST,
        "/mcp/tools/{toolName}/calls/{toolCallId}/advance",
        json,
        Arc::new(AdvanceToolCall {
            state: state.clone(),
        }),
    );
    table.insert(
        Method::POST,
        "/mcp/tools/{toolName}/calls/{toolCallId}/cancel",
        json,
        Arc::new(CancelToolCall { state }),
    );

    for stub in [
        (Method::GET, "/mcp/resources"),
        (Method::GET, "/mcp/resources-templates"),
        (Method::GET, "/mcp/resources/{name}"),
        (Method::GET, "/mcp/prompts"),
        (Method::GET, "/mcp/prompts/{name}"),
        (Method::PUT, "/mcp/roots"),
        (Method::POST, "/mcp/complete"),
    ] {
        table.insert(stub.0, stub.1, read, Arc::new(StubNoContent));
    }
}

fn axum_router(pipeline: Arc<Pipeline>) -> axum::Router {
    axum::Router::new().fallback(entry).with_state(pipeline)
}

async fn entry(
    State(pipeline): State<Arc<Pipeline>>,
    request: axum::extract::Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };
    pipeline
        .dispatch(parts.method, parts.uri, parts.headers, bytes)
        .await
        .into_response()
}
