//! Terminal stage: resolve the api-version, look up the route, validate the
//! route's header constraints, and invoke the handler.

use std::sync::Arc;

use async_trait::async_trait;

use durable_mcp_core::ServiceError;

use crate::pipeline::{ServerResult, Stage};
use crate::reqres::RequestContext;
use crate::router::{Lookup, VersionedRouter};

/// Query parameter that selects the api-version.
pub const DEFAULT_VERSION_PARAM: &str = "api-version";

pub struct DispatchStage {
    router: Arc<VersionedRouter>,
    version_param: String,
}

impl DispatchStage {
    pub fn new(router: Arc<VersionedRouter>, version_param: impl Into<String>) -> Self {
        Self {
            router,
            version_param: version_param.into(),
        }
    }
}

#[async_trait]
impl Stage for DispatchStage {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    async fn call(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        if let Err(err) = ctx.validate_query(&[self.version_param.as_str()]) {
            return Err(ctx.error(&err, None));
        }

        let requested = ctx.query.get(&self.version_param).cloned();
        let (version, table) = match self.router.resolve(requested.as_deref()) {
            Ok(resolved) => resolved,
            Err(err) => return Err(ctx.error(&err, requested)),
        };
        ctx.api_version = version.to_string();

        match table.lookup(&ctx.method, &ctx.path) {
            Lookup::Found { route, path_vars } => {
                ctx.path_vars = path_vars;
                ctx.validate_header(&route.headers)?;
                route.handler.invoke(ctx).await
            }
            Lookup::MethodNotAllowed => Err(ctx.error(&ServiceError::MethodNotAllowed, None)),
            Lookup::NotFound => Err(ctx.error(
                &ServiceError::NotFound(ctx.original_path.clone()),
                None,
            )),
        }
    }
}
