//! Ordered stage chain with a request deadline and panic capture.
//!
//! Stages run synchronously in order; each either short-circuits by writing
//! a response (returning [`ServerError::Responded`]) or calls
//! `ctx.next()`. Untyped errors surfacing at the entry are logged and mapped
//! to a 500 with an error body; panics and deadline overruns become bare
//! 500s because the context that could have written a body is gone.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, Uri};
use bytes::Bytes;
use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::error;

use durable_mcp_core::ServiceError;

use crate::reqres::{RequestContext, ResponseBuffer};

/// Default overall request deadline.
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(4 * 60);

/// Typed stage failure.
///
/// `Responded` means the response was already written by whoever produced
/// the error; the pipeline must not write again.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("response written with status {status}")]
    Responded { status: u16 },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// One cross-cutting stage of the request pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn call(&self, ctx: &mut RequestContext) -> ServerResult<()>;
}

/// The assembled stage chain.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    deadline: Duration,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>, deadline: Duration, shutdown: CancellationToken) -> Self {
        Self {
            stages,
            deadline,
            shutdown,
        }
    }

    /// Run one request through the chain and return the buffered response.
    pub async fn dispatch(
        &self,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> ResponseBuffer {
        let cancel = self.shutdown.child_token();
        let stages = self.stages.clone();
        let request_line = format!("{method} {}", uri.path());

        let run = async move {
            let mut ctx = RequestContext::new(method, uri, &headers, body, stages, cancel.clone());
            let result = ctx.next().await;
            finalize(ctx, result)
        };

        let guarded = AssertUnwindSafe(run).catch_unwind();
        tokio::select! {
            _ = self.shutdown.cancelled() => {
                error!("{}: cancelled by shutdown", request_line);
                ResponseBuffer::internal_error()
            }
            outcome = tokio::time::timeout(self.deadline, guarded) => match outcome {
                Ok(Ok(buffer)) => buffer,
                Ok(Err(_panic)) => {
                    error!("{}: panic recovered in pipeline", request_line);
                    ResponseBuffer::internal_error()
                }
                Err(_elapsed) => {
                    error!("{}: request deadline exceeded", request_line);
                    ResponseBuffer::internal_error()
                }
            },
        }
    }
}

fn finalize(mut ctx: RequestContext, result: ServerResult<()>) -> ResponseBuffer {
    match result {
        Ok(()) => {
            if !ctx.response.is_written() {
                // A route matched but nothing wrote; that is a handler bug.
                let _ = ctx.error(
                    &ServiceError::Internal("handler produced no response".to_string()),
                    None,
                );
            }
        }
        Err(ServerError::Responded { .. }) => {}
        Err(ServerError::Internal(message)) => {
            error!("unhandled pipeline error: {}", message);
            if !ctx.response.is_written() {
                let _ = ctx.error(&ServiceError::Internal(message), None);
            }
        }
    }
    ctx.response
}
