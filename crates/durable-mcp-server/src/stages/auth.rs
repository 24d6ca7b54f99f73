//! Shared-key authorization stage; also pins the request's tenant.

use async_trait::async_trait;

use durable_mcp_core::ServiceError;

use crate::pipeline::{ServerResult, Stage};
use crate::reqres::RequestContext;

pub struct AuthStage {
    shared_key: Option<String>,
    tenant: String,
}

impl AuthStage {
    pub fn new(shared_key: Option<String>, tenant: impl Into<String>) -> Self {
        Self {
            shared_key,
            tenant: tenant.into(),
        }
    }
}

#[async_trait]
impl Stage for AuthStage {
    fn name(&self) -> &'static str {
        "authorization"
    }

    async fn call(&self, ctx: &mut RequestContext) -> ServerResult<()> {
        if let Some(shared_key) = &self.shared_key {
            if ctx.headers.authorization.as_deref() != Some(shared_key.as_str()) {
                return Err(ctx.error(&ServiceError::Unauthorized, None));
            }
        }
        ctx.tenant = self.tenant.clone();
        ctx.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap, HeaderValue, Method};
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    fn ctx(headers: HeaderMap) -> RequestContext {
        RequestContext::new(
            Method::GET,
            "/mcp/tools".parse().unwrap(),
            &headers,
            Bytes::new(),
            Vec::new(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_open_when_no_key_configured() {
        let stage = AuthStage::new(None, "default");
        let mut ctx = ctx(HeaderMap::new());
        stage.call(&mut ctx).await.unwrap();
        assert_eq!(ctx.tenant, "default");
    }

    #[tokio::test]
    async fn test_matching_key_admitted() {
        let stage = AuthStage::new(Some("secret".to_string()), "default");
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("secret"));
        let mut ctx = ctx(headers);
        stage.call(&mut ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_or_missing_key_rejected() {
        let stage = AuthStage::new(Some("secret".to_string()), "default");

        let mut missing = ctx(HeaderMap::new());
        let err = stage.call(&mut missing).await.unwrap_err();
        assert!(matches!(
            err,
            crate::pipeline::ServerError::Responded { status: 401 }
        ));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("wrong"));
        let mut wrong = ctx(headers);
        let err = stage.call(&mut wrong).await.unwrap_err();
        assert!(matches!(
            err,
            crate::pipeline::ServerError::Responded { status: 401 }
        ));
    }
}
