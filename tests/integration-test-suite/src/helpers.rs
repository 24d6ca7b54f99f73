//! Shared plumbing: build a local app and drive its router in-process.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use serde_json::Value;
use tower::ServiceExt;

use durable_mcp_queue::MemoryQueue;
use durable_mcp_server::{build_with, App, ServerConfig};
use durable_mcp_store::MemoryStore;

/// Build a local app over fresh in-memory store and queue.
pub async fn test_app() -> App {
    test_app_with(ServerConfig::default()).await
}

pub async fn test_app_with(config: ServerConfig) -> App {
    build_with(
        &config,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryQueue::new("phase_processing")),
    )
    .await
    .expect("app builds")
}

/// One in-process round trip through the router.
pub async fn send(app: &App, request: Request<Body>) -> Response<Body> {
    app.router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible")
}

pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    let bytes = serde_json::to_vec(body).expect("serializable body");
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("content-length", bytes.len())
        .body(Body::from(bytes))
        .expect("valid request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body")
        .to_vec()
}

/// Response ETag header, unquoted.
pub fn etag_of(response: &Response<Body>) -> String {
    response
        .headers()
        .get("etag")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_matches('"').to_string())
        .expect("etag header")
}

/// Poll a GET until the returned status field matches, or give up.
pub async fn wait_for_status(app: &App, uri: &str, expected: &str) -> Value {
    for _ in 0..100 {
        let response = send(app, get(uri)).await;
        let body = body_json(response).await;
        if body["status"] == expected {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("tool call never reached status {expected}");
}
