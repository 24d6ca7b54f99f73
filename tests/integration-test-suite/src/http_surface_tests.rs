//! HTTP surface behaviour: versioning, routing, stubs, health, and the
//! cross-cutting stages.

use axum::body::Body;
use axum::http::{Method, Request};
use serde_json::json;

use durable_mcp_server::ServerConfig;

use crate::helpers::*;

#[tokio::test]
async fn test_list_tools_versionless_and_versioned() {
    let app = test_app().await;

    let base = body_json(send(&app, get("/mcp/tools")).await).await;
    let names: Vec<&str> = base["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["add", "count", "pii"]);

    let latest = body_json(send(&app, get("/mcp/tools?api-version=2025-06-18")).await).await;
    let names: Vec<&str> = latest["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["add", "count", "pii", "summarize"]);
}

#[tokio::test]
async fn test_summarize_unknown_in_base_version() {
    let app = test_app().await;
    let response = send(
        &app,
        json_request(
            Method::PUT,
            "/mcp/tools/summarize/calls/t1",
            &json!({"text": "hello"}),
        ),
    )
    .await;
    assert_eq!(response.status(), 400);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UnknownTool");
}

#[tokio::test]
async fn test_unknown_api_version_lists_supported() {
    let app = test_app().await;
    let response = send(&app, get("/mcp/tools?api-version=1999-01-01")).await;
    assert_eq!(response.status(), 400);
    assert_eq!(
        response.headers().get("x-ms-error-code").unwrap(),
        "UnknownApiVersion"
    );
    let body = body_json(response).await;
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("2025-06-18"));
}

#[tokio::test]
async fn test_unknown_query_parameter_rejected() {
    let app = test_app().await;
    let response = send(&app, get("/mcp/tools?apiversion=1")).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_action_suffix_url_form() {
    let app = test_app().await;
    send(
        &app,
        json_request(Method::PUT, "/mcp/tools/pii/calls/t2", &json!({"key": "test"})),
    )
    .await;

    let response = send(
        &app,
        json_request(Method::POST, "/mcp/tools/pii/calls/t2:cancel", &json!({})),
    )
    .await;
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response).await["status"], "canceled");
}

#[tokio::test]
async fn test_method_not_allowed_vs_not_found() {
    let app = test_app().await;

    let response = send(
        &app,
        Request::builder()
            .method(Method::DELETE)
            .uri("/mcp/tools")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), 405);

    let response = send(&app, get("/mcp/nothing-here")).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_stub_endpoints_return_204() {
    let app = test_app().await;
    for (method, uri) in [
        (Method::GET, "/mcp/resources"),
        (Method::GET, "/mcp/resources-templates"),
        (Method::GET, "/mcp/resources/some_resource"),
        (Method::GET, "/mcp/prompts"),
        (Method::GET, "/mcp/prompts/some_prompt"),
        (Method::PUT, "/mcp/roots"),
        (Method::POST, "/mcp/complete"),
    ] {
        let response = send(
            &app,
            Request::builder()
                .method(method.clone())
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), 204, "{method} {uri}");
        assert!(body_bytes(response).await.is_empty(), "{method} {uri}");
    }
}

#[tokio::test]
async fn test_health_probe() {
    let app = test_app().await;
    let response = send(&app, get("/health")).await;
    assert_eq!(response.status(), 200);

    app.shutdown.begin_shutdown();
    let response = send(&app, get("/health")).await;
    assert_eq!(response.status(), 503);

    // New API requests are refused while draining.
    let response = send(&app, get("/mcp/tools")).await;
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn test_malformed_json_body() {
    let app = test_app().await;
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/mcp/tools/add/calls/t1")
        .header("content-type", "application/json")
        .header("content-length", 9)
        .body(Body::from("{not json"))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), 400);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "InvalidJson");
}

#[tokio::test]
async fn test_invalid_identifiers_rejected() {
    let app = test_app().await;
    // Too short and illegal characters both fail the identifier rules.
    let response = send(
        &app,
        json_request(Method::PUT, "/mcp/tools/add/calls/t!", &json!({"x": 1, "y": 1})),
    )
    .await;
    assert_eq!(response.status(), 400);

    let response = send(
        &app,
        json_request(Method::PUT, "/mcp/tools/ab/calls/t111", &json!({"x": 1, "y": 1})),
    )
    .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_unsupported_media_type() {
    let app = test_app().await;
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/mcp/tools/add/calls/t1")
        .header("content-type", "text/plain")
        .header("content-length", 2)
        .body(Body::from("{}"))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), 415);
}

#[tokio::test]
async fn test_shared_key_authorization() {
    let config = ServerConfig {
        shared_key: Some("letmein".to_string()),
        ..ServerConfig::default()
    };
    let app = test_app_with(config).await;

    let response = send(&app, get("/mcp/tools")).await;
    assert_eq!(response.status(), 401);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/mcp/tools")
        .header("authorization", "letmein")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_throttle_returns_429() {
    let config = ServerConfig {
        throttle_limit: 2,
        ..ServerConfig::default()
    };
    let app = test_app_with(config).await;

    // Back-to-back requests blow through a limit of two within one second.
    let mut throttled = None;
    for _ in 0..20 {
        let response = send(&app, get("/mcp/tools")).await;
        if response.status() == 429 {
            throttled = Some(response);
            break;
        }
    }
    let response = throttled.expect("no request was throttled");
    assert_eq!(response.headers().get("retry-after").unwrap(), "1");
    assert_eq!(
        response.headers().get("x-ms-error-code").unwrap(),
        "TooManyRequests"
    );
}

#[tokio::test]
async fn test_error_bodies_carry_code_and_header() {
    let app = test_app().await;
    let response = send(&app, get("/mcp/tools/add/calls/missing_1")).await;
    assert_eq!(response.status(), 404);
    assert_eq!(response.headers().get("x-ms-error-code").unwrap(), "NotFound");
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NotFound");
    assert!(body["error"]["message"].as_str().is_some());
}
