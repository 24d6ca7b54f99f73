//! Tool-call lifecycle scenarios: create, poll, advance, cancel, background
//! progression, and optimistic-concurrency behaviour.

use axum::http::{Method, Request};
use axum::body::Body;
use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn test_add_happy_path() {
    let app = test_app().await;

    let response = send(
        &app,
        json_request(Method::PUT, "/mcp/tools/add/calls/t1", &json!({"x": 5, "y": 3})),
    )
    .await;
    assert_eq!(response.status(), 200);
    let etag = etag_of(&response);
    assert!(!etag.is_empty());
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["result"], json!({"sum": 8}));

    // Subsequent GET returns the same body.
    let fetched = send(&app, get("/mcp/tools/add/calls/t1")).await;
    assert_eq!(fetched.status(), 200);
    assert_eq!(etag_of(&fetched), etag);
    assert_eq!(body_json(fetched).await, body);
}

#[tokio::test]
async fn test_create_replay_and_conflict() {
    let app = test_app().await;
    let create = || json_request(Method::PUT, "/mcp/tools/add/calls/t1", &json!({"x": 5, "y": 3}));

    let first = send(&app, create()).await;
    assert_eq!(first.status(), 200);
    let first_body = body_json(first).await;

    // Same logical create: replayed, body identical including the ETag field.
    let retry = send(&app, create()).await;
    assert_eq!(retry.status(), 200);
    assert_eq!(body_json(retry).await, first_body);

    // Different body, same id: idempotency-key mismatch.
    let other = send(
        &app,
        json_request(Method::PUT, "/mcp/tools/add/calls/t1", &json!({"x": 1, "y": 1})),
    )
    .await;
    assert_eq!(other.status(), 409);
    let body = body_json(other).await;
    assert_eq!(body["error"]["code"], "Conflict");
}

#[tokio::test]
async fn test_pii_elicitation_approved() {
    let app = test_app().await;

    let created = send(
        &app,
        json_request(Method::PUT, "/mcp/tools/pii/calls/t2", &json!({"key": "test"})),
    )
    .await;
    assert_eq!(created.status(), 200);
    let body = body_json(created).await;
    assert_eq!(body["status"], "awaitingElicitationResult");
    let message = body["elicitationRequest"]["message"].as_str().unwrap();
    assert!(message.contains("PII"));

    let advanced = send(
        &app,
        json_request(
            Method::POST,
            "/mcp/tools/pii/calls/t2/advance",
            &json!({"action": "accept", "content": {"approved": true}}),
        ),
    )
    .await;
    assert_eq!(advanced.status(), 200);
    let body = body_json(advanced).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["result"], json!({"data": "here's your PII"}));
    assert!(body.get("elicitationRequest").is_none());
}

#[tokio::test]
async fn test_pii_elicitation_disapproved() {
    let app = test_app().await;
    send(
        &app,
        json_request(Method::PUT, "/mcp/tools/pii/calls/t2", &json!({"key": "test"})),
    )
    .await;

    let advanced = send(
        &app,
        json_request(
            Method::POST,
            "/mcp/tools/pii/calls/t2/advance",
            &json!({"action": "accept", "content": {"approved": false}}),
        ),
    )
    .await;
    assert_eq!(advanced.status(), 200);
    let body = body_json(advanced).await;
    assert_eq!(body["status"], "canceled");
    assert!(body.get("result").is_none());
}

#[tokio::test]
async fn test_pii_cancel_like_actions() {
    for action in ["decline", "reject", "cancel"] {
        let app = test_app().await;
        send(
            &app,
            json_request(Method::PUT, "/mcp/tools/pii/calls/t2", &json!({"key": "test"})),
        )
        .await;

        let advanced = send(
            &app,
            json_request(
                Method::POST,
                "/mcp/tools/pii/calls/t2/advance",
                &json!({"action": action}),
            ),
        )
        .await;
        assert_eq!(advanced.status(), 200, "action {action}");
        let body = body_json(advanced).await;
        assert_eq!(body["status"], "canceled", "action {action}");
    }
}

#[tokio::test]
async fn test_pii_missing_action_is_bad_request() {
    let app = test_app().await;
    send(
        &app,
        json_request(Method::PUT, "/mcp/tools/pii/calls/t2", &json!({"key": "test"})),
    )
    .await;

    let advanced = send(
        &app,
        json_request(
            Method::POST,
            "/mcp/tools/pii/calls/t2/advance",
            &json!({"content": {"approved": true}}),
        ),
    )
    .await;
    assert_eq!(advanced.status(), 400);
}

#[tokio::test]
async fn test_count_background_progression() {
    let app = test_app().await;

    let created = send(
        &app,
        json_request(
            Method::PUT,
            "/mcp/tools/count/calls/t3",
            &json!({"start": 0, "increments": 3}),
        ),
    )
    .await;
    assert_eq!(created.status(), 200);
    let body = body_json(created).await;
    assert_eq!(body["status"], "running");

    // The phase manager drains the queue in the background.
    let done = wait_for_status(&app, "/mcp/tools/count/calls/t3", "success").await;
    assert_eq!(done["result"], json!({"n": 3}));
    assert!(done.get("phase").is_none());
}

#[tokio::test]
async fn test_optimistic_concurrency_collision() {
    let app = test_app().await;

    let created = send(
        &app,
        json_request(Method::PUT, "/mcp/tools/pii/calls/t6", &json!({"key": "test"})),
    )
    .await;
    let etag = etag_of(&created);

    let advance_with_etag = |payload: serde_json::Value| {
        let bytes = serde_json::to_vec(&payload).unwrap();
        Request::builder()
            .method(Method::POST)
            .uri("/mcp/tools/pii/calls/t6/advance")
            .header("content-type", "application/json")
            .header("content-length", bytes.len())
            .header("if-match", format!("\"{etag}\""))
            .body(Body::from(bytes))
            .unwrap()
    };

    // Two advances race with the same loaded ETag: one wins, one gets 412.
    let winner = send(
        &app,
        advance_with_etag(json!({"action": "accept", "content": {"approved": true}})),
    )
    .await;
    assert_eq!(winner.status(), 200);
    let new_etag = etag_of(&winner);
    assert_ne!(new_etag, etag);

    let loser = send(
        &app,
        advance_with_etag(json!({"action": "decline"})),
    )
    .await;
    assert_eq!(loser.status(), 412);

    // The store kept the winner's transition.
    let final_state = body_json(send(&app, get("/mcp/tools/pii/calls/t6")).await).await;
    assert_eq!(final_state["status"], "success");
    assert_eq!(final_state["etag"], new_etag);
}

#[tokio::test]
async fn test_conditional_get_not_modified() {
    let app = test_app().await;
    let created = send(
        &app,
        json_request(Method::PUT, "/mcp/tools/add/calls/t1", &json!({"x": 2, "y": 2})),
    )
    .await;
    let etag = etag_of(&created);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/mcp/tools/add/calls/t1")
        .header("if-none-match", format!("\"{etag}\""))
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), 304);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let app = test_app().await;
    send(
        &app,
        json_request(Method::PUT, "/mcp/tools/pii/calls/t7", &json!({"key": "test"})),
    )
    .await;

    let first = send(
        &app,
        json_request(Method::POST, "/mcp/tools/pii/calls/t7/cancel", &json!({})),
    )
    .await;
    assert_eq!(first.status(), 200);
    let first_body = body_json(first).await;
    assert_eq!(first_body["status"], "canceled");
    assert!(first_body.get("result").is_none());
    assert!(first_body.get("error").is_none());
    assert!(first_body.get("elicitationRequest").is_none());

    let second = send(
        &app,
        json_request(Method::POST, "/mcp/tools/pii/calls/t7/cancel", &json!({})),
    )
    .await;
    assert_eq!(second.status(), 200);
    assert_eq!(body_json(second).await, first_body);
}

#[tokio::test]
async fn test_terminal_states_absorb_advances() {
    let app = test_app().await;
    send(
        &app,
        json_request(Method::PUT, "/mcp/tools/add/calls/t8", &json!({"x": 1, "y": 2})),
    )
    .await;

    let advanced = send(
        &app,
        json_request(
            Method::POST,
            "/mcp/tools/add/calls/t8/advance",
            &json!({"action": "accept"}),
        ),
    )
    .await;
    assert_eq!(advanced.status(), 409);

    let fetched = body_json(send(&app, get("/mcp/tools/add/calls/t8")).await).await;
    assert_eq!(fetched["status"], "success");
}

#[tokio::test]
async fn test_summarize_sampling_roundtrip() {
    let app = test_app().await;

    let created = send(
        &app,
        json_request(
            Method::PUT,
            "/mcp/tools/summarize/calls/t9?api-version=2025-06-18",
            &json!({"text": "a very long report"}),
        ),
    )
    .await;
    assert_eq!(created.status(), 200);
    let body = body_json(created).await;
    assert_eq!(body["status"], "awaitingSamplingResult");
    assert!(body["samplingRequest"]["messages"][0]["content"]
        .as_str()
        .unwrap()
        .contains("a very long report"));

    let advanced = send(
        &app,
        json_request(
            Method::POST,
            "/mcp/tools/summarize/calls/t9/advance?api-version=2025-06-18",
            &json!({"role": "assistant", "content": "it is long", "stopReason": "endTurn"}),
        ),
    )
    .await;
    assert_eq!(advanced.status(), 200);
    let body = body_json(advanced).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["result"], json!({"summary": "it is long"}));
}

#[tokio::test]
async fn test_list_calls_for_tool() {
    let app = test_app().await;
    send(
        &app,
        json_request(Method::PUT, "/mcp/tools/add/calls/t1", &json!({"x": 1, "y": 1})),
    )
    .await;
    send(
        &app,
        json_request(Method::PUT, "/mcp/tools/add/calls/t2", &json!({"x": 2, "y": 2})),
    )
    .await;
    send(
        &app,
        json_request(Method::PUT, "/mcp/tools/pii/calls/t3", &json!({"key": "k"})),
    )
    .await;

    let listed = body_json(send(&app, get("/mcp/tools/add/calls")).await).await;
    let calls = listed["toolCalls"].as_array().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0]["toolCallId"], "t1");
    assert_eq!(calls[1]["toolCallId"], "t2");
}
