//! Integration tests for the guestbook endpoints.
//!
//! Drives the full write pipeline through [`handle_request`]: rate
//! limiting, honeypot obfuscation, validation boundaries, and the
//! read-back contract (newest first, no `ip_hash`, cap of 50).

mod common;

use bytes::Bytes;
use common::*;
use http_body_util::Full;
use hyper::{Method, Request, StatusCode};
use site_api::handle_request;

#[tokio::test]
async fn post_then_read_roundtrip() {
    init_tracing();
    let state = memory_state();

    let resp = handle_request(
        post_json("/api/guestbook", &submission("Ada", "Hello")),
        state.clone(),
        test_addr(),
    )
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["entry"]["name"], "Ada");
    assert_eq!(body["entry"]["message"], "Hello");
    assert!(body["entry"]["created_at"].is_string());
    assert!(body["entry"].get("ip_hash").is_none());

    let resp = handle_request(
        empty_request(Method::GET, "/api/guestbook"),
        state,
        test_addr(),
    )
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let entries = body_json(resp.into_body()).await;
    let entries = entries.as_array().expect("guestbook read must be an array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "Ada");
    assert_eq!(entries[0]["message"], "Hello");
    assert!(entries[0]["created_at"].is_string());
    assert!(entries[0].get("ip_hash").is_none());
}

#[tokio::test]
async fn empty_guestbook_reads_as_empty_array() {
    init_tracing();
    let state = memory_state();

    let resp = handle_request(
        empty_request(Method::GET, "/api/guestbook"),
        state,
        test_addr(),
    )
    .await
    .unwrap();

    let body = body_json(resp.into_body()).await;
    assert_eq!(body, serde_json::json!([]));
}

#[tokio::test]
async fn second_post_from_same_ip_is_rate_limited() {
    init_tracing();
    let state = memory_state();

    let resp = handle_request(
        post_json("/api/guestbook", &submission("Ada", "Hello")),
        state.clone(),
        test_addr(),
    )
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = handle_request(
        post_json("/api/guestbook", &submission("Ada", "Again")),
        state.clone(),
        test_addr(),
    )
    .await
    .unwrap_err()
    .into_response();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "Please wait before posting again");
    assert_eq!(body["retryAfter"], "1 hour");

    // Only the first entry was persisted.
    let resp = handle_request(
        empty_request(Method::GET, "/api/guestbook"),
        state,
        test_addr(),
    )
    .await
    .unwrap();
    let entries = body_json(resp.into_body()).await;
    assert_eq!(entries.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn honeypot_fakes_success_without_storing() {
    init_tracing();
    let state = memory_state();

    let payload = serde_json::json!({
        "name": "Bot",
        "message": "Buy now",
        "website": "https://spam.example",
    });
    let resp = handle_request(
        post_json("/api/guestbook", &payload),
        state.clone(),
        test_addr(),
    )
    .await
    .unwrap();

    // Indistinguishable from a real success to the sender.
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["success"], true);

    let resp = handle_request(
        empty_request(Method::GET, "/api/guestbook"),
        state,
        test_addr(),
    )
    .await
    .unwrap();
    let entries = body_json(resp.into_body()).await;
    assert_eq!(entries, serde_json::json!([]));
}

#[tokio::test]
async fn invalid_json_is_rejected() {
    init_tracing();
    let state = memory_state();

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/guestbook")
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from_static(b"{not json")))
        .unwrap();

    let resp = handle_request(req, state, test_addr())
        .await
        .unwrap_err()
        .into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "Invalid JSON");
}

#[tokio::test]
async fn missing_fields_are_rejected() {
    init_tracing();
    let state = memory_state();

    let resp = handle_request(
        post_json("/api/guestbook", &submission("", "Hello")),
        state,
        test_addr(),
    )
    .await
    .unwrap_err()
    .into_response();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "Name and message are required");
}

#[tokio::test]
async fn name_boundary_is_exact() {
    init_tracing();
    let state = memory_state();

    let at_limit = "n".repeat(50);
    let resp = handle_request(
        post_json("/api/guestbook", &submission(&at_limit, "Hello")),
        state.clone(),
        test_addr(),
    )
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let over_limit = "n".repeat(51);
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/guestbook")
        .header("x-forwarded-for", "198.51.100.2")
        .body(Full::new(Bytes::from(
            submission(&over_limit, "Hello").to_string(),
        )))
        .unwrap();
    let resp = handle_request(req, state.clone(), test_addr())
        .await
        .unwrap_err()
        .into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "Name too long (max 50 characters)");

    // The rejected entry is not visible to readers.
    let resp = handle_request(
        empty_request(Method::GET, "/api/guestbook"),
        state,
        test_addr(),
    )
    .await
    .unwrap();
    let entries = body_json(resp.into_body()).await;
    assert_eq!(entries.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn message_boundary_is_exact() {
    init_tracing();
    let state = memory_state();

    let at_limit = "m".repeat(500);
    let resp = handle_request(
        post_json("/api/guestbook", &submission("Ada", &at_limit)),
        state.clone(),
        test_addr(),
    )
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let over_limit = "m".repeat(501);
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/guestbook")
        .header("x-forwarded-for", "198.51.100.2")
        .body(Full::new(Bytes::from(
            submission("Grace", &over_limit).to_string(),
        )))
        .unwrap();
    let resp = handle_request(req, state, test_addr())
        .await
        .unwrap_err()
        .into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "Message too long (max 500 characters)");
}

#[tokio::test]
async fn oversized_body_is_rejected_before_buffering() {
    init_tracing();
    let state = memory_state();

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/guestbook")
        .header("content-length", "1000000")
        .body(Full::new(Bytes::from_static(b"{}")))
        .unwrap();

    let resp = handle_request(req, state, test_addr())
        .await
        .unwrap_err()
        .into_response();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn reads_cap_at_fifty_newest_first() {
    init_tracing();
    let state = memory_state();

    // 55 distinct authors, so no rate limiting interferes.
    for i in 0..55 {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/guestbook")
            .header("x-forwarded-for", format!("203.0.113.{i}"))
            .body(Full::new(Bytes::from(
                submission(&format!("visitor-{i:02}"), "hi").to_string(),
            )))
            .unwrap();
        let resp = handle_request(req, state.clone(), test_addr()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        // Creation timestamps have millisecond precision; keep them distinct.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let resp = handle_request(
        empty_request(Method::GET, "/api/guestbook"),
        state,
        test_addr(),
    )
    .await
    .unwrap();
    let entries = body_json(resp.into_body()).await;
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 50);
    assert_eq!(entries[0]["name"], "visitor-54");
    assert_eq!(entries[49]["name"], "visitor-05");
}

#[tokio::test]
async fn guestbook_roundtrip_in_sqlite() {
    init_tracing();
    let (state, _guard) = sqlite_state();

    let resp = handle_request(
        post_json("/api/guestbook", &submission("Ada", "Hello")),
        state.clone(),
        test_addr(),
    )
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = handle_request(
        empty_request(Method::GET, "/api/guestbook"),
        state,
        test_addr(),
    )
    .await
    .unwrap();
    let entries = body_json(resp.into_body()).await;
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "Ada");
    assert!(entries[0].get("ip_hash").is_none());
}
