//! Integration tests for the HTTP surface.
//!
//! Requests go straight into the router with `tower::ServiceExt::oneshot`;
//! no socket is bound.

mod common;

use std::time::Duration;

use axum::body::{to_bytes, Body, BodyDataStream};
use axum::http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use test_context::test_context;
use tower::ServiceExt;

use crate::common::{create_issue, TestHarness, ALICE, BOB};
use engagement_core::server::middleware::USER_HEADER;

async fn send(app: &Router, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Next NDJSON frame from a streaming response body.
async fn next_frame(body: &mut BodyDataStream) -> Value {
    let chunk = tokio::time::timeout(Duration::from_secs(1), body.next())
        .await
        .expect("Timed out waiting for frame")
        .expect("Stream ended")
        .unwrap();
    serde_json::from_slice(&chunk).unwrap()
}

#[test_context(TestHarness)]
#[tokio::test]
async fn health_reports_store_status(ctx: &TestHarness) {
    let app = ctx.app();

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["status"], "ok");

    ctx.store.set_offline(true);
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn create_requires_identity(ctx: &TestHarness) {
    let app = ctx.app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/issues",
        None,
        Some(json!({"title": "Crash", "description": "On launch"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["retryable"], false);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn create_and_fetch_issue(ctx: &TestHarness) {
    let app = ctx.app();

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/issues",
        Some(ALICE),
        Some(json!({"title": "Crash", "description": "On launch", "issue_type": "bug"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["issue_number"], 1);
    assert_eq!(created["status"], "open");
    assert_eq!(created["created_by"], ALICE);

    let id = created["id"].as_str().unwrap();
    let (status, fetched) = send(&app, Method::GET, &format!("/api/issues/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, listed) = send(&app, Method::GET, "/api/issues", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn validation_errors_name_the_field(ctx: &TestHarness) {
    let app = ctx.app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/issues",
        Some(ALICE),
        Some(json!({"title": "", "description": "On launch"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "title");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn unknown_issue_is_404(ctx: &TestHarness) {
    let app = ctx.app();
    let uri = format!("/api/issues/{}", engagement_core::common::IssueId::new());

    let (status, _) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn upvote_twice_reports_already_voted(ctx: &TestHarness) {
    let app = ctx.app();
    let issue = create_issue(&ctx.engine, ALICE, "Dark mode").await;
    let uri = format!("/api/issues/{}/upvote", issue.id);

    let (status, first) = send(&app, Method::POST, &uri, Some(BOB), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, json!({"success": true, "already_acted": false, "upvotes": 1}));

    let (status, second) = send(&app, Method::POST, &uri, Some(BOB), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["success"], false);
    assert_eq!(second["already_acted"], true);
    assert_eq!(second["upvotes"], 1);
    assert_eq!(second["message"], "You already voted for this issue");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn close_without_note_then_with_note(ctx: &TestHarness) {
    let app = ctx.app();
    let issue = create_issue(&ctx.engine, ALICE, "Crash").await;
    let uri = format!("/api/issues/{}/status", issue.id);

    let (status, body) = send(&app, Method::POST, &uri, Some(BOB), Some(json!({"status": "closed"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "resolution_note");

    let (status, body) = send(
        &app,
        Method::POST,
        &uri,
        Some(BOB),
        Some(json!({"status": "Closed", "resolution_note": "Fixed in 2.4"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    assert_eq!(body["from"], "open");
    assert_eq!(body["issue"]["status"], "closed");

    let (status, history) = send(
        &app,
        Method::GET,
        &format!("/api/issues/{}/history?order=desc", issue.id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().map(Vec::len), Some(1));
    assert_eq!(history[0]["to_status"], "closed");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn unknown_status_is_bad_request(ctx: &TestHarness) {
    let app = ctx.app();
    let issue = create_issue(&ctx.engine, ALICE, "Crash").await;

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/issues/{}/status", issue.id),
        Some(BOB),
        Some(json!({"status": "archived"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn follow_toggle_and_followers(ctx: &TestHarness) {
    let app = ctx.app();
    let issue = create_issue(&ctx.engine, ALICE, "Search").await;
    let follow = format!("/api/issues/{}/follow", issue.id);
    let following = format!("/api/issues/{}/following", issue.id);
    let followers = format!("/api/issues/{}/followers", issue.id);

    let (_, body) = send(&app, Method::GET, &following, Some(BOB), None).await;
    assert_eq!(body["following"], false);

    let (status, body) = send(&app, Method::POST, &follow, Some(BOB), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["following"], true);

    let (_, body) = send(&app, Method::GET, &followers, None, None).await;
    assert_eq!(body, json!([ALICE, BOB]));

    let (_, body) = send(&app, Method::POST, &follow, Some(ALICE), None).await;
    assert_eq!(body["following"], false);
    let (_, body) = send(&app, Method::GET, &followers, None, None).await;
    assert_eq!(body, json!([BOB]));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn comments_and_assignment(ctx: &TestHarness) {
    let app = ctx.app();
    let issue = create_issue(&ctx.engine, ALICE, "Upload").await;
    let comments = format!("/api/issues/{}/comments", issue.id);

    let (status, comment) = send(&app, Method::POST, &comments, Some(BOB), Some(json!({"message": "Me too"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["user"], BOB);

    let (_, listed) = send(&app, Method::GET, &comments, None, None).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let (status, assigned) = send(
        &app,
        Method::POST,
        &format!("/api/issues/{}/assign", issue.id),
        Some(ALICE),
        Some(json!({"assignee": "dev@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned["assigned_to"], "dev@example.com");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn delete_purges_issue(ctx: &TestHarness) {
    let app = ctx.app();
    let issue = create_issue(&ctx.engine, ALICE, "Obsolete").await;
    let uri = format!("/api/issues/{}", issue.id);

    let (status, _) = send(&app, Method::DELETE, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn store_outage_is_retryable_503(ctx: &TestHarness) {
    let app = ctx.app();
    let issue = create_issue(&ctx.engine, ALICE, "Outage").await;

    ctx.store.set_offline(true);
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/issues/{}/upvote", issue.id),
        Some(BOB),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn stream_rejects_unknown_topics(ctx: &TestHarness) {
    let app = ctx.app();

    let request = Request::builder()
        .uri("/api/streams/not-a-topic")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn stream_delivers_scoped_events(ctx: &TestHarness) {
    let app = ctx.app();
    let issue = create_issue(&ctx.engine, ALICE, "Live").await;
    let other = create_issue(&ctx.engine, ALICE, "Elsewhere").await;

    let request = Request::builder()
        .uri(format!("/api/streams/{}", issue.id))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/x-ndjson");

    let mut body = response.into_body().into_data_stream();

    // The subscription is live once the handler has returned.
    assert_eq!(next_frame(&mut body).await["type"], "connected");

    ctx.engine.upvote(other.id, BOB).await.unwrap();
    ctx.engine.upvote(issue.id, BOB).await.unwrap();

    let frame = next_frame(&mut body).await;
    assert_eq!(frame["type"], "upvoted");
    assert_eq!(frame["issue_id"], issue.id.to_string());
}
