//! API integration tests.
//!
//! These tests drive the HTTP router end-to-end with axum's test utilities.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use repl_tunnel::api::{create_router, AppState};
use repl_tunnel::command::CommandTable;
use repl_tunnel::config::ReplOptions;
use repl_tunnel::host::LocalHost;
use repl_tunnel::script::Interpreter;
use repl_tunnel::{service, SessionId, SessionRegistry};

fn app() -> (Router, Arc<SessionRegistry>) {
    let host = LocalHost::new(json!({}));
    let registry = Arc::new(SessionRegistry::new(
        host.clone(),
        Arc::new(Interpreter),
        CommandTable::builtin(),
        ReplOptions::default(),
        SessionId::new("127.0.0.1:30303"),
    ));
    service::install(&host, &registry).unwrap();
    let router = create_router(AppState::new(Arc::clone(&registry)), "/repl");
    (router, registry)
}

/// Helper to create a JSON request.
fn json_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");

    match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Helper to extract body as string.
async fn response_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&body).to_string()
}

/// Helper to extract JSON from response.
async fn response_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(json_request(Method::POST, uri, Some(body)))
        .await
        .unwrap();
    let status = response.status();
    (status, response_json(response).await)
}

// ============================================================================
// Health & Info Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _registry) = app();

    let response = app
        .oneshot(json_request(Method::GET, "/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_text(response).await, "OK");
}

#[tokio::test]
async fn test_info_lists_sessions() {
    let (app, _registry) = app();
    post(&app, "/repl", json!({"id": "w1", "cmd": "1"})).await;

    let response = app
        .oneshot(json_request(Method::GET, "/", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["name"], "repl-tunnel");
    assert_eq!(json["status"], "running");
    assert_eq!(json["sessions"][0]["id"], "w1");
    assert_eq!(json["sessions"][0]["status"], "open");
}

// ============================================================================
// Command Tests
// ============================================================================

#[tokio::test]
async fn test_command_evaluates() {
    let (app, _registry) = app();

    let (status, json) = post(&app, "/repl", json!({"cmd": "1+2"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"ok": true, "out": "3"}));
}

#[tokio::test]
async fn test_command_default_session_keeps_state() {
    let (app, registry) = app();

    post(&app, "/repl", json!({"cmd": "x = 20"})).await;
    let (_, json) = post(&app, "/repl", json!({"cmd": "x + 1"})).await;
    assert_eq!(json["out"], "21");
    assert!(registry.get("web").unwrap().is_some());
}

#[tokio::test]
async fn test_command_sessions_are_separate() {
    let (app, _registry) = app();

    post(&app, "/repl", json!({"id": "a", "cmd": "y = 1"})).await;
    let (_, json) = post(&app, "/repl", json!({"id": "b", "cmd": "y"})).await;
    assert_eq!(json["out"], "ReferenceError: y is not defined");
}

#[tokio::test]
async fn test_command_structured_echo() {
    let (app, _registry) = app();

    let (_, json) = post(&app, "/repl", json!({"cmd": "sys:repl,echo:true,x:1"})).await;
    assert_eq!(json["out"], "{ sys: 'repl', echo: true, x: 1 }");
}

#[tokio::test]
async fn test_command_after_quit_reopens() {
    let (app, _registry) = app();

    let (status, json) = post(&app, "/repl", json!({"id": "q", "cmd": "quit"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["ok"], false);
    assert!(json["err"].as_str().unwrap().contains("connection closed"));

    let (status, json) = post(&app, "/repl", json!({"id": "q", "cmd": "2*2"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["out"], "4");
}

#[tokio::test]
async fn test_command_deep_nesting_is_answered() {
    let (app, _registry) = app();

    let (status, json) = post(&app, "/repl", json!({"cmd": "[".repeat(200_000)})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["out"].as_str().unwrap().starts_with("SyntaxError"));

    let (_, json) = post(&app, "/repl", json!({"cmd": "2*3"})).await;
    assert_eq!(json["out"], "6");
}

#[tokio::test]
async fn test_invalid_json_body() {
    let (app, _registry) = app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/repl")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ invalid json }"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = response_json(response).await;
    assert_eq!(json["ok"], false);
    assert!(json["err"].is_string());
}

// ============================================================================
// Invoke Tests
// ============================================================================

#[tokio::test]
async fn test_invoke_object_body() {
    let (app, _registry) = app();

    let (status, json) = post(
        &app,
        "/invoke/repl",
        json!({"body": {"sys": "repl", "send": "cmd", "id": "fn1", "cmd": "6*7"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["statusCode"], 200);

    let body: Value = serde_json::from_str(json["body"].as_str().unwrap()).unwrap();
    assert_eq!(body, json!({"out": "42"}));
}

#[tokio::test]
async fn test_invoke_string_body_default_session() {
    let (app, registry) = app();

    let body = json!({"sys": "repl", "send": "cmd", "cmd": "1+1"}).to_string();
    let (_, json) = post(&app, "/invoke/repl", json!({ "body": body })).await;
    assert_eq!(json["statusCode"], 200);
    assert!(registry.get("invoke").unwrap().is_some());
}

#[tokio::test]
async fn test_invoke_host_error() {
    let (app, _registry) = app();

    let (_, json) = post(&app, "/invoke/repl", json!({"body": {"zed": 1}})).await;
    assert_eq!(json["statusCode"], 500);
    let body: Value = serde_json::from_str(json["body"].as_str().unwrap()).unwrap();
    assert_eq!(body["error$"]["code"], "act_not_found");
}

#[tokio::test]
async fn test_invoke_unknown_function() {
    let (app, _registry) = app();

    let (status, _) = post(&app, "/invoke/other", json!({"body": {}})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_method_not_allowed() {
    let (app, _registry) = app();

    let response = app
        .oneshot(json_request(Method::PUT, "/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
