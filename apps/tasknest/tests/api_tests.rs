//! Integration tests for the TaskNest HTTP API.
//!
//! Uses axum-test against an in-memory engine.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum_test::{TestResponse, TestServer};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tasknest::api::{self, AppState};
use tasknest::config::Settings;
use tasknest_core::{Nest, RedbStore, TokenCodec};

const SECRET: &str = "integration-test-secret-0123456789";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn server_with(settings: Settings) -> TestServer {
    let nest = Nest::in_memory(&settings.jwt_secret, settings.nest_config());
    TestServer::new(api::router(AppState::new(nest, settings))).unwrap()
}

/// Server whose engine reads the time from the returned handle.
fn server_with_clock() -> (TestServer, Arc<Mutex<DateTime<Utc>>>) {
    let settings = Settings::for_tests(SECRET);
    let now = Arc::new(Mutex::new(Utc::now()));
    let clock = Arc::clone(&now);
    let nest = Nest::in_memory(&settings.jwt_secret, settings.nest_config())
        .with_clock(move || *clock.lock().unwrap());
    let server = TestServer::new(api::router(AppState::new(nest, settings))).unwrap();
    (server, now)
}

fn server() -> TestServer {
    server_with(Settings::for_tests(SECRET))
}

async fn signup(server: &TestServer, email: &str) -> Value {
    let response = server
        .post("/api/auth/signup")
        .json(&json!({ "email": email, "password": "password123" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<Value>()
}

async fn access_token(server: &TestServer, email: &str) -> String {
    signup(server, email).await["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn create_todo(server: &TestServer, token: &str, body: Value) -> Value {
    let response = server
        .post("/api/todos")
        .authorization_bearer(token)
        .json(&body)
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<Value>()
}

fn assert_error(response: &TestResponse, status: StatusCode, code: &str) {
    assert_eq!(response.status_code(), status);
    let body = response.json::<Value>();
    assert_eq!(body["code"], code, "body: {body}");
    assert!(body["message"].is_string());
    assert!(body["details"].is_array());
}

fn challenge(response: &TestResponse) -> Option<&HeaderValue> {
    response.headers().get(header::WWW_AUTHENTICATE)
}

// =============================================================================
// SERVICE ENDPOINTS
// =============================================================================

#[tokio::test]
async fn test_root_and_health() {
    let server = server();

    let root = server.get("/").await;
    assert_eq!(root.status_code(), StatusCode::OK);
    assert_eq!(root.json::<Value>()["status"], "ok");

    let health = server.get("/health").await.json::<Value>();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["service"], "tasknest");
}

#[tokio::test]
async fn test_unknown_route_uses_envelope() {
    let response = server().get("/api/nothing-here").await;
    assert_error(&response, StatusCode::NOT_FOUND, "NOT_FOUND");
}

#[tokio::test]
async fn test_wrong_method_uses_envelope() {
    let server = server();
    let token = access_token(&server, "wes@example.com").await;
    let todo = create_todo(&server, &token, json!({ "title": "x" })).await;
    let path = format!("/api/todos/{}", todo["id"].as_str().unwrap());

    let response = server.post(&path).authorization_bearer(&token).await;
    assert_error(&response, StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED");

    let response = server.delete("/health").await;
    assert_error(&response, StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED");
}

// =============================================================================
// AUTH
// =============================================================================

#[tokio::test]
async fn test_signup_returns_tokens_and_user() {
    let server = server();
    let body = signup(&server, "  Alice@Example.com ").await;

    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["expires_in"], 900);
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["role"], "user");
    assert_eq!(body["user"]["is_verified"], false);
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_signup_duplicate_email_conflicts() {
    let server = server();
    signup(&server, "bob@example.com").await;

    let response = server
        .post("/api/auth/signup")
        .json(&json!({ "email": "BOB@example.com", "password": "password123" }))
        .await;
    assert_error(&response, StatusCode::CONFLICT, "ALREADY_EXISTS");
}

#[tokio::test]
async fn test_signup_validation_reports_fields() {
    let response = server()
        .post("/api/auth/signup")
        .json(&json!({ "email": "not-an-email", "password": "short" }))
        .await;
    assert_error(&response, StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR");

    let body = response.json::<Value>();
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["field"].as_str())
        .collect();
    assert_eq!(fields, vec!["email", "password"]);
}

#[tokio::test]
async fn test_malformed_json_is_validation_error() {
    let response = server()
        .post("/api/auth/login")
        .content_type("application/json")
        .bytes(Bytes::from_static(b"{not json"))
        .await;
    assert_error(&response, StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_login_errors_are_generic() {
    let server = server();
    signup(&server, "carol@example.com").await;

    let wrong_password = server
        .post("/api/auth/login")
        .json(&json!({ "email": "carol@example.com", "password": "wrong-password" }))
        .await;
    let unknown_user = server
        .post("/api/auth/login")
        .json(&json!({ "email": "nobody@example.com", "password": "password123" }))
        .await;

    assert_error(&wrong_password, StatusCode::UNAUTHORIZED, "UNAUTHORIZED");
    assert_error(&unknown_user, StatusCode::UNAUTHORIZED, "UNAUTHORIZED");
    assert_eq!(
        wrong_password.json::<Value>()["message"],
        unknown_user.json::<Value>()["message"]
    );
    assert!(challenge(&wrong_password).is_some());

    let ok = server
        .post("/api/auth/login")
        .json(&json!({ "email": "carol@example.com", "password": "password123" }))
        .await;
    assert_eq!(ok.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_me_requires_bearer() {
    let server = server();

    let missing = server.get("/api/auth/me").await;
    assert_error(&missing, StatusCode::UNAUTHORIZED, "UNAUTHORIZED");
    assert_eq!(challenge(&missing), Some(&HeaderValue::from_static("Bearer")));

    let garbage = server.get("/api/auth/me").authorization_bearer("abc.def.ghi").await;
    assert_error(&garbage, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");

    let token = access_token(&server, "dave@example.com").await;
    let me = server.get("/api/auth/me").authorization_bearer(&token).await;
    assert_eq!(me.status_code(), StatusCode::OK);
    assert_eq!(me.json::<Value>()["email"], "dave@example.com");
}

#[tokio::test]
async fn test_expired_access_token_is_token_expired() {
    let (server, now) = server_with_clock();
    let token = access_token(&server, "dora@example.com").await;

    *now.lock().unwrap() += Duration::minutes(16);
    let response = server.get("/api/auth/me").authorization_bearer(&token).await;
    assert_error(&response, StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED");
    assert_eq!(challenge(&response), Some(&HeaderValue::from_static("Bearer")));
}

#[tokio::test]
async fn test_token_from_other_secret_is_rejected() {
    let server = server();
    let other = server_with(Settings::for_tests("a-completely-different-secret-value"));
    let foreign = access_token(&other, "eve@example.com").await;

    let response = server.get("/api/auth/me").authorization_bearer(&foreign).await;
    assert_error(&response, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");
}

#[tokio::test]
async fn test_refresh_rotates_and_detects_reuse() {
    let server = server();
    let first = signup(&server, "frank@example.com").await;
    let old_refresh = first["refresh_token"].as_str().unwrap();

    let rotated = server
        .post("/api/auth/refresh")
        .json(&json!({ "refresh_token": old_refresh }))
        .await;
    assert_eq!(rotated.status_code(), StatusCode::OK);
    let new_refresh = rotated.json::<Value>()["refresh_token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(new_refresh, old_refresh);

    let replay = server
        .post("/api/auth/refresh")
        .json(&json!({ "refresh_token": old_refresh }))
        .await;
    assert_error(&replay, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");

    // Reuse revoked the whole family.
    let after = server
        .post("/api/auth/refresh")
        .json(&json!({ "refresh_token": new_refresh }))
        .await;
    assert_error(&after, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");
}

#[tokio::test]
async fn test_access_token_cannot_refresh() {
    let server = server();
    let token = access_token(&server, "gail@example.com").await;
    let response = server
        .post("/api/auth/refresh")
        .json(&json!({ "refresh_token": token }))
        .await;
    assert_error(&response, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let server = server();
    let body = signup(&server, "hal@example.com").await;
    let refresh = body["refresh_token"].as_str().unwrap();

    for _ in 0..2 {
        let response = server
            .post("/api/auth/logout")
            .json(&json!({ "refresh_token": refresh }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>()["message"], "Successfully logged out");
    }

    let response = server
        .post("/api/auth/refresh")
        .json(&json!({ "refresh_token": refresh }))
        .await;
    assert_error(&response, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");
}

#[tokio::test]
async fn test_logout_signs_out_every_device() {
    let server = server();
    let phone = signup(&server, "hugo@example.com").await;
    let laptop = server
        .post("/api/auth/login")
        .json(&json!({ "email": "hugo@example.com", "password": "password123" }))
        .await
        .json::<Value>();

    let response = server
        .post("/api/auth/logout")
        .json(&json!({ "refresh_token": phone["refresh_token"] }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .post("/api/auth/refresh")
        .json(&json!({ "refresh_token": laptop["refresh_token"] }))
        .await;
    assert_error(&response, StatusCode::UNAUTHORIZED, "INVALID_TOKEN");
}

#[tokio::test]
async fn test_auth_endpoints_are_rate_limited() {
    let settings = Settings {
        auth_rate_limit: 2,
        ..Settings::for_tests(SECRET)
    };
    let server = server_with(settings);
    let body = json!({ "email": "x@example.com", "password": "password123" });

    server.post("/api/auth/login").json(&body).await;
    server.post("/api/auth/login").json(&body).await;
    let limited = server.post("/api/auth/login").json(&body).await;
    assert_error(&limited, StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED");

    // Health is not limited.
    assert_eq!(server.get("/health").await.status_code(), StatusCode::OK);
}

// =============================================================================
// TODOS
// =============================================================================

#[tokio::test]
async fn test_create_and_get_todo() {
    let server = server();
    let token = access_token(&server, "ivy@example.com").await;

    let todo = create_todo(
        &server,
        &token,
        json!({
            "title": "  Buy milk  ",
            "description": "2 litres",
            "priority": "high",
            "category": "shopping",
            "due_date": "2030-01-01T09:00:00Z"
        }),
    )
    .await;
    assert_eq!(todo["title"], "Buy milk");
    assert_eq!(todo["status"], "pending");
    assert_eq!(todo["priority"], "high");
    assert!(todo.get("deleted_at").is_none());

    let id = todo["id"].as_str().unwrap();
    let fetched = server
        .get(&format!("/api/todos/{id}"))
        .authorization_bearer(&token)
        .await;
    assert_eq!(fetched.status_code(), StatusCode::OK);
    assert_eq!(fetched.json::<Value>()["category"], "shopping");
}

#[tokio::test]
async fn test_create_todo_validation() {
    let server = server();
    let token = access_token(&server, "jay@example.com").await;

    let blank = server
        .post("/api/todos")
        .authorization_bearer(&token)
        .json(&json!({ "title": "   " }))
        .await;
    assert_error(&blank, StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR");

    let long = server
        .post("/api/todos")
        .authorization_bearer(&token)
        .json(&json!({ "title": "x".repeat(201) }))
        .await;
    assert_error(&long, StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR");

    let bad_priority = server
        .post("/api/todos")
        .authorization_bearer(&token)
        .json(&json!({ "title": "ok", "priority": "urgent" }))
        .await;
    assert_error(&bad_priority, StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_todos_are_isolated_between_users() {
    let server = server();
    let alice = access_token(&server, "alice@example.com").await;
    let bob = access_token(&server, "bob@example.com").await;

    let todo = create_todo(&server, &alice, json!({ "title": "private" })).await;
    let path = format!("/api/todos/{}", todo["id"].as_str().unwrap());

    let get = server.get(&path).authorization_bearer(&bob).await;
    assert_error(&get, StatusCode::NOT_FOUND, "NOT_FOUND");
    let put = server
        .put(&path)
        .authorization_bearer(&bob)
        .json(&json!({ "title": "hijacked" }))
        .await;
    assert_error(&put, StatusCode::NOT_FOUND, "NOT_FOUND");
    let delete = server.delete(&path).authorization_bearer(&bob).await;
    assert_error(&delete, StatusCode::NOT_FOUND, "NOT_FOUND");

    let listed = server
        .get("/api/todos")
        .authorization_bearer(&bob)
        .await
        .json::<Value>();
    assert_eq!(listed["total"], 0);
}

#[tokio::test]
async fn test_bad_path_id_is_validation_error() {
    let server = server();
    let token = access_token(&server, "kay@example.com").await;
    let response = server
        .get("/api/todos/not-a-uuid")
        .authorization_bearer(&token)
        .await;
    assert_error(&response, StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_update_partial_and_null_clears() {
    let server = server();
    let token = access_token(&server, "lou@example.com").await;
    let todo = create_todo(
        &server,
        &token,
        json!({ "title": "draft", "description": "keep", "category": "work" }),
    )
    .await;
    let path = format!("/api/todos/{}", todo["id"].as_str().unwrap());

    let response = server
        .put(&path)
        .authorization_bearer(&token)
        .json(&json!({ "status": "in_progress", "category": null }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let updated = response.json::<Value>();
    assert_eq!(updated["title"], "draft");
    assert_eq!(updated["description"], "keep");
    assert_eq!(updated["status"], "in_progress");
    assert!(updated["category"].is_null());
}

#[tokio::test]
async fn test_complete_and_delete() {
    let server = server();
    let token = access_token(&server, "max@example.com").await;
    let todo = create_todo(&server, &token, json!({ "title": "finish" })).await;
    let id = todo["id"].as_str().unwrap();

    for _ in 0..2 {
        let done = server
            .patch(&format!("/api/todos/{id}/complete"))
            .authorization_bearer(&token)
            .await;
        assert_eq!(done.status_code(), StatusCode::OK);
        assert_eq!(done.json::<Value>()["status"], "completed");
    }

    let deleted = server
        .delete(&format!("/api/todos/{id}"))
        .authorization_bearer(&token)
        .await;
    assert_eq!(deleted.status_code(), StatusCode::OK);
    let body = deleted.json::<Value>();
    assert_eq!(body["message"], "Todo deleted successfully");
    assert_eq!(body["id"], id);

    let gone = server
        .get(&format!("/api/todos/{id}"))
        .authorization_bearer(&token)
        .await;
    assert_error(&gone, StatusCode::NOT_FOUND, "NOT_FOUND");
}

#[tokio::test]
async fn test_list_filters_and_paginates() {
    let server = server();
    let token = access_token(&server, "ned@example.com").await;

    for i in 0..5 {
        create_todo(
            &server,
            &token,
            json!({
                "title": format!("task {i}"),
                "priority": if i % 2 == 0 { "high" } else { "low" },
                "category": if i < 2 { "home" } else { "work" }
            }),
        )
        .await;
    }
    create_todo(&server, &token, json!({ "title": "Groceries", "description": "Buy MILK" })).await;

    let page = server
        .get("/api/todos")
        .authorization_bearer(&token)
        .add_query_param("page_size", 4)
        .add_query_param("page", 2)
        .await
        .json::<Value>();
    assert_eq!(page["total"], 6);
    assert_eq!(page["page"], 2);
    assert_eq!(page["page_size"], 4);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let high = server
        .get("/api/todos")
        .authorization_bearer(&token)
        .add_query_param("priority", "high")
        .await
        .json::<Value>();
    assert_eq!(high["total"], 3);

    let home = server
        .get("/api/todos")
        .authorization_bearer(&token)
        .add_query_param("category", "home")
        .await
        .json::<Value>();
    assert_eq!(home["total"], 2);

    let search = server
        .get("/api/todos")
        .authorization_bearer(&token)
        .add_query_param("search", "milk")
        .await
        .json::<Value>();
    assert_eq!(search["total"], 1);
    assert_eq!(search["items"][0]["title"], "Groceries");
}

#[tokio::test]
async fn test_list_rejects_bad_paging() {
    let server = server();
    let token = access_token(&server, "oli@example.com").await;

    for (key, value) in [("page", "0"), ("page_size", "101"), ("page", "-1"), ("status", "nope")] {
        let response = server
            .get("/api/todos")
            .authorization_bearer(&token)
            .add_query_param(key, value)
            .await;
        assert_error(&response, StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR");
    }
}

// =============================================================================
// MIDDLEWARE AND BACKENDS
// =============================================================================

#[tokio::test]
async fn test_cors_allows_configured_origin_only() {
    let server = server();
    let origin = HeaderName::from_static("access-control-allow-origin");

    let allowed = server
        .get("/health")
        .add_header(header::ORIGIN, HeaderValue::from_static("http://localhost:3000"))
        .await;
    assert_eq!(
        allowed.headers().get(&origin),
        Some(&HeaderValue::from_static("http://localhost:3000"))
    );

    let denied = server
        .get("/health")
        .add_header(header::ORIGIN, HeaderValue::from_static("https://evil.example"))
        .await;
    assert!(denied.headers().get(&origin).is_none());
}

#[tokio::test]
async fn test_redb_backend_serves_requests() {
    let settings = Settings::for_tests(SECRET);
    let store = RedbStore::in_memory().unwrap();
    let nest = Nest::new(
        Box::new(store),
        TokenCodec::new(&settings.jwt_secret),
        settings.nest_config(),
    );
    let server = TestServer::new(api::router(AppState::new(nest, settings))).unwrap();

    let token = access_token(&server, "pat@example.com").await;
    create_todo(&server, &token, json!({ "title": "durable" })).await;
    let listed = server
        .get("/api/todos")
        .authorization_bearer(&token)
        .await
        .json::<Value>();
    assert_eq!(listed["items"][0]["title"], "durable");
}
