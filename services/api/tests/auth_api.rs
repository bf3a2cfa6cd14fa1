//! HTTP-level integration tests for signup, login, logout and flash delivery.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{body_json, build_test_app, cookie_from, location, TestApp};

async fn post_json(app: &TestApp, uri: &str, body: serde_json::Value) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.send(request).await
}

#[tokio::test]
async fn signup_sets_a_signed_http_only_cookie() {
    let app = build_test_app();

    let response = post_json(
        &app,
        "/auth/signup",
        serde_json::json!({ "email": "new@example.com", "password": "pw" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("qa.sid="));
    assert!(set_cookie.contains("HttpOnly"));

    let body = body_json(response).await;
    assert_eq!(body["email"], "new@example.com");
}

#[tokio::test]
async fn duplicate_signup_is_a_validation_error() {
    let app = build_test_app();
    app.signup("dup@example.com").await;

    let response = post_json(
        &app,
        "/auth/signup",
        serde_json::json!({ "email": "DUP@example.com", "password": "pw" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn login_checks_the_password() {
    let app = build_test_app();
    app.signup("user@example.com").await;

    let wrong = post_json(
        &app,
        "/auth/login",
        serde_json::json!({ "email": "user@example.com", "password": "nope" }),
    )
    .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let unknown = post_json(
        &app,
        "/auth/login",
        serde_json::json!({ "email": "ghost@example.com", "password": "hunter22" }),
    )
    .await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);

    let ok = post_json(
        &app,
        "/auth/login",
        serde_json::json!({ "email": "user@example.com", "password": "hunter22" }),
    )
    .await;
    assert_eq!(ok.status(), StatusCode::OK);
    let cookie = cookie_from(&ok).unwrap();

    // The new session is logged in: protected pages render.
    let page = app.get("/questions/new", Some(&cookie)).await;
    assert_eq!(page.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_replaces_the_previous_session() {
    let app = build_test_app();
    let (_, first) = app.signup("user@example.com").await;

    let response = post_json(
        &app,
        "/auth/login",
        serde_json::json!({ "email": "user@example.com", "password": "hunter22" }),
    )
    .await;
    let second = cookie_from(&response).unwrap();
    assert_ne!(first, second);

    let stale = app.get("/questions/new", Some(&first)).await;
    assert_eq!(location(&stale), "/signin");
}

#[tokio::test]
async fn logout_clears_the_cookie_and_the_session() {
    let app = build_test_app();
    let (_, cookie) = app.signup("user@example.com").await;

    let response = app.form(Method::POST, "/auth/logout", Some(&cookie), "").await;
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let after = app.get("/questions/new", Some(&cookie)).await;
    assert_eq!(location(&after), "/signin");
}

#[tokio::test]
async fn flash_is_shown_once() {
    let app = build_test_app();

    let response = app.get("/questions/new", None).await;
    let cookie = cookie_from(&response).unwrap();

    let first = body_json(app.get("/signin", Some(&cookie)).await).await;
    assert_eq!(first["flash"].as_array().unwrap().len(), 1);
    let second = body_json(app.get("/signin", Some(&cookie)).await).await;
    assert!(second["flash"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn forged_cookie_is_treated_as_no_session() {
    let app = build_test_app();

    let response = app
        .get("/questions/new", Some("qa.sid=made-up-session.deadbeef"))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/signin");
}
