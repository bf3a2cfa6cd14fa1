//! Integration tests for the session-bound push gateway.
//!
//! Connections are attached through `PushGateway` directly, with the same
//! `Cookie` header a browser would send on the upgrade request, so delivery
//! can be asserted without a real socket.

mod common;

use std::sync::Arc;

use api_lib::web::cookie::SessionCookie;
use api_lib::web::gateway::{ConnectionState, HandshakeRejection, JoinError, PushFrame};
use api_lib::web::protocol::{ANSWER_POSTED_EVENT, WELCOME_EVENT};
use api_lib::web::PushGateway;
use axum::http::{Method, StatusCode};
use chrono::Duration;
use common::{body_json, build_test_app, TestApp, TEST_SECRET};
use contest_board_core::Broadcaster;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

async fn attach(app: &TestApp, cookie: &str) -> (uuid::Uuid, UnboundedReceiver<PushFrame>) {
    let identity = app.state.gateway.authorize(Some(cookie)).await.unwrap();
    let attachment = app.state.gateway.connect(&identity).await;
    (attachment.conn_id, attachment.receiver)
}

fn drain(rx: &mut UnboundedReceiver<PushFrame>) -> Vec<PushFrame> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

fn event_names(frames: &[PushFrame]) -> Vec<String> {
    frames
        .iter()
        .filter_map(|f| match f {
            PushFrame::Event(e) => Some(e.event.clone()),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn answer_notifies_only_the_question_author() {
    let app = build_test_app();
    let (author_id, author_cookie) = app.signup("author@example.com").await;
    let (_, answerer_cookie) = app.signup("answerer@example.com").await;
    let (_, bystander_cookie) = app.signup("bystander@example.com").await;
    let qid = app.create_question(&author_cookie, "Help", "Question body").await;

    let (_, mut author_rx) = attach(&app, &author_cookie).await;
    let (_, mut bystander_rx) = attach(&app, &bystander_cookie).await;
    let welcome = drain(&mut author_rx);
    assert_eq!(event_names(&welcome), vec![WELCOME_EVENT.to_string()]);
    drain(&mut bystander_rx);

    let response = app
        .form(
            Method::POST,
            &format!("/questions/{}/answers", qid),
            Some(&answerer_cookie),
            "content=Try+this",
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let detail = body_json(app.get(&format!("/questions/{}", qid), None).await).await;
    let aid = detail["answers"][0]["id"].as_str().unwrap().to_string();

    let frames = drain(&mut author_rx);
    assert_eq!(frames.len(), 1);
    let PushFrame::Event(event) = &frames[0] else {
        panic!("expected an event frame, got {:?}", frames[0]);
    };
    assert_eq!(event.event, ANSWER_POSTED_EVENT);
    assert_eq!(event.data["url"], format!("/questions/{}#{}", qid, aid));
    assert_eq!(event.data["question"]["id"], qid.as_str());
    assert_eq!(event.data["question"]["author"], author_id.as_str());
    assert_eq!(event.data["question"]["num_answers"], 1);

    assert!(drain(&mut bystander_rx).is_empty());
}

#[tokio::test]
async fn answer_without_live_connections_still_succeeds() {
    let app = build_test_app();
    let (_, author_cookie) = app.signup("author@example.com").await;
    let (_, answerer_cookie) = app.signup("answerer@example.com").await;
    let qid = app.create_question(&author_cookie, "Quiet", "Nobody listening").await;

    let response = app
        .form(
            Method::POST,
            &format!("/questions/{}/answers", qid),
            Some(&answerer_cookie),
            "content=Hello",
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.state.gateway.connection_count().await, 0);

    let delivered = app
        .state
        .broadcaster
        .notify("nobody", ANSWER_POSTED_EVENT, json!({}))
        .await;
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn every_connection_of_a_user_receives_the_event() {
    let app = build_test_app();
    let (author_id, cookie) = app.signup("author@example.com").await;

    let (_, mut tab_one) = attach(&app, &cookie).await;
    let (_, mut tab_two) = attach(&app, &cookie).await;
    assert_eq!(app.state.gateway.room_size(&author_id).await, 2);
    drain(&mut tab_one);
    drain(&mut tab_two);

    let delivered = app
        .state
        .broadcaster
        .notify(&author_id, ANSWER_POSTED_EVENT, json!({ "url": "/x" }))
        .await;
    assert_eq!(delivered, 2);
    assert_eq!(drain(&mut tab_one).len(), 1);
    assert_eq!(drain(&mut tab_two).len(), 1);
}

#[tokio::test]
async fn disconnected_connections_leave_their_rooms() {
    let app = build_test_app();
    let (author_id, cookie) = app.signup("author@example.com").await;

    let (conn_id, _rx) = attach(&app, &cookie).await;
    assert_eq!(
        app.state.gateway.connection_state(conn_id).await,
        ConnectionState::Joined
    );

    app.state.gateway.disconnect(conn_id).await;
    assert_eq!(app.state.gateway.room_size(&author_id).await, 0);
    assert_eq!(
        app.state.gateway.connection_state(conn_id).await,
        ConnectionState::Disconnected
    );
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tampered_cookie_is_rejected() {
    let app = build_test_app();
    let (_, cookie) = app.signup("author@example.com").await;

    let mut tampered = cookie.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == '0' { '1' } else { '0' });

    let err = app.state.gateway.authorize(Some(&tampered)).await.unwrap_err();
    assert_eq!(err, HandshakeRejection::BadSignature);
}

#[tokio::test]
async fn cookie_under_another_name_is_not_seen() {
    let app = build_test_app();
    let (_, cookie) = app.signup("author@example.com").await;
    let value = cookie.split_once('=').unwrap().1;

    let renamed = format!("connect.sid={}", value);
    let err = app.state.gateway.authorize(Some(&renamed)).await.unwrap_err();
    assert_eq!(err, HandshakeRejection::MissingCookie);
}

#[tokio::test]
async fn gateway_with_a_different_secret_rejects_valid_cookies() {
    let app = build_test_app();
    let (_, cookie) = app.signup("author@example.com").await;

    let drifted = PushGateway::new(
        app.store.clone(),
        Arc::new(SessionCookie::new(
            app.state.config.session_cookie_name.clone(),
            format!("{}-rotated", TEST_SECRET),
            Duration::days(1),
        )),
    );
    let err = drifted.authorize(Some(&cookie)).await.unwrap_err();
    assert_eq!(err, HandshakeRejection::BadSignature);
}

#[tokio::test]
async fn logged_out_session_is_unknown() {
    let app = build_test_app();
    let (_, cookie) = app.signup("author@example.com").await;

    let response = app.form(Method::POST, "/auth/logout", Some(&cookie), "").await;
    assert_eq!(response.status(), StatusCode::OK);

    let err = app.state.gateway.authorize(Some(&cookie)).await.unwrap_err();
    assert_eq!(err, HandshakeRejection::UnknownSession);
}

#[tokio::test]
async fn logout_closes_that_sessions_push_connections() {
    let app = build_test_app();
    let (author_id, cookie) = app.signup("author@example.com").await;
    let (conn_id, mut rx) = attach(&app, &cookie).await;
    drain(&mut rx);

    let response = app.form(Method::POST, "/auth/logout", Some(&cookie), "").await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(drain(&mut rx), vec![PushFrame::Close]);
    assert_eq!(app.state.gateway.room_size(&author_id).await, 0);
    assert_eq!(
        app.state.gateway.connection_state(conn_id).await,
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn push_route_without_cookie_is_unauthorized() {
    let app = build_test_app();

    let response = app.get("/push", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn anonymous_session_connects_but_joins_nothing() {
    let app = build_test_app();

    // An anonymous session is opened to carry the sign-in flash.
    let response = app.get("/questions/new", None).await;
    let cookie = common::cookie_from(&response).unwrap();

    let identity = app.state.gateway.authorize(Some(&cookie)).await.unwrap();
    assert!(!identity.logged_in);
    let mut attachment = app.state.gateway.connect(&identity).await;
    assert!(drain(&mut attachment.receiver).is_empty());
    assert_eq!(
        app.state.gateway.connection_state(attachment.conn_id).await,
        ConnectionState::Authorized
    );
    assert_eq!(
        app.state.gateway.join(attachment.conn_id, "lobby").await,
        Err(JoinError::NotLoggedIn)
    );
}

#[tokio::test]
async fn users_cannot_join_each_others_rooms() {
    let app = build_test_app();
    let (author_id, _) = app.signup("author@example.com").await;
    let (_, intruder_cookie) = app.signup("intruder@example.com").await;

    let (conn_id, _rx) = attach(&app, &intruder_cookie).await;
    assert_eq!(
        app.state.gateway.join(conn_id, &author_id).await,
        Err(JoinError::ForeignUserRoom)
    );
    assert_eq!(app.state.gateway.room_size(&author_id).await, 0);

    assert_eq!(app.state.gateway.join(conn_id, "announcements").await, Ok(()));
    assert_eq!(app.state.gateway.room_size("announcements").await, 1);
}

#[tokio::test]
async fn shutdown_closes_every_connection() {
    let app = build_test_app();
    let (_, cookie) = app.signup("author@example.com").await;
    let (_, mut rx) = attach(&app, &cookie).await;
    drain(&mut rx);

    app.state.gateway.shutdown_all().await;

    assert_eq!(drain(&mut rx), vec![PushFrame::Close]);
    assert_eq!(app.state.gateway.connection_count().await, 0);
}
