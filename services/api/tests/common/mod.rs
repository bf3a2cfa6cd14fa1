#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use api_lib::adapters::{LocalUploadStore, MemoryStore};
use api_lib::config::Config;
use api_lib::web::build_router;
use api_lib::web::state::{AppState, Stores};
use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const BOUNDARY: &str = "contest-board-test-boundary";
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

/// A fully wired application over the in-memory store.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    // Keeps the upload directories alive for the duration of the test.
    pub root: TempDir,
}

/// Build a test `Config` from a fixed set of variables.
pub fn test_config(root: &TempDir) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("STORAGE_BACKEND", "memory".to_string()),
        ("SESSION_SECRET", TEST_SECRET.to_string()),
        (
            "UPLOAD_DIR",
            root.path().join("uploads").display().to_string(),
        ),
        ("UPLOAD_TMP_DIR", root.path().join("tmp").display().to_string()),
    ]);
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn build_test_app() -> TestApp {
    let root = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(&root));
    let store = Arc::new(MemoryStore::new());

    let stores = Stores {
        users: store.clone(),
        sessions: store.clone(),
        session_reader: store.clone(),
        content: store.clone(),
        uploads: Arc::new(LocalUploadStore::new(
            config.upload_dir.clone(),
            config.upload_tmp_dir.clone(),
        )),
    };
    let state = Arc::new(AppState::new(config, stores));
    let router = build_router(state.clone()).unwrap();

    TestApp {
        router,
        state,
        store,
        root,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Signs up a fresh user and returns its id plus the `Cookie` header value.
    pub async fn signup(&self, email: &str) -> (String, String) {
        let body = serde_json::json!({ "email": email, "password": "hunter22" });
        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/signup")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.send(request).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let cookie = cookie_from(&response).expect("signup sets a session cookie");
        let json = body_json(response).await;
        (json["user_id"].as_str().unwrap().to_string(), cookie)
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn form(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: &str,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn post_question(
        &self,
        cookie: Option<&str>,
        fields: &[(&str, &str)],
        image: Option<(&str, &[u8])>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/questions")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = multipart_body(fields, image);
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// Posts a complete question as the given user and returns its id.
    pub async fn create_question(&self, cookie: &str, title: &str, content: &str) -> String {
        let fields = question_fields(title, content);
        let response = self.post_question(Some(cookie), &fields, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let list = body_json(self.get("/questions?limit=50", Some(cookie)).await).await;
        list["questions"]["docs"]
            .as_array()
            .unwrap()
            .iter()
            .find(|q| q["title"] == title)
            .map(|q| q["id"].as_str().unwrap().to_string())
            .expect("created question is listed")
    }
}

pub fn question_fields<'a>(title: &'a str, content: &'a str) -> Vec<(&'a str, &'a str)> {
    vec![
        ("title", title),
        ("host", "Seoul Design Foundation"),
        ("field", "poster"),
        ("who", "students"),
        ("period", "2026-11-01 ~ 2026-11-30"),
        ("content", content),
        ("manager", "Kim"),
        ("phone", "010-0000-0000"),
        ("tags", "poster  art"),
    ]
}

pub fn multipart_body(fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, data)) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"img\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// The `name=value` part of the first `Set-Cookie` header, ready to send back.
pub fn cookie_from(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
