//! services/api/src/web/middleware.rs
//!
//! The generic fallback: unmatched routes become a 404 body, and 5xx bodies
//! only carry the underlying error outside production.

use crate::web::session::ErrorDetail;
use crate::web::state::AppState;
use axum::{
    extract::{Request, State},
    http::{StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Adds the hidden `ErrorDetail` of a server error to its body when the
/// environment allows it.
pub async fn render_errors(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;

    let Some(ErrorDetail(detail)) = response.extensions_mut().remove::<ErrorDetail>() else {
        return response;
    };
    if !state.config.exposes_error_details() {
        return response;
    }

    let status = response.status();
    let body = json!({
        "error": "An internal error occurred",
        "code": "INTERNAL_ERROR",
        "detail": detail,
    });
    (status, Json(body)).into_response()
}

/// Router fallback for paths no route matched.
pub async fn not_found_fallback(uri: Uri) -> Response {
    let body = json!({
        "error": format!("No route for {}", uri.path()),
        "code": "NOT_FOUND",
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
