//! services/api/src/web/session.rs
//!
//! Resolves the signed session cookie on every request and persists flash
//! messages that handlers (or `ApiError`) attach to their responses.

use crate::error::ApiError;
use crate::web::state::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use contest_board_core::{AuthSession, FlashLevel, FlashMessage, PortError, SessionStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifetime of a session opened only to carry flash messages.
pub const ANONYMOUS_SESSION_HOURS: i64 = 24;

fn anonymous_ttl(max_age: chrono::Duration) -> chrono::Duration {
    max_age.min(chrono::Duration::hours(ANONYMOUS_SESSION_HOURS))
}

/// The session (if any) attached to the current request.
#[derive(Debug, Clone, Default)]
pub struct CurrentSession(pub Option<AuthSession>);

impl CurrentSession {
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.as_ref().and_then(|s| s.user_id)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.0.as_ref().map(|s| s.id.as_str())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .unwrap_or_default())
    }
}

/// The logged-in user of the current request; rejects with `AuthRequired`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        CurrentSession::from_request_parts(parts, state)
            .await?
            .user_id()
            .map(AuthUser)
            .ok_or(ApiError::AuthRequired)
    }
}

/// A flash message waiting to be written to the session by `session_layer`.
#[derive(Debug, Clone)]
pub struct PendingFlash(pub FlashMessage);

/// Error text kept out of the response body unless the environment allows it.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

/// A `303 See Other` that also queues a flash message for the next render.
pub fn flash_redirect(level: FlashLevel, message: impl Into<String>, to: &str) -> Response {
    let mut response = Redirect::to(to).into_response();
    response
        .extensions_mut()
        .insert(PendingFlash(FlashMessage::new(level, message)));
    response
}

/// Where "redirect back" goes: the `Referer`, or the site root.
pub fn back_location(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("/")
        .to_string()
}

/// Returns and clears the flash messages queued on the current session.
pub async fn take_flash(state: &AppState, current: &CurrentSession) -> Vec<FlashMessage> {
    let Some(session_id) = current.session_id() else {
        return Vec::new();
    };
    match state.sessions.take_flash(session_id).await {
        Ok(flash) => flash,
        Err(e) => {
            warn!(error = %e, "Failed to read flash messages");
            Vec::new()
        }
    }
}

/// Looks up the session cookie before the handler runs, and stores any
/// `PendingFlash` once it has finished.
pub async fn session_layer(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let cookie_header = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok());

    let session = match state.cookie.session_id_from_header(cookie_header) {
        Ok(session_id) => match state.sessions.get_session(&session_id).await {
            Ok(session) => Some(session),
            Err(PortError::NotFound(_)) => None,
            Err(e) => {
                error!(error = %e, "Failed to load session");
                None
            }
        },
        Err(e) => {
            if cookie_header.is_some() {
                debug!(reason = %e, "Ignoring session cookie");
            }
            None
        }
    };

    let session_id = session.as_ref().map(|s| s.id.clone());
    req.extensions_mut().insert(CurrentSession(session));

    let mut response = next.run(req).await;

    if let Some(PendingFlash(flash)) = response.extensions_mut().remove::<PendingFlash>() {
        match session_id {
            Some(id) => {
                if let Err(e) = state.sessions.push_flash(&id, flash).await {
                    error!(error = %e, "Failed to queue flash message");
                }
            }
            None => {
                // The client has no session yet; open an anonymous one to carry the message.
                let session = AuthSession {
                    id: Uuid::new_v4().to_string(),
                    user_id: None,
                    flash: vec![flash],
                    expires_at: Utc::now() + anonymous_ttl(state.cookie.max_age()),
                };
                match state.sessions.create_session(&session).await {
                    Ok(()) => append_set_cookie(&mut response, &state.cookie.set_cookie(&session.id)),
                    Err(e) => error!(error = %e, "Failed to open anonymous session"),
                }
            }
        }
    }

    response
}

/// Guard for routes that need a logged-in user.
pub async fn require_auth(req: Request, next: Next) -> Response {
    let logged_in = req
        .extensions()
        .get::<CurrentSession>()
        .and_then(CurrentSession::user_id)
        .is_some();
    if !logged_in {
        return ApiError::AuthRequired.into_response();
    }
    next.run(req).await
}

/// Spawns a background task that deletes expired sessions on an interval
/// until `cancel` fires.
pub fn start_session_sweeper(
    sessions: Arc<dyn SessionStore>,
    interval: std::time::Duration,
    cancel: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => match sessions.purge_expired(Utc::now()).await {
                    Ok(0) => {}
                    Ok(purged) => info!(purged, "Purged expired sessions"),
                    Err(e) => error!(error = %e, "Failed to purge expired sessions"),
                },
            }
        }
    })
}

pub fn append_set_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => error!(error = %e, "Refusing to send malformed Set-Cookie"),
    }
}
