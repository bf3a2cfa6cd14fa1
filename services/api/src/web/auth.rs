//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout.

use crate::error::{ApiError, ApiResult};
use crate::web::session::{append_set_cookie, take_flash, CurrentSession};
use crate::web::state::AppState;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use contest_board_core::{AuthSession, FlashMessage, PortError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct SigninPage {
    #[schema(value_type = Vec<Object>)]
    pub flash: Vec<FlashMessage>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 422, description = "Missing fields or email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
    Json(req): Json<SignupRequest>,
) -> ApiResult<Response> {
    let email = req.email.trim();
    if email.is_empty() || req.password.is_empty() {
        return Err(PortError::Invalid("email and password are required".to_string()).into());
    }

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })?
        .to_string();

    // 2. Create user
    let user = state.users.create_user_with_email(email, &password_hash).await?;
    info!(user_id = %user.user_id, "User registered");

    // 3. Log the new user in
    let body = AuthResponse {
        user_id: user.user_id,
        email: user.email.unwrap_or_default(),
    };
    start_session(&state, &current, user.user_id, StatusCode::CREATED, body).await
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Response> {
    // 1. Get user by email
    let user_creds = match state.users.get_user_by_email(req.email.trim()).await {
        Ok(creds) => creds,
        Err(PortError::NotFound(_)) => return Err(PortError::Unauthorized.into()),
        Err(e) => return Err(e.into()),
    };

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;

    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();

    if !valid {
        return Err(PortError::Unauthorized.into());
    }

    let body = AuthResponse {
        user_id: user_creds.user_id,
        email: user_creds.email,
    };
    start_session(&state, &current, user_creds.user_id, StatusCode::OK, body).await
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
) -> ApiResult<Response> {
    if let Some(session_id) = current.session_id() {
        state.sessions.delete_session(session_id).await?;
        state.gateway.disconnect_session(session_id).await;
    }

    let mut response = StatusCode::OK.into_response();
    append_set_cookie(&mut response, &state.cookie.clear_cookie());
    Ok(response)
}

/// GET /signin - Sign-in form context
#[utoipa::path(
    get,
    path = "/signin",
    responses(
        (status = 200, description = "Pending flash messages", body = SigninPage)
    )
)]
pub async fn signin_page_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
) -> Json<SigninPage> {
    Json(SigninPage {
        flash: take_flash(&state, &current).await,
    })
}

/// Replaces whatever session the client had with a fresh logged-in one.
async fn start_session(
    state: &AppState,
    current: &CurrentSession,
    user_id: Uuid,
    status: StatusCode,
    body: AuthResponse,
) -> ApiResult<Response> {
    if let Some(old) = current.session_id() {
        if let Err(e) = state.sessions.delete_session(old).await {
            error!(error = %e, "Failed to drop previous session");
        }
    }

    let session = AuthSession {
        id: Uuid::new_v4().to_string(),
        user_id: Some(user_id),
        flash: Vec::new(),
        expires_at: Utc::now() + state.cookie.max_age(),
    };
    state.sessions.create_session(&session).await?;

    let mut response = (status, Json(body)).into_response();
    append_set_cookie(&mut response, &state.cookie.set_cookie(&session.id));
    Ok(response)
}
