//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and the single
//! place where handler failures become HTTP responses.

use crate::config::ConfigError;
use crate::web::session::{flash_redirect, ErrorDetail};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use contest_board_core::{FlashLevel, PortError};
use serde_json::json;

pub const SIGNIN_PATH: &str = "/signin";
pub const SIGNIN_REQUIRED_MESSAGE: &str = "Please signin first.";

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The route needs a logged-in session and the request has none.
    #[error("Authentication required")]
    AuthRequired,

    /// A referenced entity is missing; the client is sent back where it came from.
    #[error("{message}")]
    NotFound { message: String, back: String },

    /// The request itself is malformed (e.g. an unreadable multipart body).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migrations failed at startup.
    #[error("Migration Error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn not_found(message: impl Into<String>, back: impl Into<String>) -> Self {
        ApiError::NotFound {
            message: message.into(),
            back: back.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::AuthRequired => {
                return flash_redirect(FlashLevel::Danger, SIGNIN_REQUIRED_MESSAGE, SIGNIN_PATH);
            }
            ApiError::NotFound { message, back } => {
                return flash_redirect(FlashLevel::Danger, message.clone(), back);
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Port(PortError::Invalid(msg)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                msg.clone(),
            ),
            ApiError::Port(PortError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone())
            }
            ApiError::Port(PortError::Unauthorized) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Unauthorized".to_string(),
            ),
            _ => {
                tracing::error!(error = %self, "Unhandled request error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        let mut response = (status, Json(body)).into_response();
        if status.is_server_error() {
            response
                .extensions_mut()
                .insert(ErrorDetail(self.to_string()));
        }
        response
    }
}
