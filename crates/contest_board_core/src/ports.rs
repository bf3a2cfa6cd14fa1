//! crates/contest_board_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or sockets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Answer, AuthSession, FlashMessage, Page, Question, QuestionQuery, QuestionUpdate, User,
    UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, disk).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Invalid(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `PortError::Invalid` if the email is already registered.
    async fn create_user_with_email(&self, email: &str, hashed_password: &str)
        -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;
}

/// Read-only view of the session store. The push gateway only ever gets this.
#[async_trait]
pub trait SessionReader: Send + Sync {
    /// Returns `NotFound` for unknown and expired sessions alike.
    async fn get_session(&self, session_id: &str) -> PortResult<AuthSession>;
}

#[async_trait]
pub trait SessionStore: SessionReader {
    async fn create_session(&self, session: &AuthSession) -> PortResult<()>;

    async fn delete_session(&self, session_id: &str) -> PortResult<()>;

    async fn push_flash(&self, session_id: &str, flash: FlashMessage) -> PortResult<()>;

    /// Returns the queued flash messages and clears them.
    async fn take_flash(&self, session_id: &str) -> PortResult<Vec<FlashMessage>>;

    /// Deletes every session that expired at or before `now`. Returns the count removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> PortResult<u64>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn create_question(&self, question: &Question) -> PortResult<()>;

    async fn get_question(&self, question_id: Uuid) -> PortResult<Question>;

    async fn update_question(
        &self,
        question_id: Uuid,
        update: &QuestionUpdate,
    ) -> PortResult<Question>;

    async fn delete_question(&self, question_id: Uuid) -> PortResult<()>;

    /// Newest first, optionally filtered by `query.term`.
    async fn list_questions(&self, query: &QuestionQuery) -> PortResult<Page<Question>>;

    async fn increment_reads(&self, question_id: Uuid) -> PortResult<Question>;

    async fn increment_answers(&self, question_id: Uuid) -> PortResult<Question>;

    async fn create_answer(&self, answer: &Answer) -> PortResult<()>;

    /// Oldest first.
    async fn get_answers_for_question(&self, question_id: Uuid) -> PortResult<Vec<Answer>>;
}

#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Stores an uploaded image for `question_id` and returns its public path.
    /// Anything that is not a JPEG, GIF or PNG fails with `PortError::Invalid`.
    async fn store(
        &self,
        question_id: Uuid,
        original_name: &str,
        data: &[u8],
    ) -> PortResult<String>;
}

/// Fire-and-forget fan-out to a named room of live push connections.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Returns how many connections the event was handed to. Zero is not an error.
    async fn notify(&self, room: &str, event: &str, payload: serde_json::Value) -> usize;
}
