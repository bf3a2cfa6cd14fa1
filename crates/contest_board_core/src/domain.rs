//! crates/contest_board_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ports::{PortError, PortResult};

// Represents a user - used throughout app
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// Severity of a one-shot flash message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Danger,
}

impl FlashLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Info => "info",
            FlashLevel::Warning => "warning",
            FlashLevel::Danger => "danger",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(FlashLevel::Success),
            "info" => Some(FlashLevel::Info),
            "warning" => Some(FlashLevel::Warning),
            "danger" => Some(FlashLevel::Danger),
            _ => None,
        }
    }
}

/// A message queued for the next rendered response, then discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub message: String,
}

impl FlashMessage {
    pub fn new(level: FlashLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

// Represents a browser session (signed cookie). Anonymous sessions have no user.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Option<Uuid>,
    pub flash: Vec<FlashMessage>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A contest/event posting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    pub id: Uuid,
    pub author: Uuid,
    pub title: String,
    pub host: String,
    pub field: String,
    pub who: String,
    pub period: String,
    pub content: String,
    pub manager: String,
    pub phone: String,
    pub etc: Option<String>,
    pub tags: Vec<String>,
    pub num_likes: i64,
    pub num_answers: i64,
    pub num_reads: i64,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Case-insensitive substring match across every free-text field.
    pub fn matches_term(&self, term: &str) -> bool {
        let needle = term.to_lowercase();
        [
            Some(self.title.as_str()),
            Some(self.host.as_str()),
            Some(self.field.as_str()),
            Some(self.who.as_str()),
            Some(self.period.as_str()),
            Some(self.content.as_str()),
            Some(self.manager.as_str()),
            Some(self.phone.as_str()),
            self.etc.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|text| text.to_lowercase().contains(&needle))
    }
}

/// Raw, untrimmed fields of a new question as they arrive from a form.
#[derive(Debug, Clone, Default)]
pub struct QuestionDraft {
    pub title: String,
    pub host: String,
    pub field: String,
    pub who: String,
    pub period: String,
    pub content: String,
    pub manager: String,
    pub phone: String,
    pub etc: Option<String>,
    pub tags: String,
}

impl QuestionDraft {
    /// Trims every field and builds a fresh `Question` owned by `author`.
    ///
    /// Fails with `PortError::Invalid` naming the first empty required field.
    pub fn validate(&self, author: Uuid) -> PortResult<Question> {
        Ok(Question {
            id: Uuid::new_v4(),
            author,
            title: required("title", &self.title)?,
            host: required("host", &self.host)?,
            field: required("field", &self.field)?,
            who: required("who", &self.who)?,
            period: required("period", &self.period)?,
            content: required("content", &self.content)?,
            manager: required("manager", &self.manager)?,
            phone: required("phone", &self.phone)?,
            etc: optional(self.etc.as_deref()),
            tags: parse_tags(&self.tags),
            num_likes: 0,
            num_answers: 0,
            num_reads: 0,
            image: None,
            created_at: Utc::now(),
        })
    }
}

/// The only fields an edit may touch.
#[derive(Debug, Clone, Default)]
pub struct QuestionPatch {
    pub title: String,
    pub content: String,
    pub tags: String,
}

/// A validated `QuestionPatch`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionUpdate {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

impl QuestionPatch {
    pub fn validate(&self) -> PortResult<QuestionUpdate> {
        Ok(QuestionUpdate {
            title: required("title", &self.title)?,
            content: required("content", &self.content)?,
            tags: parse_tags(&self.tags),
        })
    }
}

/// A comment on a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub id: Uuid,
    pub author: Uuid,
    pub question: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Answer {
    pub fn new(author: Uuid, question: Uuid, content: &str) -> PortResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            author,
            question,
            content: required("content", content)?,
            created_at: Utc::now(),
        })
    }
}

/// Filter and window for the question listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionQuery {
    pub page: u32,
    pub limit: u32,
    pub term: Option<String>,
}

impl QuestionQuery {
    pub const DEFAULT_PAGE: u32 = 1;
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    /// Builds a query from loosely typed inputs; bad or non-positive numbers
    /// fall back to the defaults, `limit` is capped at `MAX_LIMIT` and a blank
    /// term means "no filter".
    pub fn from_params(page: Option<&str>, limit: Option<&str>, term: Option<&str>) -> Self {
        let positive = |v: Option<&str>, default: u32| {
            v.and_then(|s| s.trim().parse::<u32>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default)
        };
        Self {
            page: positive(page, Self::DEFAULT_PAGE),
            limit: positive(limit, Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT),
            term: term
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for QuestionQuery {
    fn default() -> Self {
        Self {
            page: Self::DEFAULT_PAGE,
            limit: Self::DEFAULT_LIMIT,
            term: None,
        }
    }
}

/// One page of a paginated read.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub docs: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(docs: Vec<T>, total: u64, query: &QuestionQuery) -> Self {
        let limit = u64::from(query.limit.max(1));
        Self {
            docs,
            total,
            page: query.page,
            limit: query.limit,
            pages: total.div_ceil(limit).max(1),
        }
    }
}

/// Built by the router after an answer is stored, handed straight to the broadcaster.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    #[serde(skip)]
    pub target_user_id: Uuid,
    pub url: String,
    pub question: Question,
}

impl NotificationEvent {
    pub fn answer_posted(question: Question, answer: &Answer) -> Self {
        Self {
            target_user_id: question.author,
            url: answer_url(question.id, answer.id),
            question,
        }
    }

    /// The room the event is addressed to.
    pub fn room(&self) -> String {
        self.target_user_id.to_string()
    }
}

pub fn answer_url(question_id: Uuid, answer_id: Uuid) -> String {
    format!("/questions/{}#{}", question_id, answer_id)
}

/// Splits a whitespace-separated tag list into trimmed, non-empty tags.
pub fn parse_tags(input: &str) -> Vec<String> {
    input.split_whitespace().map(|t| t.trim().to_string()).collect()
}

fn required(name: &str, value: &str) -> PortResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PortError::Invalid(format!("`{}` is required", name)));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
