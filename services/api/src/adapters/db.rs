//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the PostgreSQL implementation of
//! the store ports from the `core` crate. It handles all interactions with the
//! database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contest_board_core::domain::{
    Answer, AuthSession, FlashLevel, FlashMessage, Page, Question, QuestionQuery,
    QuestionUpdate, User, UserCredentials,
};
use contest_board_core::ports::{
    ContentStore, PortError, PortResult, SessionReader, SessionStore, UserStore,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every store port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

const QUESTION_COLUMNS: &str = "id, author, title, host, field, who, period, content, manager, \
     phone, etc, tags, num_likes, num_answers, num_reads, image, created_at";

/// The free-text columns searched by `list_questions`.
const SEARCH_FILTER: &str = "($1::text IS NULL OR title ILIKE $1 OR host ILIKE $1 \
     OR field ILIKE $1 OR who ILIKE $1 OR period ILIKE $1 OR content ILIKE $1 \
     OR manager ILIKE $1 OR phone ILIKE $1 OR etc ILIKE $1)";

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn missing_or_unexpected(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        other => PortError::Unexpected(other.to_string()),
    }
}

/// `%term%` with the LIKE wildcards in `term` taken literally.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl UserRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: String,
    user_id: Option<Uuid>,
    expires_at: DateTime<Utc>,
}
impl SessionRecord {
    // Flash messages are only ever read through `take_flash`.
    fn to_domain(self) -> AuthSession {
        AuthSession {
            id: self.id,
            user_id: self.user_id,
            flash: Vec::new(),
            expires_at: self.expires_at,
        }
    }
}

#[derive(FromRow)]
struct FlashRecord {
    level: String,
    message: String,
}
impl FlashRecord {
    fn to_domain(self) -> FlashMessage {
        FlashMessage {
            level: FlashLevel::parse(&self.level).unwrap_or(FlashLevel::Info),
            message: self.message,
        }
    }
}

#[derive(FromRow)]
struct QuestionRecord {
    id: Uuid,
    author: Uuid,
    title: String,
    host: String,
    field: String,
    who: String,
    period: String,
    content: String,
    manager: String,
    phone: String,
    etc: Option<String>,
    tags: Vec<String>,
    num_likes: i64,
    num_answers: i64,
    num_reads: i64,
    image: Option<String>,
    created_at: DateTime<Utc>,
}
impl QuestionRecord {
    fn to_domain(self) -> Question {
        Question {
            id: self.id,
            author: self.author,
            title: self.title,
            host: self.host,
            field: self.field,
            who: self.who,
            period: self.period,
            content: self.content,
            manager: self.manager,
            phone: self.phone,
            etc: self.etc,
            tags: self.tags,
            num_likes: self.num_likes,
            num_answers: self.num_answers,
            num_reads: self.num_reads,
            image: self.image,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct AnswerRecord {
    id: Uuid,
    author: Uuid,
    question: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}
impl AnswerRecord {
    fn to_domain(self) -> Answer {
        Answer {
            id: self.id,
            author: self.author,
            question: self.question,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `UserStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserStore for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) \
             RETURNING user_id, email, hashed_password",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            // PostgreSQL unique constraint violation: error code 23505
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                PortError::Invalid(format!("{} is already registered", email))
            }
            other => unexpected(other),
        })?;

        Ok(User {
            user_id: record.user_id,
            email: Some(record.email),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(missing_or_unexpected(format!("User {} not found", email)))?;
        Ok(record.to_domain())
    }
}

//=========================================================================================
// `SessionReader` / `SessionStore` Trait Implementations
//=========================================================================================

#[async_trait]
impl SessionReader for DbAdapter {
    async fn get_session(&self, session_id: &str) -> PortResult<AuthSession> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, user_id, expires_at FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(missing_or_unexpected(format!("Session {} not found", session_id)))?;
        Ok(record.to_domain())
    }
}

#[async_trait]
impl SessionStore for DbAdapter {
    async fn create_session(&self, session: &AuthSession) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&session.id)
            .bind(session.user_id)
            .bind(session.expires_at)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        for flash in &session.flash {
            sqlx::query("INSERT INTO session_flash (session_id, level, message) VALUES ($1, $2, $3)")
                .bind(&session.id)
                .bind(flash.level.as_str())
                .bind(&flash.message)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn push_flash(&self, session_id: &str, flash: FlashMessage) -> PortResult<()> {
        let result = sqlx::query(
            "INSERT INTO session_flash (session_id, level, message) \
             SELECT id, $2, $3 FROM auth_sessions WHERE id = $1",
        )
        .bind(session_id)
        .bind(flash.level.as_str())
        .bind(&flash.message)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Session {} not found", session_id)));
        }
        Ok(())
    }

    async fn take_flash(&self, session_id: &str) -> PortResult<Vec<FlashMessage>> {
        let records = sqlx::query_as::<_, FlashRecord>(
            "WITH taken AS (DELETE FROM session_flash WHERE session_id = $1 \
             RETURNING seq, level, message) \
             SELECT level, message FROM taken ORDER BY seq",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> PortResult<u64> {
        // Queued flash rows go with their session (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}

//=========================================================================================
// `ContentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContentStore for DbAdapter {
    async fn create_question(&self, q: &Question) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO questions (id, author, title, host, field, who, period, content, \
             manager, phone, etc, tags, num_likes, num_answers, num_reads, image, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(q.id)
        .bind(q.author)
        .bind(&q.title)
        .bind(&q.host)
        .bind(&q.field)
        .bind(&q.who)
        .bind(&q.period)
        .bind(&q.content)
        .bind(&q.manager)
        .bind(&q.phone)
        .bind(&q.etc)
        .bind(&q.tags)
        .bind(q.num_likes)
        .bind(q.num_answers)
        .bind(q.num_reads)
        .bind(&q.image)
        .bind(q.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_question(&self, question_id: Uuid) -> PortResult<Question> {
        let sql = format!("SELECT {} FROM questions WHERE id = $1", QUESTION_COLUMNS);
        let record = sqlx::query_as::<_, QuestionRecord>(&sql)
            .bind(question_id)
            .fetch_one(&self.pool)
            .await
            .map_err(missing_or_unexpected(format!("Question {} not found", question_id)))?;
        Ok(record.to_domain())
    }

    async fn update_question(
        &self,
        question_id: Uuid,
        update: &QuestionUpdate,
    ) -> PortResult<Question> {
        let sql = format!(
            "UPDATE questions SET title = $2, content = $3, tags = $4 WHERE id = $1 RETURNING {}",
            QUESTION_COLUMNS
        );
        let record = sqlx::query_as::<_, QuestionRecord>(&sql)
            .bind(question_id)
            .bind(&update.title)
            .bind(&update.content)
            .bind(&update.tags)
            .fetch_one(&self.pool)
            .await
            .map_err(missing_or_unexpected(format!("Question {} not found", question_id)))?;
        Ok(record.to_domain())
    }

    async fn delete_question(&self, question_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(question_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Question {} not found", question_id)));
        }
        Ok(())
    }

    async fn list_questions(&self, query: &QuestionQuery) -> PortResult<Page<Question>> {
        let pattern = query.term.as_deref().map(like_pattern);

        let count_sql = format!("SELECT COUNT(*) FROM questions WHERE {}", SEARCH_FILTER);
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        let list_sql = format!(
            "SELECT {} FROM questions WHERE {} ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            QUESTION_COLUMNS, SEARCH_FILTER
        );
        let records = sqlx::query_as::<_, QuestionRecord>(&list_sql)
            .bind(&pattern)
            .bind(i64::from(query.limit))
            .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        let docs = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(Page::new(docs, total.max(0) as u64, query))
    }

    async fn increment_reads(&self, question_id: Uuid) -> PortResult<Question> {
        let sql = format!(
            "UPDATE questions SET num_reads = num_reads + 1 WHERE id = $1 RETURNING {}",
            QUESTION_COLUMNS
        );
        let record = sqlx::query_as::<_, QuestionRecord>(&sql)
            .bind(question_id)
            .fetch_one(&self.pool)
            .await
            .map_err(missing_or_unexpected(format!("Question {} not found", question_id)))?;
        Ok(record.to_domain())
    }

    async fn increment_answers(&self, question_id: Uuid) -> PortResult<Question> {
        let sql = format!(
            "UPDATE questions SET num_answers = num_answers + 1 WHERE id = $1 RETURNING {}",
            QUESTION_COLUMNS
        );
        let record = sqlx::query_as::<_, QuestionRecord>(&sql)
            .bind(question_id)
            .fetch_one(&self.pool)
            .await
            .map_err(missing_or_unexpected(format!("Question {} not found", question_id)))?;
        Ok(record.to_domain())
    }

    async fn create_answer(&self, answer: &Answer) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO answers (id, author, question, content, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(answer.id)
        .bind(answer.author)
        .bind(answer.question)
        .bind(&answer.content)
        .bind(answer.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            // Foreign key violation: the question vanished in the meantime.
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23503") => {
                PortError::NotFound(format!("Question {} not found", answer.question))
            }
            other => unexpected(other),
        })?;
        Ok(())
    }

    async fn get_answers_for_question(&self, question_id: Uuid) -> PortResult<Vec<Answer>> {
        let records = sqlx::query_as::<_, AnswerRecord>(
            "SELECT id, author, question, content, created_at FROM answers \
             WHERE question = $1 ORDER BY created_at ASC",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}
