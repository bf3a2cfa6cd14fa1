//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of every store port. Backs
//! `STORAGE_BACKEND=memory` and the integration tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contest_board_core::domain::{
    Answer, AuthSession, FlashMessage, Page, Question, QuestionQuery, QuestionUpdate, User,
    UserCredentials,
};
use contest_board_core::ports::{
    ContentStore, PortError, PortResult, SessionReader, SessionStore, UserStore,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Data {
    users_by_email: HashMap<String, UserCredentials>,
    sessions: HashMap<String, AuthSession>,
    questions: HashMap<Uuid, Question>,
    answers: Vec<Answer>,
}

#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<Data>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn question_not_found(id: Uuid) -> PortError {
    PortError::NotFound(format!("Question {} not found", id))
}

fn session_not_found(id: &str) -> PortError {
    PortError::NotFound(format!("Session {} not found", id))
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let mut data = self.data.write().await;
        let key = email.to_lowercase();
        if data.users_by_email.contains_key(&key) {
            return Err(PortError::Invalid(format!("{} is already registered", email)));
        }
        let creds = UserCredentials {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
        };
        let user = User {
            user_id: creds.user_id,
            email: Some(creds.email.clone()),
        };
        data.users_by_email.insert(key, creds);
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.data
            .read()
            .await
            .users_by_email
            .get(&email.to_lowercase())
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }
}

#[async_trait]
impl SessionReader for MemoryStore {
    async fn get_session(&self, session_id: &str) -> PortResult<AuthSession> {
        self.data
            .read()
            .await
            .sessions
            .get(session_id)
            .filter(|s| !s.is_expired(Utc::now()))
            .cloned()
            .ok_or_else(|| session_not_found(session_id))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &AuthSession) -> PortResult<()> {
        self.data
            .write()
            .await
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> PortResult<()> {
        self.data.write().await.sessions.remove(session_id);
        Ok(())
    }

    async fn push_flash(&self, session_id: &str, flash: FlashMessage) -> PortResult<()> {
        let mut data = self.data.write().await;
        let session = data
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        session.flash.push(flash);
        Ok(())
    }

    async fn take_flash(&self, session_id: &str) -> PortResult<Vec<FlashMessage>> {
        let mut data = self.data.write().await;
        Ok(data
            .sessions
            .get_mut(session_id)
            .map(|s| std::mem::take(&mut s.flash))
            .unwrap_or_default())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let mut data = self.data.write().await;
        let before = data.sessions.len();
        data.sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - data.sessions.len()) as u64)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn create_question(&self, question: &Question) -> PortResult<()> {
        self.data
            .write()
            .await
            .questions
            .insert(question.id, question.clone());
        Ok(())
    }

    async fn get_question(&self, question_id: Uuid) -> PortResult<Question> {
        self.data
            .read()
            .await
            .questions
            .get(&question_id)
            .cloned()
            .ok_or_else(|| question_not_found(question_id))
    }

    async fn update_question(
        &self,
        question_id: Uuid,
        update: &QuestionUpdate,
    ) -> PortResult<Question> {
        let mut data = self.data.write().await;
        let question = data
            .questions
            .get_mut(&question_id)
            .ok_or_else(|| question_not_found(question_id))?;
        question.title = update.title.clone();
        question.content = update.content.clone();
        question.tags = update.tags.clone();
        Ok(question.clone())
    }

    async fn delete_question(&self, question_id: Uuid) -> PortResult<()> {
        let mut data = self.data.write().await;
        data.questions
            .remove(&question_id)
            .ok_or_else(|| question_not_found(question_id))?;
        data.answers.retain(|a| a.question != question_id);
        Ok(())
    }

    async fn list_questions(&self, query: &QuestionQuery) -> PortResult<Page<Question>> {
        let data = self.data.read().await;
        let mut matching: Vec<&Question> = data
            .questions
            .values()
            .filter(|q| query.term.as_deref().map_or(true, |t| q.matches_term(t)))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let docs = matching
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(Page::new(docs, total, query))
    }

    async fn increment_reads(&self, question_id: Uuid) -> PortResult<Question> {
        let mut data = self.data.write().await;
        let question = data
            .questions
            .get_mut(&question_id)
            .ok_or_else(|| question_not_found(question_id))?;
        question.num_reads += 1;
        Ok(question.clone())
    }

    async fn increment_answers(&self, question_id: Uuid) -> PortResult<Question> {
        let mut data = self.data.write().await;
        let question = data
            .questions
            .get_mut(&question_id)
            .ok_or_else(|| question_not_found(question_id))?;
        question.num_answers += 1;
        Ok(question.clone())
    }

    async fn create_answer(&self, answer: &Answer) -> PortResult<()> {
        let mut data = self.data.write().await;
        if !data.questions.contains_key(&answer.question) {
            return Err(question_not_found(answer.question));
        }
        data.answers.push(answer.clone());
        Ok(())
    }

    async fn get_answers_for_question(&self, question_id: Uuid) -> PortResult<Vec<Answer>> {
        let data = self.data.read().await;
        let mut answers: Vec<Answer> = data
            .answers
            .iter()
            .filter(|a| a.question == question_id)
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.created_at);
        Ok(answers)
    }
}
