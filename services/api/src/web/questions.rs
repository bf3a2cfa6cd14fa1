//! services/api/src/web/questions.rs
//!
//! Handlers for questions and their answers. State-changing routes persist
//! first and only then publish to the push gateway.

use crate::error::{ApiError, ApiResult};
use crate::web::protocol::ANSWER_POSTED_EVENT;
use crate::web::session::{back_location, flash_redirect, take_flash, AuthUser, CurrentSession};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::HeaderMap,
    response::{Json, Response},
    Form,
};
use bytes::Bytes;
use contest_board_core::{
    Answer, FlashLevel, FlashMessage, NotificationEvent, Page, PortError, Question,
    QuestionDraft, QuestionPatch, QuestionQuery,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub const QUESTION_MISSING_MESSAGE: &str = "Question does not exist";

/// Name of the multipart field carrying the optional image.
pub const IMAGE_FIELD: &str = "img";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, IntoParams)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub term: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct QuestionListPage {
    #[schema(value_type = Object)]
    pub questions: Page<Question>,
    pub term: Option<String>,
    /// The logged-in viewer, `null` when anonymous.
    #[schema(value_type = Option<String>)]
    pub current_user: Option<Uuid>,
    #[schema(value_type = Vec<Object>)]
    pub flash: Vec<FlashMessage>,
}

#[derive(Serialize, ToSchema)]
pub struct QuestionDetailPage {
    #[schema(value_type = Object)]
    pub question: Question,
    #[schema(value_type = Vec<Object>)]
    pub answers: Vec<Answer>,
    /// The logged-in viewer, `null` when anonymous.
    #[schema(value_type = Option<String>)]
    pub current_user: Option<Uuid>,
    #[schema(value_type = Vec<Object>)]
    pub flash: Vec<FlashMessage>,
}

#[derive(Serialize, ToSchema)]
pub struct QuestionFormPage {
    /// `null` for the "new" form.
    #[schema(value_type = Option<Object>)]
    pub question: Option<Question>,
    /// The logged-in viewer, `null` when anonymous.
    #[schema(value_type = Option<String>)]
    pub current_user: Option<Uuid>,
    #[schema(value_type = Vec<Object>)]
    pub flash: Vec<FlashMessage>,
}

#[derive(Deserialize, ToSchema)]
pub struct AnswerForm {
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize, ToSchema)]
pub struct QuestionPatchForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: String,
}

impl From<QuestionPatchForm> for QuestionPatch {
    fn from(form: QuestionPatchForm) -> Self {
        QuestionPatch {
            title: form.title,
            content: form.content,
            tags: form.tags,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /questions - Paginated list, newest first
#[utoipa::path(
    get,
    path = "/questions",
    params(ListParams),
    responses((status = 200, description = "One page of questions", body = QuestionListPage))
)]
pub async fn list_questions_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<QuestionListPage>> {
    let query = QuestionQuery::from_params(
        params.page.as_deref(),
        params.limit.as_deref(),
        params.term.as_deref(),
    );
    let questions = state.content.list_questions(&query).await?;

    Ok(Json(QuestionListPage {
        questions,
        term: query.term,
        current_user: current.user_id(),
        flash: take_flash(&state, &current).await,
    }))
}

/// GET /questions/new - Empty form context
#[utoipa::path(
    get,
    path = "/questions/new",
    responses(
        (status = 200, description = "Empty question form", body = QuestionFormPage),
        (status = 303, description = "Not logged in; redirected to /signin")
    )
)]
pub async fn new_question_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
) -> Json<QuestionFormPage> {
    Json(QuestionFormPage {
        question: None,
        current_user: current.user_id(),
        flash: take_flash(&state, &current).await,
    })
}

/// POST /questions - Create a question, with an optional `img` upload
#[utoipa::path(
    post,
    path = "/questions",
    request_body(content_type = "multipart/form-data", description = "Question fields and an optional `img` file."),
    responses(
        (status = 303, description = "Created; redirected to /questions"),
        (status = 422, description = "Missing required field or disallowed image type")
    )
)]
pub async fn create_question_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    multipart: Multipart,
) -> ApiResult<Response> {
    let (draft, image) = read_question_form(multipart).await?;
    let mut question = draft.validate(user_id)?;

    if let Some((file_name, data)) = image {
        let path = state.uploads.store(question.id, &file_name, &data).await?;
        question.image = Some(path);
    }

    state.content.create_question(&question).await?;
    info!(question_id = %question.id, author = %user_id, "Question posted");

    Ok(flash_redirect(FlashLevel::Success, "Successfully posted", "/questions"))
}

/// GET /questions/{id} - Detail; every call counts as one read
#[utoipa::path(
    get,
    path = "/questions/{id}",
    params(("id" = String, Path, description = "Question id")),
    responses(
        (status = 200, description = "Question with its answers", body = QuestionDetailPage),
        (status = 303, description = "Question missing; redirected back")
    )
)]
pub async fn show_question_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<QuestionDetailPage>> {
    let question_id = parse_question_id(&id, &headers)?;
    let question = missing_as_redirect(state.content.increment_reads(question_id).await, &headers)?;
    let answers = state.content.get_answers_for_question(question_id).await?;

    Ok(Json(QuestionDetailPage {
        question,
        answers,
        current_user: current.user_id(),
        flash: take_flash(&state, &current).await,
    }))
}

/// GET /questions/{id}/edit - Edit form context
#[utoipa::path(
    get,
    path = "/questions/{id}/edit",
    params(("id" = String, Path, description = "Question id")),
    responses(
        (status = 200, description = "Question to edit", body = QuestionFormPage),
        (status = 303, description = "Not logged in, or question missing")
    )
)]
pub async fn edit_question_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentSession,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<QuestionFormPage>> {
    let question_id = parse_question_id(&id, &headers)?;
    let question = missing_as_redirect(state.content.get_question(question_id).await, &headers)?;

    Ok(Json(QuestionFormPage {
        question: Some(question),
        current_user: current.user_id(),
        flash: take_flash(&state, &current).await,
    }))
}

/// PUT /questions/{id} - Rewrite title, content and tags
#[utoipa::path(
    put,
    path = "/questions/{id}",
    params(("id" = String, Path, description = "Question id")),
    request_body(content = QuestionPatchForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Updated (or missing); redirected"),
        (status = 422, description = "Title or content empty")
    )
)]
pub async fn update_question_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Form(form): Form<QuestionPatchForm>,
) -> ApiResult<Response> {
    let question_id = parse_question_id(&id, &headers)?;
    // Look up first so a missing question wins over a bad form.
    missing_as_redirect(state.content.get_question(question_id).await, &headers)?;

    let update = QuestionPatch::from(form).validate()?;
    missing_as_redirect(
        state.content.update_question(question_id, &update).await,
        &headers,
    )?;
    info!(%question_id, "Question updated");

    Ok(flash_redirect(FlashLevel::Success, "Successfully updated", "/questions"))
}

/// DELETE /questions/{id} - Remove unconditionally
#[utoipa::path(
    delete,
    path = "/questions/{id}",
    params(("id" = String, Path, description = "Question id")),
    responses((status = 303, description = "Deleted; redirected to /questions"))
)]
pub async fn delete_question_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let question_id = parse_question_id(&id, &headers)?;
    match state.content.delete_question(question_id).await {
        Ok(()) | Err(PortError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }
    info!(%question_id, by = %user_id, "Question deleted");

    Ok(flash_redirect(FlashLevel::Success, "Successfully deleted", "/questions"))
}

/// POST /questions/{id}/answers - Answer a question and notify its author
#[utoipa::path(
    post,
    path = "/questions/{id}/answers",
    params(("id" = String, Path, description = "Question id")),
    request_body(content = AnswerForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Answer stored; redirected to the question"),
        (status = 422, description = "Empty answer")
    )
)]
pub async fn post_answer_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
    Form(form): Form<AnswerForm>,
) -> ApiResult<Response> {
    let question_id = parse_question_id(&id, &headers)?;
    let question = missing_as_redirect(state.content.get_question(question_id).await, &headers)?;

    // 1. Persist the answer
    let answer = Answer::new(user_id, question.id, &form.content)?;
    state.content.create_answer(&answer).await?;

    // 2. Bump the counter
    let question = state.content.increment_answers(question.id).await?;

    // 3. Tell the author. Delivery problems never fail the request.
    let event = NotificationEvent::answer_posted(question, &answer);
    match serde_json::to_value(&event) {
        Ok(payload) => {
            state
                .broadcaster
                .notify(&event.room(), ANSWER_POSTED_EVENT, payload)
                .await;
        }
        Err(e) => error!(error = %e, "Failed to encode answer notification"),
    }
    info!(%question_id, answer_id = %answer.id, "Answer posted");

    Ok(flash_redirect(
        FlashLevel::Success,
        "Answer posted successfully",
        &format!("/questions/{}", question_id),
    ))
}

//=========================================================================================
// Helpers
//=========================================================================================

fn parse_question_id(raw: &str, headers: &HeaderMap) -> ApiResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::not_found(QUESTION_MISSING_MESSAGE, back_location(headers)))
}

fn missing_as_redirect<T>(result: Result<T, PortError>, headers: &HeaderMap) -> ApiResult<T> {
    result.map_err(|e| match e {
        PortError::NotFound(_) => {
            ApiError::not_found(QUESTION_MISSING_MESSAGE, back_location(headers))
        }
        other => other.into(),
    })
}

/// Reads the text fields into a draft and collects the (single, optional) image.
async fn read_question_form(
    mut multipart: Multipart,
) -> ApiResult<(QuestionDraft, Option<(String, Bytes)>)> {
    let mut draft = QuestionDraft::default();
    let mut image: Option<(String, Bytes)> = None;
    let mut saw_image = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == IMAGE_FIELD {
            if saw_image {
                return Err(ApiError::BadRequest(format!(
                    "Only one `{}` file is accepted",
                    IMAGE_FIELD
                )));
            }
            saw_image = true;
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read file bytes: {}", e)))?;
            // Browsers send an empty part when no file was chosen.
            if !data.is_empty() {
                image = Some((file_name, data));
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read field `{}`: {}", name, e)))?;
        match name.as_str() {
            "title" => draft.title = value,
            "host" => draft.host = value,
            "field" => draft.field = value,
            "who" => draft.who = value,
            "period" => draft.period = value,
            "content" => draft.content = value,
            "manager" => draft.manager = value,
            "phone" => draft.phone = value,
            "etc" => draft.etc = Some(value),
            "tags" => draft.tags = value,
            _ => {}
        }
    }

    Ok((draft, image))
}
