//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification, plus the liveness probe.

use crate::web::{auth, questions};
use axum::response::Json;
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::signin_page_handler,
        questions::list_questions_handler,
        questions::new_question_handler,
        questions::create_question_handler,
        questions::show_question_handler,
        questions::edit_question_handler,
        questions::update_question_handler,
        questions::delete_question_handler,
        questions::post_answer_handler,
    ),
    components(
        schemas(
            HealthResponse,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            auth::SigninPage,
            questions::QuestionListPage,
            questions::QuestionDetailPage,
            questions::QuestionFormPage,
            questions::AnswerForm,
            questions::QuestionPatchForm,
        )
    ),
    tags(
        (name = "Contest Board API", description = "Questions, answers and session-bound push notifications.")
    )
)]
pub struct ApiDoc;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /health - Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
