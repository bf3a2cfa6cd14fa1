//! services/api/src/web/router.rs
//!
//! Assembles every route and middleware layer. The binary and the integration
//! tests both build the application through `build_router`.

use crate::error::ApiError;
use crate::web::{
    auth::{login_handler, logout_handler, signin_page_handler, signup_handler},
    middleware::{not_found_fallback, render_errors},
    questions::{
        create_question_handler, delete_question_handler, edit_question_handler,
        list_questions_handler, new_question_handler, post_answer_handler,
        show_question_handler, update_question_handler,
    },
    rest::health_handler,
    session::{require_auth, session_layer},
    state::AppState,
    ws_handler::push_handler,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub fn build_router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let config = app_state.config.clone();

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // Form pages that only make sense when logged in.
    let protected_routes = Router::new()
        .route("/questions/new", get(new_question_handler))
        .route("/questions/{id}/edit", get(edit_question_handler))
        .route_layer(axum_middleware::from_fn(require_auth));

    // Mixed routes: handlers that need a user take the `AuthUser` extractor.
    let routes = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/signin", get(signin_page_handler))
        .route(
            "/questions",
            get(list_questions_handler).post(create_question_handler),
        )
        .route(
            "/questions/{id}",
            get(show_question_handler)
                .put(update_question_handler)
                .delete(delete_question_handler),
        )
        .route("/questions/{id}/answers", post(post_answer_handler))
        .route("/push", get(push_handler));

    let router = Router::new()
        .merge(routes)
        .merge(protected_routes)
        .nest_service("/images/uploads", ServeDir::new(&config.upload_dir))
        .fallback(not_found_fallback)
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            session_layer,
        ))
        .layer(CatchPanicLayer::new())
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            render_errors,
        ))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state);

    Ok(router)
}
