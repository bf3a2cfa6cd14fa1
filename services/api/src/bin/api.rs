//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, LocalUploadStore, MemoryStore},
    config::{Config, StorageBackend},
    error::ApiError,
    web::{
        build_router,
        rest::ApiDoc,
        session::start_session_sweeper,
        start_heartbeat,
        state::{AppState, Stores},
    },
};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!(environment = ?config.environment, "Configuration loaded. Starting server...");

    // --- 2. Open the Stores ---
    let (stores, db_adapter) = match config.storage_backend {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| ApiError::Internal("DATABASE_URL is required".to_string()))?;
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            (stores_from(db_adapter.clone(), &config), Some(db_adapter))
        }
        StorageBackend::Memory => {
            info!("Using the in-memory store; nothing survives a restart.");
            (stores_from(Arc::new(MemoryStore::new()), &config), None)
        }
    };

    tokio::fs::create_dir_all(&config.upload_dir).await?;

    // --- 3. Build the Shared AppState & Background Tasks ---
    let app_state = Arc::new(AppState::new(config.clone(), stores));
    let gateway = app_state.gateway.clone();

    let background_cancel = CancellationToken::new();
    let heartbeat_handle = start_heartbeat(
        gateway.clone(),
        config.push_heartbeat,
        background_cancel.clone(),
    );
    let sweeper_handle = start_session_sweeper(
        app_state.sessions.clone(),
        config.session_sweep,
        background_cancel.clone(),
    );

    // --- 4. Create the Web Router ---
    // Merge the board router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(build_router(app_state)?)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 6. Post-shutdown Cleanup ---
    info!("Server stopped accepting connections, cleaning up");
    background_cancel.cancel();
    let _ = heartbeat_handle.await;
    let _ = sweeper_handle.await;

    let push_count = gateway.connection_count().await;
    info!(push_count, "Closing remaining push connections");
    gateway.shutdown_all().await;

    if let Some(db_adapter) = db_adapter {
        db_adapter.close().await;
    }
    info!("Graceful shutdown complete");
    Ok(())
}

/// One adapter serves every store port; uploads always go to local disk.
fn stores_from<S>(store: Arc<S>, config: &Config) -> Stores
where
    S: contest_board_core::UserStore
        + contest_board_core::SessionStore
        + contest_board_core::ContentStore
        + 'static,
{
    Stores {
        users: store.clone(),
        sessions: store.clone(),
        session_reader: store.clone(),
        content: store,
        uploads: Arc::new(LocalUploadStore::new(
            config.upload_dir.clone(),
            config.upload_tmp_dir.clone(),
        )),
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
