//! # Server Configuration
//!
//! Router setup and startup for the calendar sync service.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers;
use crate::runtime::SyncRuntime;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub runtime: Arc<SyncRuntime>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/calendar/events", get(handlers::calendar::list_events))
        .route(
            "/calendar/accounts",
            get(handlers::calendar::list_google_accounts),
        )
        .route(
            "/calendar/calendars",
            get(handlers::calendar::list_google_calendars),
        )
        .route("/calendar/sync-status", get(handlers::calendar::sync_status))
        .route(
            "/calendar/accounts/{google_account_id}/refresh-calendars",
            post(handlers::calendar::refresh_calendars),
        )
        .route("/calendar/sync", get(handlers::calendar::sync_calendars))
        .route(
            "/calendar/webhook",
            post(handlers::webhooks::receive_notification),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let runtime = Arc::new(SyncRuntime::new(&config, db.clone())?);
    let state = AppState { db, runtime };
    let app = create_app(state);

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::calendar::list_events,
        crate::handlers::calendar::list_google_accounts,
        crate::handlers::calendar::list_google_calendars,
        crate::handlers::calendar::sync_status,
    ),
    components(
        schemas(
            crate::error::ApiError,
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::calendar::EventsResponse,
            crate::handlers::calendar::AccountsResponse,
            crate::handlers::calendar::CalendarsResponse,
            crate::handlers::calendar::SyncStatusResponse,
            crate::sync::ClientEvent,
            crate::gcal::client::EventDateTime,
        )
    ),
    info(
        title = "Chronos Sync API",
        description = "Google Calendar synchronization back-end",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
