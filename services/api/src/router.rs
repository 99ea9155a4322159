//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the call WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        Companion, CreateCompanionPayload, ErrorResponse, Issue, SessionHistoryEntry,
        SubjectOption,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_companion,
        handlers::list_companions,
        handlers::get_companion,
        handlers::list_subjects,
        handlers::recent_sessions,
    ),
    components(
        schemas(Companion, CreateCompanionPayload, SubjectOption, SessionHistoryEntry, ErrorResponse, Issue)
    ),
    tags(
        (name = "Companion API", description = "Browse and create AI tutoring companions and call them")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route(
            "/companions",
            get(handlers::list_companions).post(handlers::create_companion),
        )
        .route("/companions/{id}", get(handlers::get_companion))
        .route("/companions/{id}/call", get(ws_handler))
        .route("/subjects", get(handlers::list_subjects))
        .route("/history", get(handlers::recent_sessions))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
