//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `health` - Service health checks
//! - `permission` - Location permission status and requests
//! - `position` - One-shot fixes and host fix ingestion
//! - `targets` - Geofence target registry
//! - `monitoring` - Monitoring lifecycle
//! - `events` - Recent proximity events
//! - `config` - Monitor configuration
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod monitoring;
pub mod openapi;
pub mod permission;
pub mod position;
pub mod targets;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /swagger-ui            - Interactive API documentation
/// /api
/// ├── /permission        - Permission status, request, host decision
/// ├── /position          - One-shot fix, host fix ingestion
/// ├── /targets           - Target registry and proximity checks
/// ├── /monitoring        - Start, stop, status, evaluate
/// ├── /events            - Recent proximity events
/// ├── /config            - Monitor configuration
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                // OpenAPI spec at /api/openapi.json
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/permission", permission::router())
                .nest("/position", position::router())
                .nest("/targets", targets::router())
                .nest("/monitoring", monitoring::router())
                .nest("/events", events::router())
                .nest("/config", config::router()),
        )
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
