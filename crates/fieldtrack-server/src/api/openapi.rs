//! OpenAPI specification generation for the fieldtrack API.
//!
//! This module generates an OpenAPI 3.0 specification that is served at
//! `/api/openapi.json`, rendered by Swagger UI at `/swagger-ui`, and written
//! to disk by the `gen-openapi` binary for client generation.

use axum::Json;
use fieldtrack_core::{
    ConfigUpdate, MonitorConfig, PermissionStatus, Position, ProximityCheck, ProximityEvent,
    ProximityEventKind, ProximityTarget, TargetType,
};
use utoipa::OpenApi;

// Import all the handler modules to reference their types
use super::error::ErrorResponse;
use super::events::EventsResponse;
use super::health::HealthResponse;
use super::monitoring::{EvaluateResponse, MonitoringStatusResponse};
use super::permission::{PermissionResponse, SetPermissionRequest};
use super::position::IngestPositionRequest;
use super::targets::{AddTargetRequest, TargetStatus, TargetsResponse};

/// Serve the OpenAPI specification as JSON.
///
/// This endpoint is available at `/api/openapi.json` and returns the complete
/// OpenAPI 3.0 specification for the fieldtrack API.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a pretty-printed JSON string.
/// Used by the gen-openapi binary.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for fieldtrack.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "fieldtrack API",
        version = "0.1.0",
        description = r#"
# fieldtrack API

fieldtrack tells a field technician's device when it arrives at or leaves a
work order, asset or location.

## Overview

1. **Permission**: Location access must be granted before any fix is taken
2. **Targets**: Register circular geofences around work sites
3. **Monitoring**: Track the device and emit `enter`/`exit` events on boundary crossings
4. **Events**: Poll recent events with `GET /api/events?after=<last id>`

## Host-fed source

When the server runs with the `manual` source, the host application reports
the permission decision (`PUT /api/permission`) and fixes (`POST /api/position`).

## Semantics

- A device exactly on the boundary counts as inside
- Fixes less accurate than `accuracy_threshold_meters` never trigger events
- Removing a target or stopping monitoring never emits `exit`
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local fieldtrack server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "permission", description = "Location permission status and requests"),
        (name = "position", description = "One-shot fixes and fix ingestion"),
        (name = "targets", description = "Geofence target registry and ad-hoc proximity checks"),
        (name = "monitoring", description = "Monitoring lifecycle and proximity events"),
        (name = "config", description = "Monitor configuration")
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // Permission endpoints
        super::permission::get_permission,
        super::permission::request_permission,
        super::permission::set_permission,
        // Position endpoints
        super::position::get_position,
        super::position::ingest_position,
        // Target endpoints
        super::targets::list_targets,
        super::targets::add_target,
        super::targets::clear_targets,
        super::targets::get_target,
        super::targets::remove_target,
        super::targets::check_proximity,
        // Monitoring endpoints
        super::monitoring::get_status,
        super::monitoring::start_monitoring,
        super::monitoring::stop_monitoring,
        super::monitoring::evaluate_now,
        super::events::list_events,
        // Config endpoints
        super::config::get_config,
        super::config::update_config,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // Permission types
            PermissionStatus,
            PermissionResponse,
            SetPermissionRequest,
            // Position types
            Position,
            IngestPositionRequest,
            // Target types
            TargetType,
            ProximityTarget,
            ProximityCheck,
            AddTargetRequest,
            TargetStatus,
            TargetsResponse,
            // Monitoring types
            ProximityEventKind,
            ProximityEvent,
            MonitoringStatusResponse,
            EvaluateResponse,
            EventsResponse,
            // Config types
            MonitorConfig,
            ConfigUpdate,
        )
    )
)]
pub struct ApiDoc;
