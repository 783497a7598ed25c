//! Location permission API endpoints.
//!
//! Reads the permission status, triggers the platform request flow, and
//! (for the host-fed source) records the host's grant decision.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use fieldtrack_core::{PermissionStatus, PERMISSION_RATIONALE};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the permission router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_permission).put(set_permission))
        .route("/request", post(request_permission))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Current permission status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "denied",
    "granted": false,
    "rationale": "Location access lets fieldtrack detect when you arrive at or leave a work order, asset or location, so check-ins happen automatically."
}))]
pub struct PermissionResponse {
    /// Permission status reported by the platform.
    pub status: PermissionStatus,

    /// Shorthand for `status == granted`.
    pub granted: bool,

    /// Why access is needed; present while access is not granted.
    #[schema(nullable)]
    pub rationale: Option<String>,
}

impl From<PermissionStatus> for PermissionResponse {
    fn from(status: PermissionStatus) -> Self {
        Self {
            status,
            granted: status.is_granted(),
            rationale: (!status.is_granted()).then(|| PERMISSION_RATIONALE.to_string()),
        }
    }
}

/// The host's answer to a permission prompt.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "status": "granted" }))]
pub struct SetPermissionRequest {
    /// Status to record.
    pub status: PermissionStatus,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the permission status.
#[utoipa::path(
    get,
    path = "/api/permission",
    tag = "permission",
    operation_id = "getPermission",
    summary = "Get location permission status",
    description = "Returns the current location permission status without prompting. \
        Platform failures are reported as `denied`.",
    responses(
        (status = 200, description = "Permission status", body = PermissionResponse)
    )
)]
pub async fn get_permission(State(state): State<SharedState>) -> Json<PermissionResponse> {
    Json(state.monitor.provider().check_permission().await.into())
}

/// Request permission.
#[utoipa::path(
    post,
    path = "/api/permission/request",
    tag = "permission",
    operation_id = "requestPermission",
    summary = "Request location permission",
    description = "Runs the platform permission flow and returns the outcome. \
        Never fails; platform errors are reported as `denied`.",
    responses(
        (status = 200, description = "Permission outcome", body = PermissionResponse)
    )
)]
pub async fn request_permission(State(state): State<SharedState>) -> Json<PermissionResponse> {
    Json(state.monitor.provider().request_permission().await.into())
}

/// Record the host's permission decision.
#[utoipa::path(
    put,
    path = "/api/permission",
    tag = "permission",
    operation_id = "setPermission",
    summary = "Record the permission decision",
    description = "For the host-fed source only: records the outcome of the permission \
        prompt shown by the host application.",
    request_body = SetPermissionRequest,
    responses(
        (status = 200, description = "Permission recorded", body = PermissionResponse),
        (status = 409, description = "The configured source manages its own permission")
    )
)]
pub async fn set_permission(
    State(state): State<SharedState>,
    Json(request): Json<SetPermissionRequest>,
) -> ApiResult<Json<PermissionResponse>> {
    let source = state.manual_source().ok_or_else(|| {
        ApiError::conflict(
            "manual_source_required",
            "Permission can only be set when the server runs with the manual source",
        )
    })?;

    source.set_permission(request.status);
    info!(status = %request.status, "Permission decision recorded");
    Ok(Json(request.status.into()))
}
