//! Proximity target API endpoints.
//!
//! Registers, lists and removes geofence targets, and answers ad-hoc
//! proximity questions about a single target.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use fieldtrack_core::{
    FieldtrackError, Position, ProximityCheck, ProximityTarget, TargetType,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the targets router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_targets).post(add_target).delete(clear_targets))
        .route("/{id}", get(get_target).delete(remove_target))
        .route("/{id}/proximity", get(check_proximity))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A target to register.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "wo-1042",
    "name": "Replace pump seal",
    "latitude": 40.7128,
    "longitude": -74.006,
    "radius_meters": 150.0,
    "target_type": "work_order"
}))]
pub struct AddTargetRequest {
    /// Caller-supplied unique id. Re-using an id replaces that target.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Center latitude in decimal degrees.
    pub latitude: f64,
    /// Center longitude in decimal degrees.
    pub longitude: f64,
    /// Geofence radius; the configured default when omitted.
    pub radius_meters: Option<f64>,
    /// What the geofence surrounds.
    pub target_type: TargetType,
}

/// A registered target with its live membership.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TargetStatus {
    /// The target definition.
    #[serde(flatten)]
    pub target: ProximityTarget,

    /// Whether the device is currently inside this target.
    pub in_range: bool,

    /// Distance from the last known position, if any.
    #[schema(nullable)]
    pub distance_meters: Option<f64>,
}

/// All registered targets.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TargetsResponse {
    /// Targets in registration order.
    pub targets: Vec<TargetStatus>,
}

/// An optional hypothetical position to check against.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProximityQuery {
    /// Latitude to check; the last known position is used when omitted.
    pub latitude: Option<f64>,
    /// Longitude to check; required together with `latitude`.
    pub longitude: Option<f64>,
}

impl ProximityQuery {
    fn position(&self) -> fieldtrack_core::Result<Option<Position>> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Position::new(latitude, longitude, 0.0).map(Some),
            (None, None) => Ok(None),
            _ => Err(FieldtrackError::InvalidPosition(
                "latitude and longitude must be given together".to_string(),
            )),
        }
    }
}

fn status_of(state: &SharedState, target: ProximityTarget) -> TargetStatus {
    let in_range = state.monitor.targets_in_range().contains(&target.id);
    let distance_meters = state.monitor.distance_to_target(&target.id);
    TargetStatus {
        target,
        in_range,
        distance_meters,
    }
}

fn find(state: &SharedState, id: &str) -> fieldtrack_core::Result<ProximityTarget> {
    state
        .monitor
        .target(id)
        .ok_or_else(|| FieldtrackError::TargetNotFound(id.to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// List targets.
#[utoipa::path(
    get,
    path = "/api/targets",
    tag = "targets",
    operation_id = "listTargets",
    summary = "List proximity targets",
    description = "Returns every registered target with whether the device is inside it \
        and its distance from the last known position.",
    responses(
        (status = 200, description = "Registered targets", body = TargetsResponse)
    )
)]
pub async fn list_targets(State(state): State<SharedState>) -> Json<TargetsResponse> {
    let targets = state
        .monitor
        .targets()
        .into_iter()
        .map(|target| status_of(&state, target))
        .collect();
    Json(TargetsResponse { targets })
}

/// Add or replace a target.
#[utoipa::path(
    post,
    path = "/api/targets",
    tag = "targets",
    operation_id = "addTarget",
    summary = "Add a proximity target",
    description = "Registers a circular geofence. Posting an existing id replaces its \
        definition but keeps its current inside/outside state; the next evaluation \
        compares against the new geometry.",
    request_body = AddTargetRequest,
    responses(
        (status = 201, description = "Target registered", body = TargetStatus),
        (status = 400, description = "Invalid target", body = crate::api::ErrorResponse)
    )
)]
pub async fn add_target(
    State(state): State<SharedState>,
    Json(request): Json<AddTargetRequest>,
) -> ApiResult<(StatusCode, Json<TargetStatus>)> {
    let radius = request
        .radius_meters
        .unwrap_or_else(|| state.monitor.get_config().default_radius_meters);
    let target = ProximityTarget::new(
        request.id,
        request.name,
        request.latitude,
        request.longitude,
        radius,
        request.target_type,
    );

    state.monitor.add_target(target.clone())?;
    Ok((StatusCode::CREATED, Json(status_of(&state, target))))
}

/// Remove all targets.
#[utoipa::path(
    delete,
    path = "/api/targets",
    tag = "targets",
    operation_id = "clearTargets",
    summary = "Remove all proximity targets",
    description = "Removes every target and forgets all membership. No exit events are emitted.",
    responses(
        (status = 204, description = "Targets removed")
    )
)]
pub async fn clear_targets(State(state): State<SharedState>) -> StatusCode {
    state.monitor.clear_targets();
    StatusCode::NO_CONTENT
}

/// Get one target.
#[utoipa::path(
    get,
    path = "/api/targets/{id}",
    tag = "targets",
    operation_id = "getTarget",
    summary = "Get a proximity target",
    params(("id" = String, Path, description = "Target id")),
    responses(
        (status = 200, description = "The target", body = TargetStatus),
        (status = 404, description = "Unknown target", body = crate::api::ErrorResponse)
    )
)]
pub async fn get_target(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TargetStatus>> {
    let target = find(&state, &id)?;
    Ok(Json(status_of(&state, target)))
}

/// Remove one target.
#[utoipa::path(
    delete,
    path = "/api/targets/{id}",
    tag = "targets",
    operation_id = "removeTarget",
    summary = "Remove a proximity target",
    description = "Removes the target and its membership. No exit event is emitted.",
    params(("id" = String, Path, description = "Target id")),
    responses(
        (status = 204, description = "Target removed"),
        (status = 404, description = "Unknown target", body = crate::api::ErrorResponse)
    )
)]
pub async fn remove_target(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.monitor.remove_target(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(FieldtrackError::TargetNotFound(id).into())
    }
}

/// Check proximity to one target.
#[utoipa::path(
    get,
    path = "/api/targets/{id}/proximity",
    tag = "targets",
    operation_id = "checkTargetProximity",
    summary = "Check proximity to a target",
    description = "Computes whether a position is inside the target without changing \
        any monitoring state. Uses the last known position unless `latitude` and \
        `longitude` are given; `distance_meters` is null when there is no position.",
    params(
        ("id" = String, Path, description = "Target id"),
        ProximityQuery
    ),
    responses(
        (status = 200, description = "Proximity result", body = ProximityCheck),
        (status = 400, description = "Invalid coordinates", body = crate::api::ErrorResponse),
        (status = 404, description = "Unknown target", body = crate::api::ErrorResponse)
    )
)]
pub async fn check_proximity(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<ProximityQuery>,
) -> ApiResult<Json<ProximityCheck>> {
    find(&state, &id)?;
    let position = query.position()?;
    Ok(Json(
        state.monitor.check_target_proximity(&id, position.as_ref()),
    ))
}
