//! Monitoring lifecycle API endpoints.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use fieldtrack_core::{Position, ProximityEvent};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the monitoring router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_status))
        .route("/start", post(start_monitoring))
        .route("/stop", post(stop_monitoring))
        .route("/evaluate", post(evaluate_now))
}

/// Monitoring status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "monitoring": true,
    "target_count": 3,
    "targets_in_range": ["wo-1042"],
    "last_position": null
}))]
pub struct MonitoringStatusResponse {
    /// Whether monitoring is running.
    pub monitoring: bool,

    /// Number of registered targets.
    pub target_count: usize,

    /// Ids of the targets the device is inside, sorted.
    pub targets_in_range: Vec<String>,

    /// The most recent accepted fix.
    #[schema(nullable)]
    pub last_position: Option<Position>,
}

/// Events produced by a manual evaluation pass.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EvaluateResponse {
    /// Transitions detected, in target registration order.
    pub events: Vec<ProximityEvent>,
}

fn status(state: &SharedState) -> MonitoringStatusResponse {
    let mut targets_in_range: Vec<String> = state.monitor.targets_in_range().into_iter().collect();
    targets_in_range.sort();

    MonitoringStatusResponse {
        monitoring: state.monitor.is_monitoring(),
        target_count: state.monitor.targets().len(),
        targets_in_range,
        last_position: state.monitor.last_position(),
    }
}

/// Get monitoring status.
#[utoipa::path(
    get,
    path = "/api/monitoring",
    tag = "monitoring",
    operation_id = "getMonitoringStatus",
    summary = "Get monitoring status",
    responses(
        (status = 200, description = "Monitoring status", body = MonitoringStatusResponse)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<MonitoringStatusResponse> {
    Json(status(&state))
}

/// Start monitoring.
#[utoipa::path(
    post,
    path = "/api/monitoring/start",
    tag = "monitoring",
    operation_id = "startMonitoring",
    summary = "Start proximity monitoring",
    description = "Starts continuous tracking and periodic re-evaluation. Does nothing \
        if monitoring is already running.",
    responses(
        (status = 200, description = "Monitoring running", body = MonitoringStatusResponse),
        (status = 403, description = "Location permission not granted", body = crate::api::ErrorResponse),
        (status = 503, description = "Position source unavailable", body = crate::api::ErrorResponse)
    )
)]
pub async fn start_monitoring(
    State(state): State<SharedState>,
) -> ApiResult<Json<MonitoringStatusResponse>> {
    state.monitor.start_monitoring().await?;
    Ok(Json(status(&state)))
}

/// Stop monitoring.
#[utoipa::path(
    post,
    path = "/api/monitoring/stop",
    tag = "monitoring",
    operation_id = "stopMonitoring",
    summary = "Stop proximity monitoring",
    description = "Stops tracking and the timer and forgets which targets the device \
        is inside. Idempotent.",
    responses(
        (status = 200, description = "Monitoring stopped", body = MonitoringStatusResponse)
    )
)]
pub async fn stop_monitoring(State(state): State<SharedState>) -> Json<MonitoringStatusResponse> {
    state.monitor.stop_monitoring();
    Json(status(&state))
}

/// Evaluate now.
#[utoipa::path(
    post,
    path = "/api/monitoring/evaluate",
    tag = "monitoring",
    operation_id = "evaluateNow",
    summary = "Run an evaluation pass now",
    description = "Re-checks the last known position against every target without \
        waiting for the timer. Returns no events while monitoring is stopped.",
    responses(
        (status = 200, description = "Events emitted by this pass", body = EvaluateResponse)
    )
)]
pub async fn evaluate_now(State(state): State<SharedState>) -> Json<EvaluateResponse> {
    Json(EvaluateResponse {
        events: state.monitor.evaluate_now(),
    })
}
