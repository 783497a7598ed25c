//! Position API endpoints.
//!
//! One-shot fixes and, for the host-fed source, fix ingestion.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use fieldtrack_core::Position;
use serde::Deserialize;
use tracing::debug;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the position router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_position).post(ingest_position))
}

/// A fix reported by the host device.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "latitude": 40.7128,
    "longitude": -74.006,
    "accuracy_meters": 8.5,
    "speed_mps": 1.2
}))]
pub struct IngestPositionRequest {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Radius of the 68% confidence circle in meters.
    pub accuracy_meters: f64,
    /// Altitude above mean sea level in meters.
    pub altitude_meters: Option<f64>,
    /// Course over ground in degrees from true north.
    pub heading_degrees: Option<f64>,
    /// Ground speed in meters per second.
    pub speed_mps: Option<f64>,
    /// When the fix was taken; defaults to the time of receipt.
    pub captured_at_utc: Option<DateTime<Utc>>,
}

impl IngestPositionRequest {
    fn into_position(self) -> fieldtrack_core::Result<Position> {
        Position {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy_meters: self.accuracy_meters,
            altitude_meters: self.altitude_meters,
            heading_degrees: self.heading_degrees,
            speed_mps: self.speed_mps,
            captured_at_utc: self.captured_at_utc.unwrap_or_else(Utc::now),
        }
        .validated()
    }
}

/// Get the current position.
#[utoipa::path(
    get,
    path = "/api/position",
    tag = "position",
    operation_id = "getCurrentPosition",
    summary = "Get the current position",
    description = "Returns a single fix from the position source, honoring the \
        configured timeout, maximum cached age and accuracy threshold.",
    responses(
        (status = 200, description = "Current position", body = Position),
        (status = 403, description = "Location permission not granted", body = crate::api::ErrorResponse),
        (status = 422, description = "Fix less accurate than the threshold", body = crate::api::ErrorResponse),
        (status = 503, description = "No position available", body = crate::api::ErrorResponse),
        (status = 504, description = "No fix within the timeout", body = crate::api::ErrorResponse)
    )
)]
pub async fn get_position(State(state): State<SharedState>) -> ApiResult<Json<Position>> {
    let position = state.monitor.provider().get_current_position().await?;
    Ok(Json(position))
}

/// Ingest a fix from the host.
#[utoipa::path(
    post,
    path = "/api/position",
    tag = "position",
    operation_id = "ingestPosition",
    summary = "Report a fix",
    description = "For the host-fed source only: publishes a fix to one-shot requests \
        and to the monitor's tracking stream. Fixes below the accuracy threshold are \
        accepted here but dropped before evaluation.",
    request_body = IngestPositionRequest,
    responses(
        (status = 202, description = "Fix accepted", body = Position),
        (status = 400, description = "Invalid coordinates or accuracy", body = crate::api::ErrorResponse),
        (status = 409, description = "The configured source does not accept fixes", body = crate::api::ErrorResponse)
    )
)]
pub async fn ingest_position(
    State(state): State<SharedState>,
    Json(request): Json<IngestPositionRequest>,
) -> ApiResult<(StatusCode, Json<Position>)> {
    let source = state.manual_source().ok_or_else(|| {
        ApiError::conflict(
            "manual_source_required",
            "Fixes can only be reported when the server runs with the manual source",
        )
    })?;

    let position = request.into_position()?;
    debug!(
        latitude = position.latitude,
        longitude = position.longitude,
        accuracy = position.accuracy_meters,
        "Fix reported by host"
    );
    source.push_position(position.clone());
    Ok((StatusCode::ACCEPTED, Json(position)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_request_defaults_timestamp() {
        let request: IngestPositionRequest =
            serde_json::from_str(r#"{"latitude": 1.0, "longitude": 2.0, "accuracy_meters": 3.0}"#)
                .unwrap();
        let before = Utc::now();
        let position = request.into_position().unwrap();
        assert!(position.captured_at_utc >= before);
        assert!(position.speed_mps.is_none());
    }

    #[test]
    fn test_ingest_request_rejects_bad_coordinates() {
        let request: IngestPositionRequest =
            serde_json::from_str(r#"{"latitude": 91.0, "longitude": 2.0, "accuracy_meters": 3.0}"#)
                .unwrap();
        assert!(request.into_position().is_err());
    }
}
