//! Proximity event history endpoint.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use fieldtrack_core::ProximityEvent;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::state::{SharedState, RECENT_EVENTS_CAPACITY};

/// Creates the events router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(list_events))
}

/// Paging options for the event history.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Only return events recorded after the event with this id.
    pub after: Option<Uuid>,
    /// Maximum number of events to return (at least 1).
    pub limit: Option<usize>,
}

/// Recorded proximity events.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventsResponse {
    /// Events, oldest first.
    pub events: Vec<ProximityEvent>,
}

/// List recent events.
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "monitoring",
    operation_id = "listEvents",
    summary = "List recent proximity events",
    description = "Returns the most recent enter/exit events, oldest first. Poll with \
        `after` set to the last id you saw to receive only new events. Only a bounded \
        number of events is kept.",
    params(EventsQuery),
    responses(
        (status = 200, description = "Recorded events", body = EventsResponse),
        (status = 400, description = "Invalid limit", body = crate::api::ErrorResponse)
    )
)]
pub async fn list_events(
    State(state): State<SharedState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Json<EventsResponse>> {
    let limit = query.limit.unwrap_or(RECENT_EVENTS_CAPACITY);
    if limit == 0 {
        return Err(ApiError::bad_request("INVALID_LIMIT", "limit must be at least 1"));
    }
    Ok(Json(EventsResponse {
        events: state.recent_events(query.after, limit),
    }))
}
