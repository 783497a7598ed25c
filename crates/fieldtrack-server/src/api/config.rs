//! Configuration API endpoints.
//!
//! Reads and partially updates the monitor configuration. Changes apply
//! immediately (a new check interval restarts the timer) and last until
//! the process exits; the configuration file is not rewritten.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use fieldtrack_core::{ConfigUpdate, MonitorConfig};

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the config router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_config).patch(update_config))
}

/// Get current configuration.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    operation_id = "getConfig",
    summary = "Get current configuration",
    description = "Returns the monitor configuration: accuracy threshold, distance \
        filter, check interval, default radius and position request options.",
    responses(
        (status = 200, description = "Configuration retrieved", body = MonitorConfig)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<MonitorConfig> {
    Json(state.monitor.get_config())
}

/// Update configuration.
#[utoipa::path(
    patch,
    path = "/api/config",
    tag = "config",
    operation_id = "updateConfig",
    summary = "Update configuration",
    description = "Applies the given fields and leaves the others unchanged. The whole \
        update is rejected if the result would be invalid.",
    request_body = ConfigUpdate,
    responses(
        (status = 200, description = "Configuration updated", body = MonitorConfig),
        (status = 422, description = "Invalid configuration", body = crate::api::ErrorResponse)
    )
)]
pub async fn update_config(
    State(state): State<SharedState>,
    Json(update): Json<ConfigUpdate>,
) -> ApiResult<Json<MonitorConfig>> {
    let config = state.monitor.update_config(&update)?;
    Ok(Json(config))
}
