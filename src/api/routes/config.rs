//! Configuration handlers.

use crate::api::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// GET /config - Get current configuration
#[utoipa::path(
    get,
    path = "/api/v1/config",
    tag = "config",
    responses(
        (status = 200, description = "Current configuration", body = crate::config::Config),
    )
)]
pub async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.engine.config().await))
}

/// PATCH /config - Update runtime-changeable configuration fields
#[utoipa::path(
    patch,
    path = "/api/v1/config",
    tag = "config",
    request_body(content = crate::config::ConfigUpdate, description = "Configuration updates (runtime-changeable fields only)"),
    responses(
        (status = 200, description = "Configuration updated", body = crate::config::Config),
    )
)]
pub async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<crate::config::ConfigUpdate>,
) -> impl IntoResponse {
    let config = state.engine.update_config(update).await;
    (StatusCode::OK, Json(config))
}

/// PATCH /config/network-status - Simulate a network connectivity change
///
/// Exposed separately from the general config PATCH, grounded on the
/// teacher's dedicated `PUT /config/speed-limit` endpoint, so test harnesses
/// can flip connectivity without round-tripping the whole config document.
#[utoipa::path(
    patch,
    path = "/api/v1/config/network-status",
    tag = "config",
    request_body = crate::config::NetworkStatus,
    responses(
        (status = 204, description = "Network status updated"),
    )
)]
pub async fn set_network_status(
    State(state): State<AppState>,
    Json(status): Json<crate::config::NetworkStatus>,
) -> impl IntoResponse {
    state.engine.set_network_status(status).await;
    StatusCode::NO_CONTENT
}
