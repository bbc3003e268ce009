//! Location service lifecycle endpoints.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use fencetag_core::ZoneInfo;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the service router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/start", post(start_service))
        .route("/stop", post(stop_service))
}

/// Location service status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "running": true,
    "credentials_configured": true,
    "subscribers": 1,
    "zones": []
}))]
pub struct ServiceStatusResponse {
    /// Whether the service is running.
    #[schema(example = true)]
    pub running: bool,

    /// Whether credentials are present in the configuration.
    #[schema(example = true)]
    pub credentials_configured: bool,

    /// Number of notification subscribers.
    #[schema(example = 1)]
    pub subscribers: usize,

    /// Zone rules last published by the service.
    pub zones: Vec<ZoneInfo>,
}

fn status(state: &SharedState) -> ServiceStatusResponse {
    ServiceStatusResponse {
        running: state.bridge.is_service_running(),
        credentials_configured: state.config.credentials.is_some(),
        subscribers: state.location.subscriber_count(),
        zones: state.location.zones(),
    }
}

/// Get location service status.
#[utoipa::path(
    get,
    path = "/api/service/status",
    tag = "service",
    operation_id = "getServiceStatus",
    summary = "Get location service status",
    responses(
        (status = 200, description = "Current status", body = ServiceStatusResponse)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<ServiceStatusResponse> {
    Json(status(&state))
}

/// Start the location service.
#[utoipa::path(
    post,
    path = "/api/service/start",
    tag = "service",
    operation_id = "startService",
    summary = "Start the location service",
    description = "Authenticates with the configured credentials and subscribes the tag \
        adapter. Does nothing if the service is already running.",
    responses(
        (status = 200, description = "Service running", body = ServiceStatusResponse),
        (status = 401, description = "Credentials rejected", body = crate::api::error::ErrorResponse),
        (status = 424, description = "No credentials configured", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn start_service(
    State(state): State<SharedState>,
) -> ApiResult<Json<ServiceStatusResponse>> {
    state.start_location_service()?;
    Ok(Json(status(&state)))
}

/// Stop the location service.
#[utoipa::path(
    post,
    path = "/api/service/stop",
    tag = "service",
    operation_id = "stopService",
    summary = "Stop the location service",
    description = "Stops the service and unsubscribes the tag adapter. Pending tag expiries \
        still fire. Does nothing if the service is not running.",
    responses(
        (status = 200, description = "Service stopped", body = ServiceStatusResponse)
    )
)]
pub async fn stop_service(State(state): State<SharedState>) -> Json<ServiceStatusResponse> {
    state.bridge.stop();
    info!("Location service stop requested");
    Json(status(&state))
}
