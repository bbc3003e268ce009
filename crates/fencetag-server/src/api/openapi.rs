//! OpenAPI specification for the fencetag API.

use axum::Json;
use utoipa::OpenApi;

use fencetag_core::{
    BeaconInfo, ExpiryKey, ExpiryPolicy, ExpiryStats, FenceInfo, GeometryKind, LocationInfo,
    LocationNotification, PendingRemoval, Proximity, TargetKind, ZoneInfo,
};

use super::config::ConfigResponse;
use super::error::ErrorResponse;
use super::events::EventOutcome;
use super::health::HealthResponse;
use super::service::ServiceStatusResponse;
use super::tags::{ExpiryResponse, TagsResponse};

/// Serve the OpenAPI specification as JSON at `/api/openapi.json`.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty JSON, for the gen-openapi binary.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for fencetag.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "fencetag API",
        version = "0.1.0",
        description = r#"
# fencetag API

fencetag turns geofence and beacon check-ins into push-notification tags.

## Tags

- Entering fence `F` in zone `Z` adds `zone_Z` and `fence_F`.
- Coming into range of beacon `B` in zone `Z` adds `zone_Z` and `beacon_B`.
- The matching check-out removes both tags.
- Line-string fences, and fences or beacons without a tracked check-out,
  never send a check-out. Their tags are removed after the expiry delay
  (7000 ms by default).

Tags are shared: leaving any fence in a zone removes the zone tag, even if
another fence in the same zone is still occupied.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local fencetag server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "events", description = "Check-in and check-out delivery"),
        (name = "tags", description = "Current tags and pending expiries"),
        (name = "service", description = "Location service lifecycle"),
        (name = "config", description = "Effective configuration")
    ),
    paths(
        super::health::health_check,
        super::events::post_event,
        super::tags::get_tags,
        super::tags::get_expiry,
        super::service::get_status,
        super::service::start_service,
        super::service::stop_service,
        super::config::get_config,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            EventOutcome,
            TagsResponse,
            ExpiryResponse,
            ServiceStatusResponse,
            ConfigResponse,
            LocationNotification,
            ZoneInfo,
            FenceInfo,
            BeaconInfo,
            GeometryKind,
            Proximity,
            LocationInfo,
            PendingRemoval,
            ExpiryKey,
            TargetKind,
            ExpiryPolicy,
            ExpiryStats,
        )
    )
)]
pub struct ApiDoc;
