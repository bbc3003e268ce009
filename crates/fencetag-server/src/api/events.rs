//! Location event ingestion.
//!
//! Events posted here are accepted only while the location service is
//! running. They are handed to the tag adapter directly, so the response
//! describes what was actually committed and scheduled.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use fencetag_core::{FenceEvent, FencetagError, LocationNotification, RoutedEvent};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the events router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", post(post_event))
}

/// What an event did to the tag set.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "kind": "fence_check_in",
    "zone": "Z1",
    "target": "F2",
    "added": ["fence_F2", "zone_Z1"],
    "removed": [],
    "expires_in_ms": 7000
}))]
pub struct EventOutcome {
    /// Event kind.
    #[schema(example = "fence_check_in")]
    pub kind: String,

    /// Zone name.
    #[schema(example = "Z1")]
    pub zone: String,

    /// Fence or beacon name.
    #[schema(example = "F2")]
    pub target: String,

    /// Tags added.
    pub added: Vec<String>,

    /// Tags removed.
    pub removed: Vec<String>,

    /// Delay before the added tags are removed again. Present only when a
    /// removal was scheduled.
    #[schema(nullable, example = 7000)]
    pub expires_in_ms: Option<u64>,
}

impl EventOutcome {
    fn new(event: &FenceEvent, routed: &RoutedEvent) -> Self {
        Self {
            kind: event.kind_label().to_string(),
            zone: event.zone().to_string(),
            target: event.target().to_string(),
            added: routed.mutation.add.iter().cloned().collect(),
            removed: routed.mutation.remove.iter().cloned().collect(),
            expires_in_ms: routed
                .deferred
                .as_ref()
                .map(|removal| u64::try_from(removal.delay.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

/// Deliver a location event.
#[utoipa::path(
    post,
    path = "/api/events",
    tag = "events",
    operation_id = "postEvent",
    summary = "Deliver a check-in or check-out",
    description = "Applies a fence or beacon check-in/check-out while the location service \
        is running. Check-ins add `zone_<zone>` and `fence_<fence>`/`beacon_<beacon>` tags; \
        check-outs remove them. Line-string fences and targets without a tracked check-out \
        have their tags removed again after the configured expiry delay. Checking out of one \
        fence removes the shared `zone_<zone>` tag even if another fence of that zone is \
        still occupied.",
    request_body = LocationNotification,
    responses(
        (status = 200, description = "Tags applied", body = EventOutcome),
        (status = 409, description = "Location service is not running", body = crate::api::error::ErrorResponse),
        (status = 422, description = "Malformed event"),
        (status = 503, description = "Tag store or expiry scheduler unavailable", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn post_event(
    State(state): State<SharedState>,
    Json(notification): Json<LocationNotification>,
) -> ApiResult<Json<EventOutcome>> {
    if !state.bridge.is_service_running() {
        return Err(FencetagError::LocationServiceNotRunning.into());
    }

    let event = notification.event();
    let adapter = Arc::clone(&state.adapter);
    // The file store does blocking I/O.
    let (event, routed) = tokio::task::spawn_blocking(move || {
        adapter.handle(&event).map(|routed| (event, routed))
    })
    .await
    .map_err(|err| ApiError::InternalError {
        error_code: "EVENT_TASK_FAILED".into(),
        message: "Event handling task failed".into(),
        details: Some(err.to_string()),
    })??;

    debug!(kind = event.kind_label(), "Event applied over HTTP");
    Ok(Json(EventOutcome::new(&event, &routed)))
}
