//! Tag set and expiry inspection endpoints.

use axum::extract::State;
use axum::Json;
use fencetag_core::{ExpiryPolicy, ExpiryStats, PendingRemoval, TagStore};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Current tag set.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "tags": ["fence_F1", "zone_Z1"],
    "count": 2
}))]
pub struct TagsResponse {
    /// Tags in lexicographic order.
    pub tags: Vec<String>,

    /// Number of tags.
    #[schema(example = 2)]
    pub count: usize,
}

/// Deferred removals and scheduler counters.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExpiryResponse {
    /// Re-entry policy the scheduler runs with.
    pub policy: ExpiryPolicy,

    /// Configured expiry delay in milliseconds.
    #[schema(example = 7000)]
    pub delay_ms: u64,

    /// Removals that have not fired yet, soonest first.
    pub pending: Vec<PendingRemoval>,

    /// Lifetime counters.
    pub stats: ExpiryStats,
}

/// Get the current tag set.
#[utoipa::path(
    get,
    path = "/api/tags",
    tag = "tags",
    operation_id = "getTags",
    summary = "List current tags",
    description = "Returns every tag currently applied, e.g. `zone_Z1` and `fence_F1` while \
        the device is inside fence F1 of zone Z1.",
    responses(
        (status = 200, description = "Current tags", body = TagsResponse),
        (status = 503, description = "Tag store unavailable", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn get_tags(State(state): State<SharedState>) -> ApiResult<Json<TagsResponse>> {
    let tags: Vec<String> = state.store.tags()?.into_iter().collect();
    Ok(Json(TagsResponse {
        count: tags.len(),
        tags,
    }))
}

/// Get pending deferred removals.
#[utoipa::path(
    get,
    path = "/api/expiry",
    tag = "tags",
    operation_id = "getExpiry",
    summary = "List pending tag expiries",
    description = "Returns self-expiring tag removals that have not fired yet, together \
        with scheduled/fired/superseded/failed counters.",
    responses(
        (status = 200, description = "Pending removals", body = ExpiryResponse),
        (status = 503, description = "Expiry scheduler stopped", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn get_expiry(State(state): State<SharedState>) -> ApiResult<Json<ExpiryResponse>> {
    let scheduler = state.adapter.scheduler();
    let pending = scheduler.pending().await?;

    Ok(Json(ExpiryResponse {
        policy: scheduler.policy(),
        delay_ms: state.config.expiry.delay_ms,
        pending,
        stats: scheduler.stats(),
    }))
}

#[cfg(test)]
mod tests {
    use axum_test::TestServer;
    use fencetag_core::TagMutation;
    use serde_json::json;

    use super::*;
    use crate::api::create_router;
    use crate::state::test_support;

    #[tokio::test]
    async fn test_get_tags_lists_store_contents() {
        let (store, state) = test_support::state();
        store
            .apply(&TagMutation::new().add_tag("zone_Z1").add_tag("fence_F1"))
            .unwrap();
        let server = TestServer::new(create_router(state)).unwrap();

        let body: TagsResponse = server.get("/api/tags").await.json();
        assert_eq!(body.tags, vec!["fence_F1", "zone_Z1"]);
        assert_eq!(body.count, 2);
    }

    #[tokio::test]
    async fn test_get_expiry_shows_pending_removal() {
        let (_store, state) = test_support::state();
        state.start_location_service().unwrap();
        let server = TestServer::new(create_router(state)).unwrap();

        server
            .post("/api/events")
            .json(&json!({
                "kind": "beacon_check_in",
                "beacon": {"name": "B1"},
                "zone": {"zone_name": "Z2"},
                "will_check_out": false
            }))
            .await
            .assert_status_ok();

        let body: ExpiryResponse = server.get("/api/expiry").await.json();
        assert_eq!(body.policy, ExpiryPolicy::CancelOnReentry);
        assert_eq!(body.delay_ms, 7000);
        assert_eq!(body.pending.len(), 1);
        assert_eq!(body.pending[0].key.zone, "Z2");
        assert_eq!(body.pending[0].key.target, "B1");
        assert_eq!(body.stats.scheduled, 1);
    }
}
