//! Configuration API endpoint.
//!
//! Read-only view of the configuration the server started with. Credentials
//! are never echoed back.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use fencetag_core::ExpiryPolicy;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Creates the config router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_config))
}

/// Current configuration response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "expiry_delay_ms": 7000,
    "expiry_policy": "cancel_on_reentry",
    "credentials_configured": true,
    "package_name": "au.com.example.app",
    "data_dir": "/var/lib/fencetag",
    "auto_start": true
}))]
pub struct ConfigResponse {
    /// Milliseconds a self-expiring tag stays applied.
    #[schema(example = 7000)]
    pub expiry_delay_ms: u64,

    /// Re-entry policy for pending removals.
    pub expiry_policy: ExpiryPolicy,

    /// Whether location service credentials are configured.
    #[schema(example = true)]
    pub credentials_configured: bool,

    /// Package name from the credentials, if configured.
    #[schema(nullable, example = "au.com.example.app")]
    pub package_name: Option<String>,

    /// Configured tag store directory, if overridden.
    #[schema(nullable, example = "/var/lib/fencetag")]
    pub data_dir: Option<String>,

    /// Whether the location service starts on boot.
    #[schema(example = true)]
    pub auto_start: bool,
}

/// Get current configuration.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    operation_id = "getConfig",
    summary = "Get current configuration",
    description = "Returns the expiry settings and whether credentials are configured. \
        The API key is never returned.",
    responses(
        (status = 200, description = "Configuration retrieved", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<ConfigResponse> {
    let config = &state.config;

    Json(ConfigResponse {
        expiry_delay_ms: config.expiry.delay_ms,
        expiry_policy: config.expiry.policy,
        credentials_configured: config.credentials.is_some(),
        package_name: config
            .credentials
            .as_ref()
            .map(|credentials| credentials.package_name.clone()),
        data_dir: config
            .storage
            .data_dir
            .as_ref()
            .map(|dir| dir.display().to_string()),
        auto_start: config.server.auto_start,
    })
}

#[cfg(test)]
mod tests {
    use axum_test::TestServer;

    use super::*;
    use crate::api::create_router;
    use crate::state::test_support;

    #[tokio::test]
    async fn test_get_config_hides_api_key() {
        let (_store, state) = test_support::state();
        let server = TestServer::new(create_router(state)).unwrap();

        let response = server.get("/api/config").await;
        response.assert_status_ok();
        assert!(!response.text().contains("2b0c2c4e"));

        let body: ConfigResponse = response.json();
        assert_eq!(body.expiry_delay_ms, 7000);
        assert_eq!(body.expiry_policy, ExpiryPolicy::CancelOnReentry);
        assert!(body.credentials_configured);
        assert_eq!(body.package_name.as_deref(), Some("au.com.example.app"));
        assert_eq!(body.data_dir, None);
    }
}
