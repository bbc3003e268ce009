//! HTTP API routes and handlers.
//!
//! - `events` - Check-in/check-out delivery
//! - `tags` - Current tags and pending expiries
//! - `service` - Location service lifecycle
//! - `config` - Effective configuration
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod openapi;
pub mod service;
pub mod tags;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /api
/// ├── /events            - Deliver a check-in or check-out
/// ├── /tags              - Current tag set
/// ├── /expiry            - Pending tag expiries
/// ├── /service           - Location service status, start, stop
/// ├── /config            - Effective configuration
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .route("/tags", get(tags::get_tags))
                .route("/expiry", get(tags::get_expiry))
                .nest("/events", events::router())
                .nest("/service", service::router())
                .nest("/config", config::router()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum_test::TestServer;

    use super::*;
    use crate::state::test_support;

    #[tokio::test]
    async fn test_health_reports_service_state() {
        let (_store, state) = test_support::state();
        let server = TestServer::new(create_router(state.clone())).unwrap();

        let body: health::HealthResponse = server.get("/health").await.json();
        assert_eq!(body.status, "ok");
        assert!(!body.location_service_running);

        state.start_location_service().unwrap();
        let body: health::HealthResponse = server.get("/health").await.json();
        assert!(body.location_service_running);
    }

    #[tokio::test]
    async fn test_openapi_route_served() {
        let (_store, state) = test_support::state();
        let server = TestServer::new(create_router(state)).unwrap();

        let response = server.get("/api/openapi.json").await;
        response.assert_status_ok();
        assert!(response.text().contains("fencetag API"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (_store, state) = test_support::state();
        let server = TestServer::new(create_router(state)).unwrap();

        server
            .get("/api/unknown")
            .await
            .assert_status(axum::http::StatusCode::NOT_FOUND);
    }
}
