//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use fencetag_core::{
    FencetagConfig, FencetagError, InProcessLocationService, LocationBridge, TagAdapter, TagStore,
};
use tracing::info;

/// Shared handle passed to every handler.
pub type SharedState = Arc<AppState>;

/// Everything the server wires together at startup.
///
/// The adapter, location service and bridge live for the whole process; there
/// is no global instance.
pub struct AppState {
    /// Configuration the server was started with.
    pub config: FencetagConfig,
    /// Tag store the adapter writes to.
    pub store: Arc<dyn TagStore>,
    /// Routes events and owns the expiry scheduler.
    pub adapter: Arc<TagAdapter>,
    /// In-process location service driven by `bridge`.
    pub location: Arc<InProcessLocationService>,
    /// Lifecycle controller for `location`.
    pub bridge: LocationBridge,
    started_at: Instant,
}

impl AppState {
    /// Builds the state and spawns the expiry dispatcher.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: FencetagConfig, store: Arc<dyn TagStore>) -> Self {
        let adapter = Arc::new(TagAdapter::from_config(&config.expiry, Arc::clone(&store)));
        let location = Arc::new(InProcessLocationService::new());
        let bridge = LocationBridge::new(location.clone(), Arc::clone(&adapter));

        Self {
            config,
            store,
            adapter,
            location,
            bridge,
            started_at: Instant::now(),
        }
    }

    /// Wraps the state for sharing with the router.
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }

    /// Starts the location service with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns [`FencetagError::CredentialsMissing`] if none are configured,
    /// or the service's error if they are rejected.
    pub fn start_location_service(&self) -> Result<(), FencetagError> {
        let credentials = self
            .config
            .credentials
            .as_ref()
            .ok_or(FencetagError::CredentialsMissing)?;
        self.bridge.start(credentials)?;
        info!(running = self.bridge.is_service_running(), "Location service start requested");
        Ok(())
    }

    /// Seconds since the state was built.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support;
    use super::*;
    use fencetag_core::InMemoryTagStore;

    #[tokio::test]
    async fn test_start_requires_credentials() {
        let state = AppState::new(FencetagConfig::default(), Arc::new(InMemoryTagStore::new()));
        assert!(matches!(
            state.start_location_service(),
            Err(FencetagError::CredentialsMissing)
        ));
        assert!(!state.bridge.is_service_running());
    }

    #[tokio::test]
    async fn test_start_subscribes_adapter() {
        let (_store, state) = test_support::state();
        state.start_location_service().unwrap();
        assert!(state.bridge.is_service_running());
        assert_eq!(state.location.subscriber_count(), 1);
    }
}
