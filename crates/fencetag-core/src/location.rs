//! Boundary with the positioning SDK.
//!
//! The SDK itself is out of reach; this module defines the contract the
//! adapter needs from it:
//!
//! - [`LocationService`] - authenticate, stop, and manage notification subscribers
//! - [`ServiceStatusListener`] - lifecycle callbacks (started, stopped, error, rule update)
//! - [`ApplicationNotificationListener`] - the four check-in/check-out callbacks
//!
//! [`InProcessLocationService`] implements the contract in-process, so a host
//! can feed events it receives from elsewhere (a webhook, a test) through the
//! same path the SDK would use.

use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::error::{FencetagError, Result};
use crate::types::{
    BeaconInfo, CustomData, FenceEvent, FenceInfo, LocationInfo, Proximity, ZoneInfo,
};

/// Reverse-domain package name, e.g. `au.com.example.app`.
static PACKAGE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)+$")
        .expect("Invalid package name regex")
});

/// Errors reported by the positioning SDK.
///
/// Fatal errors mean the service is no longer operable and are always
/// followed by a stop notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// Credentials were rejected. Always fatal.
    #[error("Authentication failed: {reason}")]
    Authentication {
        /// Why authentication failed.
        reason: String,
    },

    /// The location backend could not be reached.
    #[error("Network error: {reason}")]
    Network {
        /// Why the request failed.
        reason: String,
        /// Whether the service stopped because of it.
        fatal: bool,
    },

    /// Device location services are switched off.
    #[error("Location services are not enabled")]
    LocationServiceNotEnabled {
        /// Whether the service stopped because of it.
        fatal: bool,
    },

    /// Zone rules could not be downloaded.
    #[error("Rule download failed: {reason}")]
    RuleDownload {
        /// Why the download failed.
        reason: String,
    },

    /// The device has no Bluetooth Low Energy radio.
    #[error("Bluetooth Low Energy is not available on this device")]
    BleNotAvailable,

    /// Bluetooth is switched off.
    #[error("Bluetooth is not enabled")]
    BluetoothNotEnabled,
}

impl LocationError {
    /// Returns `true` if the service stopped because of this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Authentication { .. } => true,
            Self::Network { fatal, .. } | Self::LocationServiceNotEnabled { fatal } => *fatal,
            Self::RuleDownload { .. } | Self::BleNotAvailable | Self::BluetoothNotEnabled => false,
        }
    }
}

/// Credentials passed through to the positioning SDK.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "package_name": "au.com.example.app",
    "api_key": "2b0c2c4e-5f0e-11e6-8b77-86f30ca893d3",
    "user_name": "ops@example.com",
    "endpoint_url": null,
    "restart_mode": true
}))]
pub struct SdkCredentials {
    /// Package name of the app registered with the location backend.
    pub package_name: String,

    /// API key issued for the app.
    pub api_key: String,

    /// Account user name.
    pub user_name: String,

    /// Optional custom endpoint.
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Whether the service restarts itself if the host process is killed.
    #[serde(default)]
    pub restart_mode: bool,
}

impl std::fmt::Debug for SdkCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkCredentials")
            .field("package_name", &self.package_name)
            .field("api_key", &"<redacted>")
            .field("user_name", &self.user_name)
            .field("endpoint_url", &self.endpoint_url)
            .field("restart_mode", &self.restart_mode)
            .finish()
    }
}

impl SdkCredentials {
    /// Returns every problem with these credentials as `(field, message)` pairs.
    #[must_use]
    pub fn problems(&self) -> Vec<(&'static str, String)> {
        let mut problems = Vec::new();

        if self.package_name.trim().is_empty() {
            problems.push(("package_name", "Package name cannot be empty".to_string()));
        } else if !PACKAGE_NAME_REGEX.is_match(&self.package_name) {
            problems.push((
                "package_name",
                format!(
                    "'{}' is not a reverse-domain package name (e.g. au.com.example.app)",
                    self.package_name
                ),
            ));
        }

        if self.api_key.trim().is_empty() {
            problems.push(("api_key", "API key cannot be empty".to_string()));
        } else if uuid::Uuid::parse_str(&self.api_key).is_err() {
            problems.push(("api_key", "API key must be a UUID".to_string()));
        }

        if self.user_name.trim().is_empty() {
            problems.push(("user_name", "User name cannot be empty".to_string()));
        }

        if let Some(url) = &self.endpoint_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                problems.push((
                    "endpoint_url",
                    format!("'{url}' must start with http:// or https://"),
                ));
            }
        }

        problems
    }
}

/// Receives service lifecycle callbacks.
pub trait ServiceStatusListener: Send + Sync {
    /// Authentication succeeded and the service is running.
    fn on_service_started(&self);

    /// The service stopped.
    fn on_service_stopped(&self);

    /// The service reported an error.
    fn on_service_error(&self, error: &LocationError);

    /// Zone rules were refreshed.
    fn on_rule_update(&self, zones: &[ZoneInfo]);
}

/// Receives check-in and check-out callbacks.
pub trait ApplicationNotificationListener: Send + Sync {
    /// Device entered a fence. `will_check_out` means a checkout will follow.
    fn on_check_into_fence(
        &self,
        fence: &FenceInfo,
        zone: &ZoneInfo,
        location: &LocationInfo,
        custom_data: &CustomData,
        will_check_out: bool,
    );

    /// Device left a fence after `dwell_minutes`.
    fn on_checked_out_from_fence(
        &self,
        fence: &FenceInfo,
        zone: &ZoneInfo,
        dwell_minutes: u32,
        custom_data: &CustomData,
    );

    /// Device came into range of a beacon.
    fn on_check_into_beacon(
        &self,
        beacon: &BeaconInfo,
        zone: &ZoneInfo,
        location: &LocationInfo,
        proximity: Proximity,
        custom_data: &CustomData,
        will_check_out: bool,
    );

    /// Device left a beacon's range after `dwell_minutes`.
    fn on_checked_out_from_beacon(
        &self,
        beacon: &BeaconInfo,
        zone: &ZoneInfo,
        dwell_minutes: u32,
        custom_data: &CustomData,
    );
}

/// The positioning service as seen by the adapter.
pub trait LocationService: Send + Sync {
    /// Sends an authentication request. Lifecycle outcomes arrive on `listener`.
    ///
    /// # Errors
    ///
    /// Returns the SDK error if the request is rejected outright.
    fn authenticate(
        &self,
        credentials: &SdkCredentials,
        listener: Arc<dyn ServiceStatusListener>,
    ) -> std::result::Result<(), LocationError>;

    /// Stops the service.
    fn stop(&self);

    /// Returns `true` while the service is running.
    fn is_running(&self) -> bool;

    /// Starts delivering notifications to `listener`.
    fn subscribe(&self, listener: Arc<dyn ApplicationNotificationListener>);

    /// Stops delivering notifications to `listener`.
    fn unsubscribe(&self, listener: &Arc<dyn ApplicationNotificationListener>);
}

/// A notification as delivered by the location backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationNotification {
    /// Device entered a fence.
    FenceCheckIn {
        /// Fence entered.
        fence: FenceInfo,
        /// Zone the fence belongs to.
        zone: ZoneInfo,
        /// Where the trigger happened.
        #[serde(default)]
        location: LocationInfo,
        /// Zone custom fields.
        #[serde(default)]
        custom_data: CustomData,
        /// Whether a checkout will follow.
        will_check_out: bool,
    },
    /// Device left a fence.
    FenceCheckOut {
        /// Fence left.
        fence: FenceInfo,
        /// Zone the fence belongs to.
        zone: ZoneInfo,
        /// Minutes spent inside.
        #[serde(default)]
        dwell_minutes: u32,
        /// Zone custom fields.
        #[serde(default)]
        custom_data: CustomData,
    },
    /// Device came into range of a beacon.
    BeaconCheckIn {
        /// Beacon in range.
        beacon: BeaconInfo,
        /// Zone the beacon belongs to.
        zone: ZoneInfo,
        /// Where the beacon is.
        #[serde(default)]
        location: LocationInfo,
        /// Proximity band at trigger time.
        #[serde(default)]
        proximity: Proximity,
        /// Zone custom fields.
        #[serde(default)]
        custom_data: CustomData,
        /// Whether a checkout will follow.
        will_check_out: bool,
    },
    /// Device left a beacon's range.
    BeaconCheckOut {
        /// Beacon left.
        beacon: BeaconInfo,
        /// Zone the beacon belongs to.
        zone: ZoneInfo,
        /// Minutes spent in range.
        #[serde(default)]
        dwell_minutes: u32,
        /// Zone custom fields.
        #[serde(default)]
        custom_data: CustomData,
    },
}

impl LocationNotification {
    /// The routing event this notification produces.
    #[must_use]
    pub fn event(&self) -> FenceEvent {
        match self {
            Self::FenceCheckIn {
                fence,
                zone,
                will_check_out,
                ..
            } => FenceEvent::fence_check_in(fence, zone, *will_check_out),
            Self::FenceCheckOut {
                fence,
                zone,
                dwell_minutes,
                ..
            } => FenceEvent::fence_check_out(fence, zone, *dwell_minutes),
            Self::BeaconCheckIn {
                beacon,
                zone,
                will_check_out,
                ..
            } => FenceEvent::beacon_check_in(beacon, zone, *will_check_out),
            Self::BeaconCheckOut {
                beacon,
                zone,
                dwell_minutes,
                ..
            } => FenceEvent::beacon_check_out(beacon, zone, *dwell_minutes),
        }
    }

    fn deliver_to(&self, listener: &dyn ApplicationNotificationListener) {
        match self {
            Self::FenceCheckIn {
                fence,
                zone,
                location,
                custom_data,
                will_check_out,
            } => listener.on_check_into_fence(fence, zone, location, custom_data, *will_check_out),
            Self::FenceCheckOut {
                fence,
                zone,
                dwell_minutes,
                custom_data,
            } => listener.on_checked_out_from_fence(fence, zone, *dwell_minutes, custom_data),
            Self::BeaconCheckIn {
                beacon,
                zone,
                location,
                proximity,
                custom_data,
                will_check_out,
            } => listener.on_check_into_beacon(
                beacon,
                zone,
                location,
                *proximity,
                custom_data,
                *will_check_out,
            ),
            Self::BeaconCheckOut {
                beacon,
                zone,
                dwell_minutes,
                custom_data,
            } => listener.on_checked_out_from_beacon(beacon, zone, *dwell_minutes, custom_data),
        }
    }
}

#[derive(Default)]
struct ServiceState {
    running: bool,
    status_listener: Option<Arc<dyn ServiceStatusListener>>,
    subscribers: Vec<Arc<dyn ApplicationNotificationListener>>,
    zones: Vec<ZoneInfo>,
}

/// In-process [`LocationService`].
///
/// Credentials are checked locally. Notifications are injected by the host
/// with [`notify`](Self::notify) and fanned out to every subscriber.
/// Callbacks are always invoked without internal locks held, so listeners may
/// call back into the service.
#[derive(Default)]
pub struct InProcessLocationService {
    state: RwLock<ServiceState>,
}

impl InProcessLocationService {
    /// Creates a stopped service with no zones.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `notification` to every subscriber.
    ///
    /// Returns the number of listeners notified.
    ///
    /// # Errors
    ///
    /// Returns [`FencetagError::LocationServiceNotRunning`] if the service is stopped.
    pub fn notify(&self, notification: &LocationNotification) -> Result<usize> {
        let subscribers = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if !state.running {
                return Err(FencetagError::LocationServiceNotRunning);
            }
            state.subscribers.clone()
        };

        for subscriber in &subscribers {
            notification.deliver_to(subscriber.as_ref());
        }
        debug!(subscribers = subscribers.len(), "Delivered location notification");
        Ok(subscribers.len())
    }

    /// Replaces the zone rules and tells the status listener.
    pub fn publish_rules(&self, zones: Vec<ZoneInfo>) {
        let (listener, zones) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.zones = zones;
            (state.status_listener.clone(), state.zones.clone())
        };
        if let Some(listener) = listener {
            listener.on_rule_update(&zones);
        }
    }

    /// Reports an SDK error to the status listener. Fatal errors stop the service.
    pub fn report_error(&self, error: &LocationError) {
        let listener = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status_listener
            .clone();
        if let Some(listener) = listener {
            listener.on_service_error(error);
        }
        if error.is_fatal() {
            self.stop();
        }
    }

    /// Number of notification subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }

    /// Current zone rules.
    pub fn zones(&self) -> Vec<ZoneInfo> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .zones
            .clone()
    }
}

impl LocationService for InProcessLocationService {
    fn authenticate(
        &self,
        credentials: &SdkCredentials,
        listener: Arc<dyn ServiceStatusListener>,
    ) -> std::result::Result<(), LocationError> {
        let problems = credentials.problems();
        if let Some((field, message)) = problems.first() {
            let error = LocationError::Authentication {
                reason: format!("{field}: {message}"),
            };
            warn!(%error, "Rejected location service credentials");
            listener.on_service_error(&error);
            listener.on_service_stopped();
            return Err(error);
        }

        let zones = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.running = true;
            state.status_listener = Some(Arc::clone(&listener));
            state.zones.clone()
        };

        info!(
            package_name = %credentials.package_name,
            restart_mode = credentials.restart_mode,
            "Location service started"
        );
        listener.on_service_started();
        if !zones.is_empty() {
            listener.on_rule_update(&zones);
        }
        Ok(())
    }

    fn stop(&self) {
        let listener = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if !state.running {
                return;
            }
            state.running = false;
            state.status_listener.take()
        };

        info!("Location service stopped");
        if let Some(listener) = listener {
            listener.on_service_stopped();
        }
    }

    fn is_running(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .running
    }

    fn subscribe(&self, listener: Arc<dyn ApplicationNotificationListener>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.subscribers.iter().any(|s| Arc::ptr_eq(s, &listener)) {
            state.subscribers.push(listener);
        }
    }

    fn unsubscribe(&self, listener: &Arc<dyn ApplicationNotificationListener>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.subscribers.retain(|s| !Arc::ptr_eq(s, listener));
    }
}
