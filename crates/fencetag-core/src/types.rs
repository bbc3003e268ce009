//! Shared location types and the router's input event.
//!
//! The `*Info` structs mirror what the positioning SDK hands to its
//! notification callbacks. [`FenceEvent`] is the flattened, immutable form
//! consumed by the [`EventRouter`](crate::router::EventRouter).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Custom key/value fields configured for a zone's action.
pub type CustomData = HashMap<String, String>;

/// A named grouping of fences and beacons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "zone_id": "6f1c2a3e-0c6d-4d1b-9a7e-2f0d8b9c1a44",
    "zone_name": "Z1"
}))]
pub struct ZoneInfo {
    /// Identifier assigned by the location backend.
    #[schema(example = "6f1c2a3e-0c6d-4d1b-9a7e-2f0d8b9c1a44")]
    #[serde(default)]
    pub zone_id: String,

    /// Human-readable zone name, used to derive the `zone_` tag.
    #[schema(example = "Z1")]
    pub zone_name: String,
}

impl ZoneInfo {
    /// Creates zone info with an empty backend identifier.
    pub fn named(zone_name: impl Into<String>) -> Self {
        Self {
            zone_id: String::new(),
            zone_name: zone_name.into(),
        }
    }
}

/// Shape of a fence.
///
/// Line-strings are corridors with no well-defined inside, so the location
/// backend never sends a genuine checkout for them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    /// Ordinary closed polygon.
    #[default]
    Polygon,
    /// Circle around a centre point.
    Circle,
    /// Axis-aligned rectangle.
    Rectangle,
    /// Open polyline.
    LineString,
}

impl GeometryKind {
    /// Returns `true` for open (line-string) geometry.
    #[must_use]
    pub const fn is_line_string(self) -> bool {
        matches!(self, Self::LineString)
    }
}

/// A geofence definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FenceInfo {
    /// Identifier assigned by the location backend.
    #[serde(default)]
    pub id: String,

    /// Fence name, used to derive the `fence_` tag.
    #[schema(example = "F1")]
    pub name: String,

    /// Fence geometry.
    #[serde(default)]
    pub geometry: GeometryKind,
}

impl FenceInfo {
    /// Creates fence info with an empty backend identifier.
    pub fn new(name: impl Into<String>, geometry: GeometryKind) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            geometry,
        }
    }
}

/// A short-range radio proximity marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BeaconInfo {
    /// Identifier assigned by the location backend.
    #[serde(default)]
    pub id: String,

    /// Beacon name, used to derive the `beacon_` tag.
    #[schema(example = "B1")]
    pub name: String,
}

impl BeaconInfo {
    /// Creates beacon info with an empty backend identifier.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
        }
    }
}

/// Proximity band at which a beacon triggered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Proximity {
    /// Unknown or not reported.
    #[default]
    Unknown,
    /// Within a few centimetres.
    Immediate,
    /// Within a few metres.
    Near,
    /// Further than a few metres.
    Far,
}

/// Device position at the moment a trigger happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationInfo {
    /// Latitude in decimal degrees.
    #[schema(example = -33.8688)]
    pub latitude: f64,

    /// Longitude in decimal degrees.
    #[schema(example = 151.2093)]
    pub longitude: f64,

    /// When the trigger happened (UTC).
    pub timestamp_utc: DateTime<Utc>,
}

impl Default for LocationInfo {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            timestamp_utc: Utc::now(),
        }
    }
}

/// A single check-in or check-out, as seen by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FenceEvent {
    /// Device entered a fence.
    FenceCheckIn {
        /// Zone name.
        zone: String,
        /// Fence name.
        fence: String,
        /// Fence geometry.
        geometry: GeometryKind,
        /// Whether a checkout will be tracked and delivered later.
        will_check_out: bool,
    },
    /// Device left a fence.
    FenceCheckOut {
        /// Zone name.
        zone: String,
        /// Fence name.
        fence: String,
        /// Minutes spent inside the fence.
        dwell_minutes: u32,
    },
    /// Device came into range of a beacon.
    BeaconCheckIn {
        /// Zone name.
        zone: String,
        /// Beacon name.
        beacon: String,
        /// Whether a checkout will be tracked and delivered later.
        will_check_out: bool,
    },
    /// Device left a beacon's range.
    BeaconCheckOut {
        /// Zone name.
        zone: String,
        /// Beacon name.
        beacon: String,
        /// Minutes spent in range.
        dwell_minutes: u32,
    },
}

impl FenceEvent {
    /// Builds a fence check-in from SDK callback data.
    pub fn fence_check_in(fence: &FenceInfo, zone: &ZoneInfo, will_check_out: bool) -> Self {
        Self::FenceCheckIn {
            zone: zone.zone_name.clone(),
            fence: fence.name.clone(),
            geometry: fence.geometry,
            will_check_out,
        }
    }

    /// Builds a fence check-out from SDK callback data.
    pub fn fence_check_out(fence: &FenceInfo, zone: &ZoneInfo, dwell_minutes: u32) -> Self {
        Self::FenceCheckOut {
            zone: zone.zone_name.clone(),
            fence: fence.name.clone(),
            dwell_minutes,
        }
    }

    /// Builds a beacon check-in from SDK callback data.
    pub fn beacon_check_in(beacon: &BeaconInfo, zone: &ZoneInfo, will_check_out: bool) -> Self {
        Self::BeaconCheckIn {
            zone: zone.zone_name.clone(),
            beacon: beacon.name.clone(),
            will_check_out,
        }
    }

    /// Builds a beacon check-out from SDK callback data.
    pub fn beacon_check_out(beacon: &BeaconInfo, zone: &ZoneInfo, dwell_minutes: u32) -> Self {
        Self::BeaconCheckOut {
            zone: zone.zone_name.clone(),
            beacon: beacon.name.clone(),
            dwell_minutes,
        }
    }

    /// Zone name the event belongs to.
    #[must_use]
    pub fn zone(&self) -> &str {
        match self {
            Self::FenceCheckIn { zone, .. }
            | Self::FenceCheckOut { zone, .. }
            | Self::BeaconCheckIn { zone, .. }
            | Self::BeaconCheckOut { zone, .. } => zone,
        }
    }

    /// Fence or beacon name the event belongs to.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::FenceCheckIn { fence, .. } | Self::FenceCheckOut { fence, .. } => fence,
            Self::BeaconCheckIn { beacon, .. } | Self::BeaconCheckOut { beacon, .. } => beacon,
        }
    }

    /// Returns `true` for check-in events.
    #[must_use]
    pub const fn is_check_in(&self) -> bool {
        matches!(self, Self::FenceCheckIn { .. } | Self::BeaconCheckIn { .. })
    }

    /// Short label used in log fields.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::FenceCheckIn { .. } => "fence_check_in",
            Self::FenceCheckOut { .. } => "fence_check_out",
            Self::BeaconCheckIn { .. } => "beacon_check_in",
            Self::BeaconCheckOut { .. } => "beacon_check_out",
        }
    }
}
