//! # fencetag-core
//!
//! Core logic for fencetag, which turns geofence and beacon check-ins into
//! push-notification tags.
//!
//! Each check-in adds a `zone_<zone>` tag and a `fence_<fence>` or
//! `beacon_<beacon>` tag; each check-out removes them. When no check-out will
//! follow (line-string fences, or targets configured without one), the tags
//! are removed automatically after a configurable delay.
//!
//! ## Architecture
//!
//! - [`types`] - Events and location payloads
//! - [`tags`] - Tag naming and tag mutations
//! - [`router`] - Pure event-to-mutation routing
//! - [`scheduler`] - Deferred removal dispatcher
//! - [`store`] - The [`TagStore`] seam and an in-memory store
//! - [`storage`] - JSON-file backed tag store
//! - [`location`] - Contract with the positioning service
//! - [`adapter`] - Wires routing, scheduling and the location service together
//! - [`config`] - Configuration loading, saving, and validation
//! - [`error`] - Unified error type for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod adapter;
pub mod config;
pub mod error;
pub mod location;
pub mod router;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod tags;
pub mod types;

// Re-export primary types for convenience
pub use adapter::{AdapterDelegate, LocationBridge, TagAdapter};
pub use config::{
    default_config_path, ConfigError, ConfigResult, ExpiryConfig, FencetagConfig, ServerConfig,
    StorageConfig,
};
pub use error::{FencetagError, Result};
pub use location::{
    ApplicationNotificationListener, InProcessLocationService, LocationError, LocationNotification,
    LocationService, SdkCredentials, ServiceStatusListener,
};
pub use router::{EventRouter, RoutedEvent, DEFAULT_TAG_EXPIRY};
pub use scheduler::{ExpiryPolicy, ExpiryScheduler, ExpiryStats, PendingRemoval};
pub use storage::{default_data_dir, FileTagStore};
pub use store::{InMemoryTagStore, StoreError, StoreResult, TagStore};
pub use tags::{DeferredRemoval, ExpiryKey, TagMutation, TargetKind};
pub use types::{
    BeaconInfo, CustomData, FenceEvent, FenceInfo, GeometryKind, LocationInfo, Proximity, ZoneInfo,
};
