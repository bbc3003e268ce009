//! Event-to-tag routing.
//!
//! Every check-in adds the zone tag and the fence/beacon tag. Every
//! check-out removes them. A check-in also yields a deferred removal of the
//! same two tags when no real checkout is coming:
//!
//! | Event           | Deferred removal when                         |
//! |-----------------|-----------------------------------------------|
//! | fence check-in  | geometry is a line-string, or no checkout     |
//! | beacon check-in | no checkout                                   |
//! | any check-out   | never                                         |

use std::time::Duration;

use tracing::debug;

use crate::tags::{DeferredRemoval, ExpiryKey, TagMutation, TargetKind};
use crate::types::FenceEvent;

/// Default time a self-expiring tag stays applied.
pub const DEFAULT_TAG_EXPIRY: Duration = Duration::from_millis(7000);

/// Result of routing a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedEvent {
    /// Zone/target pair the event refers to.
    pub key: ExpiryKey,
    /// Mutation to apply immediately.
    pub mutation: TagMutation,
    /// Removal to schedule, if the tags must self-expire.
    pub deferred: Option<DeferredRemoval>,
}

/// Pure mapping from [`FenceEvent`] to tag mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRouter {
    tag_expiry: Duration,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(DEFAULT_TAG_EXPIRY)
    }
}

impl EventRouter {
    /// Creates a router whose deferred removals wait `tag_expiry`.
    #[must_use]
    pub const fn new(tag_expiry: Duration) -> Self {
        Self { tag_expiry }
    }

    /// Delay attached to deferred removals.
    #[must_use]
    pub const fn tag_expiry(&self) -> Duration {
        self.tag_expiry
    }

    /// Computes the immediate mutation and optional deferred removal for `event`.
    #[must_use]
    pub fn route(&self, event: &FenceEvent) -> RoutedEvent {
        let (key, check_in, self_expires) = match event {
            FenceEvent::FenceCheckIn {
                zone,
                fence,
                geometry,
                will_check_out,
            } => (
                ExpiryKey::new(TargetKind::Fence, zone.as_str(), fence.as_str()),
                true,
                geometry.is_line_string() || !will_check_out,
            ),
            FenceEvent::FenceCheckOut { zone, fence, .. } => (
                ExpiryKey::new(TargetKind::Fence, zone.as_str(), fence.as_str()),
                false,
                false,
            ),
            FenceEvent::BeaconCheckIn {
                zone,
                beacon,
                will_check_out,
            } => (
                ExpiryKey::new(TargetKind::Beacon, zone.as_str(), beacon.as_str()),
                true,
                !will_check_out,
            ),
            FenceEvent::BeaconCheckOut { zone, beacon, .. } => (
                ExpiryKey::new(TargetKind::Beacon, zone.as_str(), beacon.as_str()),
                false,
                false,
            ),
        };

        let tags = key.tags();
        let mutation = if check_in {
            TagMutation::adding(tags)
        } else {
            TagMutation::removing(tags)
        };
        let deferred =
            self_expires.then(|| DeferredRemoval::for_key(key.clone(), self.tag_expiry));

        debug!(
            kind = event.kind_label(),
            zone = %key.zone,
            target = %key.target,
            self_expires,
            "Routed location event"
        );

        RoutedEvent {
            key,
            mutation,
            deferred,
        }
    }
}
