//! Tag naming and tag mutations.
//!
//! Tags are namespaced by what they describe: `zone_<name>`, `fence_<name>`
//! and `beacon_<name>`. The same zone/target pair always yields the same two
//! tag strings.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Prefix for zone tags.
pub const ZONE_TAG_PREFIX: &str = "zone_";

/// Prefix for fence tags.
pub const FENCE_TAG_PREFIX: &str = "fence_";

/// Prefix for beacon tags.
pub const BEACON_TAG_PREFIX: &str = "beacon_";

/// Tag for a zone.
#[must_use]
pub fn zone_tag(zone_name: &str) -> String {
    format!("{ZONE_TAG_PREFIX}{zone_name}")
}

/// Tag for a fence.
#[must_use]
pub fn fence_tag(fence_name: &str) -> String {
    format!("{FENCE_TAG_PREFIX}{fence_name}")
}

/// Tag for a beacon.
#[must_use]
pub fn beacon_tag(beacon_name: &str) -> String {
    format!("{BEACON_TAG_PREFIX}{beacon_name}")
}

/// Whether a check target is a fence or a beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Geofence.
    Fence,
    /// Beacon.
    Beacon,
}

impl TargetKind {
    /// Tag for a target of this kind.
    #[must_use]
    pub fn tag(self, target_name: &str) -> String {
        match self {
            Self::Fence => fence_tag(target_name),
            Self::Beacon => beacon_tag(target_name),
        }
    }
}

/// Identifies the zone/target pair a deferred removal belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct ExpiryKey {
    /// Fence or beacon.
    pub kind: TargetKind,
    /// Zone name.
    pub zone: String,
    /// Fence or beacon name.
    pub target: String,
}

impl ExpiryKey {
    /// Creates a key.
    pub fn new(kind: TargetKind, zone: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind,
            zone: zone.into(),
            target: target.into(),
        }
    }

    /// The two tags this pair maps to.
    #[must_use]
    pub fn tags(&self) -> BTreeSet<String> {
        BTreeSet::from([zone_tag(&self.zone), self.kind.tag(&self.target)])
    }
}

/// A batch of tag additions and removals, committed with a single apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TagMutation {
    /// Tags to add.
    pub add: BTreeSet<String>,
    /// Tags to remove.
    pub remove: BTreeSet<String>,
}

impl TagMutation {
    /// Creates an empty mutation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutation that adds every tag in `tags`.
    #[must_use]
    pub fn adding(tags: BTreeSet<String>) -> Self {
        Self {
            add: tags,
            remove: BTreeSet::new(),
        }
    }

    /// Mutation that removes every tag in `tags`.
    #[must_use]
    pub fn removing(tags: BTreeSet<String>) -> Self {
        Self {
            add: BTreeSet::new(),
            remove: tags,
        }
    }

    /// Queues a tag for addition.
    #[must_use]
    pub fn add_tag(mut self, tag: impl Into<String>) -> Self {
        self.add.insert(tag.into());
        self
    }

    /// Queues a tag for removal.
    #[must_use]
    pub fn remove_tag(mut self, tag: impl Into<String>) -> Self {
        self.remove.insert(tag.into());
        self
    }

    /// Returns `true` if the mutation changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Applies the mutation to a tag set. Additions go first, then removals.
    pub fn apply_to(&self, tags: &mut BTreeSet<String>) {
        tags.extend(self.add.iter().cloned());
        for tag in &self.remove {
            tags.remove(tag);
        }
    }
}

/// "Remove these tags once `delay` has elapsed."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredRemoval {
    /// Zone/target pair the tags belong to.
    pub key: ExpiryKey,
    /// Tags to remove when the removal fires.
    pub remove: BTreeSet<String>,
    /// How long to wait before firing.
    pub delay: Duration,
}

impl DeferredRemoval {
    /// Deferred removal of both tags for `key`.
    #[must_use]
    pub fn for_key(key: ExpiryKey, delay: Duration) -> Self {
        let remove = key.tags();
        Self { key, remove, delay }
    }
}
