//! The [`TagStore`] trait and an in-memory implementation.
//!
//! A tag store is the push SDK's view of the device's audience tags. Every
//! mutation is committed as one batch through [`TagStore::apply`].

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use thiserror::Error;

use crate::tags::TagMutation;

/// Errors raised by tag store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend cannot be reached right now.
    #[error("Tag store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// A lock guarding the tag set was poisoned by a panicking writer.
    #[error("Tag store lock poisoned")]
    LockPoisoned,

    /// Failed to read the persisted tag set.
    #[error("Failed to read tags from {}: {source}", path.display())]
    ReadError {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the persisted tag set.
    #[error("Failed to write tags to {}: {source}", path.display())]
    WriteError {
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The persisted tag set is not valid JSON.
    #[error("Failed to parse tags in {}: {source}", path.display())]
    ParseError {
        /// Path being parsed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to serialize the tag set.
    #[error("Failed to serialize tags: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// Failed to create the data directory.
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDirError {
        /// Directory being created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for tag store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage backend for audience tags.
///
/// Implementations must be safe to call concurrently from event callbacks
/// and the expiry dispatcher.
pub trait TagStore: Send + Sync {
    /// Commits a batch of additions and removals.
    ///
    /// Removing a tag that is not present is not an error.
    fn apply(&self, mutation: &TagMutation) -> StoreResult<()>;

    /// Returns the current tag set.
    fn tags(&self) -> StoreResult<BTreeSet<String>>;

    /// Returns `true` if `tag` is currently applied.
    fn contains(&self, tag: &str) -> StoreResult<bool> {
        Ok(self.tags()?.contains(tag))
    }
}

/// Tag store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryTagStore {
    tags: RwLock<BTreeSet<String>>,
    applies: AtomicU64,
}

impl InMemoryTagStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batches applied so far.
    pub fn apply_count(&self) -> u64 {
        self.applies.load(Ordering::Relaxed)
    }
}

impl TagStore for InMemoryTagStore {
    fn apply(&self, mutation: &TagMutation) -> StoreResult<()> {
        let mut tags = self.tags.write().map_err(|_| StoreError::LockPoisoned)?;
        mutation.apply_to(&mut tags);
        self.applies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn tags(&self) -> StoreResult<BTreeSet<String>> {
        let tags = self.tags.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tags.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_apply_adds_and_removes() {
        let store = InMemoryTagStore::new();
        store
            .apply(&TagMutation::new().add_tag("zone_Z1").add_tag("fence_F1"))
            .unwrap();
        assert!(store.contains("zone_Z1").unwrap());
        assert!(store.contains("fence_F1").unwrap());

        store.apply(&TagMutation::new().remove_tag("fence_F1")).unwrap();
        assert!(!store.contains("fence_F1").unwrap());
        assert_eq!(store.apply_count(), 2);
    }

    #[test]
    fn test_removing_missing_tag_is_ok() {
        let store = InMemoryTagStore::new();
        tokio_test::assert_ok!(store.apply(&TagMutation::new().remove_tag("zone_missing")));
        assert!(store.tags().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_applies() {
        let store = Arc::new(InMemoryTagStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .apply(&TagMutation::new().add_tag(format!("beacon_B{i}")))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.tags().unwrap().len(), 8);
        assert_eq!(store.apply_count(), 8);
    }
}
