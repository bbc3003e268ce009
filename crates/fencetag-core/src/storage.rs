//! Persistent tag storage.
//!
//! Keeps the current tag set in a single JSON file so tags survive restarts
//! of the host process.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{StoreError, StoreResult, TagStore};
use crate::tags::TagMutation;

/// File name of the persisted tag set.
pub const TAGS_FILE_NAME: &str = "tags.json";

/// On-disk representation of the tag set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TagFile {
    tags: BTreeSet<String>,
    updated_at_utc: Option<DateTime<Utc>>,
}

/// Tag store backed by a JSON file.
///
/// Every call does blocking `std::fs` I/O on a small file. Async callers
/// should go through `tokio::task::spawn_blocking`; deferred removals run it
/// directly on the expiry dispatcher task, which only delays other removals.
#[derive(Debug)]
pub struct FileTagStore {
    path: PathBuf,
    // Serialises read-modify-write cycles.
    lock: Mutex<()>,
}

impl FileTagStore {
    /// Create a store that keeps `tags.json` inside `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(TAGS_FILE_NAME),
            lock: Mutex::new(()),
        }
    }

    /// Create a store in the default data directory.
    ///
    /// On Linux: `/var/lib/fencetag/`
    /// Elsewhere: the platform data directory for `fencetag`.
    pub fn in_default_location() -> StoreResult<Self> {
        Ok(Self::new(default_data_dir()?))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the tag set was last written, if ever.
    pub fn updated_at(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.load()?.updated_at_utc)
    }

    fn load(&self) -> StoreResult<TagFile> {
        if !self.path.exists() {
            return Ok(TagFile::default());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| StoreError::ReadError {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::ParseError {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, file: &TagFile) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDirError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(file)?;

        // Write to a sibling temp file first so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|source| StoreError::WriteError {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StoreError::WriteError {
            path: self.path.clone(),
            source,
        })
    }
}

impl TagStore for FileTagStore {
    fn apply(&self, mutation: &TagMutation) -> StoreResult<()> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut file = self.load()?;
        mutation.apply_to(&mut file.tags);
        file.updated_at_utc = Some(Utc::now());
        self.save(&file)
    }

    fn tags(&self) -> StoreResult<BTreeSet<String>> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(self.load()?.tags)
    }
}

/// Default data directory for persisted tags.
pub fn default_data_dir() -> StoreResult<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/var/lib/fencetag"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "fencetag")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| StoreError::Unavailable {
                message: "Cannot determine data directory".into(),
            })
    }
}
