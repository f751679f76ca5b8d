//! Metadata store shared by the sync workers
//!
//! Maps absolute local paths to [`TrackedObject`]s. All workers of a sync
//! cycle share one store behind an `Arc`; the map itself sits behind a
//! `RwLock` so lookups proceed in parallel while inserts and mutations are
//! exclusive.
//!
//! ## Design Notes
//!
//! - [`MetadataStore::try_insert`] is the only way to claim a path. It is an
//!   atomic compare-and-insert, so exactly one worker wins a race.
//! - The lock is never held across I/O: [`MetadataStore::persist`] serializes
//!   a snapshot taken under the read lock.
//! - The sync root itself is never stored; [`MetadataStore::lookup`]
//!   synthesizes it from the configured root folder id.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use treemirror_core::domain::TrackedObject;

use crate::CacheError;

/// Thread-safe map from local paths to tracked remote objects
#[derive(Debug)]
pub struct MetadataStore {
    objects: RwLock<HashMap<PathBuf, TrackedObject>>,
    file: PathBuf,
    sync_root: PathBuf,
    root: TrackedObject,
}

impl MetadataStore {
    /// Opens the store backed by the JSON snapshot at `file`.
    ///
    /// A missing file is created containing `{}`, and an empty file is read
    /// as an empty map.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Io` if the file cannot be read or created and
    /// `CacheError::Serialization` if it holds malformed JSON.
    pub fn open(file: &Path, sync_root: &Path, root_remote_id: &str) -> Result<Self, CacheError> {
        let objects = if file.exists() {
            let content = std::fs::read_to_string(file).map_err(|source| CacheError::Io {
                path: file.to_path_buf(),
                source,
            })?;
            parse_snapshot(&content)?
        } else {
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(file, "{}").map_err(|source| CacheError::Io {
                path: file.to_path_buf(),
                source,
            })?;
            HashMap::new()
        };

        tracing::info!(
            path = %file.display(),
            entries = objects.len(),
            "Metadata store loaded"
        );

        Ok(Self {
            objects: RwLock::new(objects),
            file: file.to_path_buf(),
            sync_root: sync_root.to_path_buf(),
            root: TrackedObject::root(root_remote_id),
        })
    }

    /// Creates a store that is not backed by a file yet.
    ///
    /// [`MetadataStore::persist`] writes to `file` as usual.
    pub fn in_memory(file: &Path, sync_root: &Path, root_remote_id: &str) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            file: file.to_path_buf(),
            sync_root: sync_root.to_path_buf(),
            root: TrackedObject::root(root_remote_id),
        }
    }

    /// The local directory mirrored by this store
    pub fn sync_root(&self) -> &Path {
        &self.sync_root
    }

    /// The snapshot file this store persists to
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Stores `candidate` under `path` only if no entry exists yet.
    ///
    /// Returns `true` if the caller won the claim.
    pub fn try_insert(&self, path: &Path, candidate: TrackedObject) -> bool {
        let mut objects = self.write();
        if objects.contains_key(path) {
            return false;
        }
        objects.insert(path.to_path_buf(), candidate);
        true
    }

    /// Returns a copy of the entry for `path`, or the root object for the sync root.
    pub fn lookup(&self, path: &Path) -> Option<TrackedObject> {
        if path == self.sync_root {
            return Some(self.root.clone());
        }
        self.read().get(path).cloned()
    }

    /// Applies `f` to the entry for `path` under exclusive access.
    ///
    /// Returns the updated copy, or `None` if there is no entry.
    pub fn mutate<F>(&self, path: &Path, f: F) -> Option<TrackedObject>
    where
        F: FnOnce(&mut TrackedObject),
    {
        let mut objects = self.write();
        let entry = objects.get_mut(path)?;
        f(entry);
        Some(entry.clone())
    }

    /// Removes the entry for `path`, returning it if present.
    pub fn remove(&self, path: &Path) -> Option<TrackedObject> {
        self.write().remove(path)
    }

    /// Deep copy of every entry, ordered by path
    pub fn snapshot(&self) -> BTreeMap<PathBuf, TrackedObject> {
        self.read()
            .iter()
            .map(|(path, obj)| (path.clone(), obj.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Writes the current snapshot to the backing file.
    ///
    /// The JSON is written to a sibling temporary file first and then renamed
    /// over the snapshot, so a crash mid-write leaves the previous snapshot.
    /// Entries whose path is not valid UTF-8 have no lossless key and are
    /// left out.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Serialization` or `CacheError::Io` on failure.
    pub fn persist(&self) -> Result<(), CacheError> {
        let snapshot: BTreeMap<String, TrackedObject> = self
            .snapshot()
            .into_iter()
            .filter_map(|(path, obj)| match path.to_str() {
                Some(key) => Some((key.to_string(), obj)),
                None => {
                    tracing::warn!(
                        path = %path.display(),
                        "Not persisting entry whose path is not valid UTF-8"
                    );
                    None
                }
            })
            .collect();
        let json = serde_json::to_string_pretty(&snapshot)?;

        let tmp = self.file.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| CacheError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.file).map_err(|source| CacheError::Io {
            path: self.file.clone(),
            source,
        })?;

        tracing::debug!(
            path = %self.file.display(),
            entries = snapshot.len(),
            "Metadata store persisted"
        );
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PathBuf, TrackedObject>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PathBuf, TrackedObject>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_snapshot(content: &str) -> Result<HashMap<PathBuf, TrackedObject>, CacheError> {
    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let raw: HashMap<String, TrackedObject> = serde_json::from_str(content)?;
    Ok(raw
        .into_iter()
        .map(|(path, obj)| (PathBuf::from(path), obj))
        .collect())
}
