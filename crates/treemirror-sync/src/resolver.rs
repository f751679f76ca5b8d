//! Object resolver - maps a local path to its remote object, creating it if needed
//!
//! Resolution is parent-first: a path's remote object can only be created
//! once its parent directory has a remote id. Missing parents are resolved
//! recursively before the path itself.
//!
//! ## Placeholder protocol
//!
//! ```text
//! lookup ──hit──→ Existing / Locked (placeholder)
//!   │
//!   miss → resolve parent → stat → try_insert(placeholder)
//!                                      │            │
//!                                     won          lost → Locked
//!                                      │
//!                              backend create ──fail──→ remove placeholder, error
//!                                      │
//!                               complete(id) → Created
//! ```
//!
//! Symlinks are stat'd with the same rule as the tree walk, so a symlink to a
//! directory or a dangling symlink resolves to `Skipped` and is never created.
//!
//! `Locked` never means failure. It tells the sync engine to retry the path
//! on its next pass, when the worker holding the claim has finished.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, debug_span, Instrument};

use treemirror_cache::MetadataStore;
use treemirror_core::domain::{DomainError, TrackedObject};
use treemirror_core::ports::{INotificationSink, IRemoteBackend, RemoteParent, SyncNotice};

use crate::filesystem::{mirrored_metadata, unix_seconds};
use crate::SyncError;

/// Outcome of resolving one local path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The path was already tracked with a remote id
    Existing(TrackedObject),
    /// This call created the remote object
    Created(TrackedObject),
    /// Another worker holds the claim on the path or one of its ancestors
    Locked,
    /// The path is a symlink that is not mirrored
    Skipped,
}

type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Result<Resolution, SyncError>> + Send + 'a>>;

/// Resolves local paths to tracked remote objects
pub struct ObjectResolver {
    store: Arc<MetadataStore>,
    backend: Arc<dyn IRemoteBackend>,
    notifier: Arc<dyn INotificationSink>,
    created: AtomicU32,
}

impl ObjectResolver {
    pub fn new(
        store: Arc<MetadataStore>,
        backend: Arc<dyn IRemoteBackend>,
        notifier: Arc<dyn INotificationSink>,
    ) -> Self {
        Self {
            store,
            backend,
            notifier,
            created: AtomicU32::new(0),
        }
    }

    /// Total remote objects created by this resolver, parents included
    pub fn created_count(&self) -> u32 {
        self.created.load(Ordering::Relaxed)
    }

    /// Resolves `path`, creating its remote object (and missing ancestors).
    ///
    /// # Errors
    ///
    /// - `SyncError::OutsideRoot` if `path` is not below the sync root
    /// - `SyncError::Stat` if the local path cannot be inspected
    /// - `SyncError::Backend` if the remote creation fails; the placeholder
    ///   is removed so a later attempt can claim the path again
    pub fn resolve<'a>(&'a self, path: &'a Path) -> ResolveFuture<'a> {
        let span = debug_span!("resolve", path = %path.display());
        Box::pin(
            async move {
                if let Some(existing) = self.store.lookup(path) {
                    return Ok(if existing.is_locked() {
                        Resolution::Locked
                    } else {
                        Resolution::Existing(existing)
                    });
                }

                let parent_path = match path.parent() {
                    Some(parent) if path.starts_with(self.store.sync_root()) => parent,
                    _ => return Err(SyncError::OutsideRoot(path.to_path_buf())),
                };

                let parent = match self.store.lookup(parent_path) {
                    Some(parent) => parent,
                    None => match self.resolve(parent_path).await? {
                        Resolution::Created(parent) => parent,
                        // Someone else claimed the parent first; retry on a later pass
                        Resolution::Skipped => return Ok(Resolution::Skipped),
                        Resolution::Existing(_) | Resolution::Locked => {
                            debug!(
                                parent = %parent_path.display(),
                                "Parent resolved elsewhere, deferring"
                            );
                            return Ok(Resolution::Locked);
                        }
                    },
                };

                if parent.is_locked() {
                    return Ok(Resolution::Locked);
                }

                self.create(path, &parent).await
            }
            .instrument(span),
        )
    }

    async fn create(&self, path: &Path, parent: &TrackedObject) -> Result<Resolution, SyncError> {
        let local = path.to_path_buf();
        let stat = tokio::task::spawn_blocking(move || mirrored_metadata(&local))
            .await
            .map_err(|e| SyncError::TaskAborted(format!("stat task failed: {e}")))?;
        let metadata = match stat {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                debug!("Symlink is not mirrored, skipping");
                return Ok(Resolution::Skipped);
            }
            Err(source) => {
                return Err(SyncError::Stat {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let is_dir = metadata.is_dir();
        let size = metadata.len();
        let last_modified = if is_dir {
            0
        } else {
            metadata.modified().map(unix_seconds).unwrap_or(0)
        };

        let placeholder = TrackedObject::placeholder(&parent.remote_id, last_modified, size);
        if !self.store.try_insert(path, placeholder) {
            return Ok(Resolution::Locked);
        }

        let remote_parent = RemoteParent::from_remote_id(&parent.remote_id);
        let (op, created) = if is_dir {
            ("mkdir", self.backend.create_directory(path, remote_parent).await)
        } else {
            ("upload", self.backend.upload_file(path, remote_parent).await)
        };

        let remote_id = match created {
            Ok(id) => id,
            Err(source) => {
                self.store.remove(path);
                return Err(SyncError::Backend {
                    op,
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut completed = Ok(());
        let object = self
            .store
            .mutate(path, |obj| completed = obj.complete(&remote_id))
            .ok_or_else(|| DomainError::InvalidState {
                from: "untracked".to_string(),
                to: format!("resolved({remote_id})"),
            })?;
        completed?;

        self.created.fetch_add(1, Ordering::Relaxed);
        debug!(remote_id = %object.remote_id, op, "Remote object created");

        let notice = if is_dir {
            SyncNotice::DirectoryCreated {
                path: path.to_path_buf(),
                size,
            }
        } else {
            SyncNotice::FileCreated {
                path: path.to_path_buf(),
                size,
            }
        };
        self.notifier.notify(&notice);

        Ok(Resolution::Created(object))
    }
}
