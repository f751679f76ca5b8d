//! Mirror synchronization engine
//!
//! The [`SyncEngine`] makes the remote store mirror the local sync root.
//! Synchronization is one-way: local is the source of truth.
//!
//! ## Sync Flow
//!
//! 1. **Enumerate**: walk the sync root (root included, lexical order)
//! 2. **Resolve passes**: resolve every entry on the worker pool. Entries
//!    reported `Locked` are collected and retried in the next pass, until a
//!    pass leaves nothing behind. Existing files get a modification check.
//! 3. **Reconcile deletions**: tracked paths missing from a fresh walk are
//!    deleted remotely and dropped from the store
//! 4. **Persist**: write the store snapshot
//!
//! A failing resolve task aborts the cycle once in-flight tasks finish;
//! deletions and persistence are skipped and the next cycle starts over
//! from the last persisted state plus whatever this cycle created.
//!
//! ## Convergence
//!
//! A path at depth D below the root is created within D + 1 passes: each
//! pass completes at least the shallowest pending level.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use treemirror_cache::MetadataStore;
use treemirror_core::config::SyncConfig;
use treemirror_core::ports::{INotificationSink, IRemoteBackend, SyncNotice};

use crate::filesystem::{walk_tree, WalkEntry};
use crate::pool::{RetryPolicy, WorkerPool};
use crate::resolver::{ObjectResolver, Resolution};
use crate::SyncError;

// ============================================================================
// SyncReport
// ============================================================================

/// Summary of a completed synchronization cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Remote objects created (directories and files)
    pub created: u32,
    /// Remote files whose content was replaced
    pub updated: u32,
    /// Remote objects deleted successfully because the local path is gone
    pub deleted: u32,
    /// Remote deletions that failed (the entry is dropped anyway)
    pub failed_deletions: u32,
    /// Number of resolve passes run
    pub passes: u32,
    /// Wall-clock duration of the cycle in milliseconds
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Per-cycle counters shared by the pool tasks
#[derive(Debug, Default)]
struct CycleCounters {
    updated: AtomicU32,
    deleted: AtomicU32,
    failed_deletions: AtomicU32,
}

// ============================================================================
// EngineSettings
// ============================================================================

/// Worker pool sizing and retry behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl EngineSettings {
    pub fn from_config(sync: &SyncConfig) -> Self {
        Self {
            workers: sync.workers,
            retry: RetryPolicy {
                retries: sync.retries,
                base_delay: sync.retry_base_delay(),
            },
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: 8,
            retry: RetryPolicy::default(),
        }
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Shared state cloned into every pool task
struct EngineContext {
    store: Arc<MetadataStore>,
    backend: Arc<dyn IRemoteBackend>,
    notifier: Arc<dyn INotificationSink>,
    resolver: ObjectResolver,
}

/// One-way mirror synchronization engine
///
/// ## Dependencies
///
/// - `store`: Path → remote object map, persisted after every cycle
/// - `backend`: Remote object store operations
/// - `notifier`: User-facing notices for created, updated and deleted objects
pub struct SyncEngine {
    ctx: Arc<EngineContext>,
    settings: EngineSettings,
}

impl SyncEngine {
    /// Creates a new `SyncEngine` with the given dependencies
    pub fn new(
        store: Arc<MetadataStore>,
        backend: Arc<dyn IRemoteBackend>,
        notifier: Arc<dyn INotificationSink>,
        settings: EngineSettings,
    ) -> Self {
        let resolver = ObjectResolver::new(
            Arc::clone(&store),
            Arc::clone(&backend),
            Arc::clone(&notifier),
        );
        Self {
            ctx: Arc::new(EngineContext {
                store,
                backend,
                notifier,
                resolver,
            }),
            settings,
        }
    }

    /// The store this engine synchronizes against
    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.ctx.store
    }

    /// Runs one full synchronization cycle
    ///
    /// # Returns
    /// A [`SyncReport`] summarizing the cycle
    ///
    /// # Errors
    /// Walk errors, resolve task failures (after retries) and persistence
    /// failures abort the cycle. The store is not persisted on abort.
    #[tracing::instrument(skip(self), fields(root = %self.ctx.store.sync_root().display()))]
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let created_before = self.ctx.resolver.created_count();
        let counters = Arc::new(CycleCounters::default());
        let sync_root = self.ctx.store.sync_root().to_path_buf();

        self.discard_stale_placeholders();

        // Step 1: Enumerate
        let mut pending = walk_tree(&sync_root).await?;
        info!(entries = pending.len(), "Starting sync cycle");

        // Step 2: Resolve passes
        let mut passes = 0;
        while !pending.is_empty() {
            passes += 1;
            let total = pending.len();
            pending = self.resolve_pass(pending, &counters).await?;
            self.ctx.notifier.separator();
            debug!(pass = passes, total, deferred = pending.len(), "Resolve pass finished");
        }

        // Step 3: Reconcile deletions
        self.reconcile_deletions(&counters).await?;

        // Step 4: Persist
        self.ctx.store.persist()?;

        let report = SyncReport {
            created: self.ctx.resolver.created_count() - created_before,
            updated: counters.updated.load(Ordering::Relaxed),
            deleted: counters.deleted.load(Ordering::Relaxed),
            failed_deletions: counters.failed_deletions.load(Ordering::Relaxed),
            passes,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            failed_deletions = report.failed_deletions,
            passes = report.passes,
            duration_ms = report.duration_ms,
            "Sync cycle completed"
        );

        Ok(report)
    }

    /// Drops placeholders left over from an interrupted run.
    ///
    /// No worker is active between cycles, so any placeholder found here can
    /// never be completed and would keep its subtree `Locked` forever.
    fn discard_stale_placeholders(&self) {
        for (path, obj) in self.ctx.store.snapshot() {
            if obj.is_locked() {
                warn!(path = %path.display(), "Discarding stale placeholder");
                self.ctx.store.remove(&path);
            }
        }
    }

    /// Resolves every entry in `pending`, returning those that were `Locked`.
    async fn resolve_pass(
        &self,
        pending: Vec<WalkEntry>,
        counters: &Arc<CycleCounters>,
    ) -> Result<Vec<WalkEntry>, SyncError> {
        let deferred = Arc::new(Mutex::new(Vec::new()));
        let mut pool = WorkerPool::new(self.settings.workers, self.settings.retry);

        for entry in pending {
            let ctx = Arc::clone(&self.ctx);
            let counters = Arc::clone(counters);
            let deferred = Arc::clone(&deferred);
            let dispatched = pool
                .submit("resolve", move || {
                    let ctx = Arc::clone(&ctx);
                    let counters = Arc::clone(&counters);
                    let deferred = Arc::clone(&deferred);
                    let entry = entry.clone();
                    async move {
                        match ctx.resolver.resolve(&entry.path).await? {
                            Resolution::Locked => {
                                deferred
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .push(entry);
                            }
                            Resolution::Existing(_) if entry.is_dir => {}
                            Resolution::Existing(_) => {
                                check_modification(&ctx, &entry, &counters).await;
                            }
                            Resolution::Created(_) | Resolution::Skipped => {}
                        }
                        Ok(())
                    }
                })
                .await;
            if !dispatched {
                break;
            }
        }

        pool.join().await?;

        let deferred = std::mem::take(&mut *deferred.lock().unwrap_or_else(PoisonError::into_inner));
        Ok(deferred)
    }

    /// Deletes remote objects whose local path no longer exists.
    async fn reconcile_deletions(&self, counters: &Arc<CycleCounters>) -> Result<(), SyncError> {
        let sync_root = self.ctx.store.sync_root().to_path_buf();
        let present: HashSet<PathBuf> = walk_tree(&sync_root)
            .await?
            .into_iter()
            .map(|entry| entry.path)
            .collect();

        let mut pool = WorkerPool::new(self.settings.workers, RetryPolicy::NONE);
        let mut dispatched = 0;

        for (path, obj) in self.ctx.store.snapshot() {
            if present.contains(&path) {
                continue;
            }
            dispatched += 1;

            let ctx = Arc::clone(&self.ctx);
            let counters = Arc::clone(counters);
            pool.submit("delete", move || {
                let ctx = Arc::clone(&ctx);
                let counters = Arc::clone(&counters);
                let path = path.clone();
                let obj = obj.clone();
                async move {
                    if let Err(err) = ctx.backend.delete_recursive(&obj.remote_id).await {
                        warn!(
                            path = %path.display(),
                            remote_id = %obj.remote_id,
                            error = %format!("{err:#}"),
                            "Remote delete failed"
                        );
                        counters.failed_deletions.fetch_add(1, Ordering::Relaxed);
                    } else {
                        counters.deleted.fetch_add(1, Ordering::Relaxed);
                    }
                    ctx.store.remove(&path);
                    ctx.notifier.notify(&SyncNotice::Deleted {
                        path,
                        size: obj.size,
                    });
                    Ok(())
                }
            })
            .await;
        }

        pool.join().await?;
        if dispatched > 0 {
            self.ctx.notifier.separator();
        }
        Ok(())
    }
}

/// Pushes a modified file to its remote object.
///
/// Backend failures are logged and the file counts as not updated; the
/// next cycle will try again because the stored metadata is unchanged.
async fn check_modification(ctx: &EngineContext, entry: &WalkEntry, counters: &CycleCounters) {
    let Some(stored) = ctx.store.lookup(&entry.path) else {
        return;
    };
    if !stored.needs_update(entry.modified_unix, entry.size) {
        return;
    }

    if let Err(err) = ctx.backend.update_file(&entry.path, &stored.remote_id).await {
        warn!(
            path = %entry.path.display(),
            remote_id = %stored.remote_id,
            error = %format!("{err:#}"),
            "Remote update failed, file not updated"
        );
        return;
    }

    ctx.store.mutate(&entry.path, |obj| {
        obj.record_modification(entry.modified_unix, entry.size)
    });
    counters.updated.fetch_add(1, Ordering::Relaxed);
    ctx.notifier.notify(&SyncNotice::FileUpdated {
        path: entry.path.clone(),
        old_size: stored.size,
        new_size: entry.size,
    });
}
