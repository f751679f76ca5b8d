//! Integration tests for SyncEngine
//!
//! Each test builds a scratch tree in a temporary directory and syncs it
//! against a recording fake backend, then asserts on the backend calls,
//! the store contents and the persisted snapshot.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tempfile::TempDir;

use treemirror_cache::MetadataStore;
use treemirror_core::domain::TrackedObject;
use treemirror_core::ports::{INotificationSink, IRemoteBackend, RemoteParent, SyncNotice};
use treemirror_sync::engine::{EngineSettings, SyncEngine};
use treemirror_sync::pool::RetryPolicy;
use treemirror_sync::resolver::{ObjectResolver, Resolution};
use treemirror_sync::SyncError;

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Call {
    Mkdir { path: PathBuf, parent: String },
    Upload { path: PathBuf, parent: String },
    Update { path: PathBuf, remote_id: String },
    Delete { remote_id: String },
}

/// Fake backend recording every successful call
#[derive(Default)]
struct RecordingBackend {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicU32,
    delay: Duration,
    /// Remaining failures per upload path
    failing_uploads: Mutex<HashMap<PathBuf, u32>>,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
}

impl RecordingBackend {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn fail_upload(&self, path: &Path, times: u32) {
        self.failing_uploads
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), times);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) -> String {
        self.calls.lock().unwrap().push(call);
        format!("r{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

fn parent_label(parent: RemoteParent<'_>) -> String {
    match parent {
        RemoteParent::Root => ".".to_string(),
        RemoteParent::Folder(id) => id.to_string(),
    }
}

#[async_trait]
impl IRemoteBackend for RecordingBackend {
    async fn create_directory(&self, local: &Path, parent: RemoteParent<'_>) -> anyhow::Result<String> {
        self.pause().await;
        Ok(self.record(Call::Mkdir {
            path: local.to_path_buf(),
            parent: parent_label(parent),
        }))
    }

    async fn upload_file(&self, local: &Path, parent: RemoteParent<'_>) -> anyhow::Result<String> {
        self.pause().await;
        {
            let mut failing = self.failing_uploads.lock().unwrap();
            if let Some(remaining) = failing.get_mut(local) {
                if *remaining > 0 {
                    *remaining -= 1;
                    anyhow::bail!("upload of {} rejected", local.display());
                }
            }
        }
        Ok(self.record(Call::Upload {
            path: local.to_path_buf(),
            parent: parent_label(parent),
        }))
    }

    async fn update_file(&self, local: &Path, remote_id: &str) -> anyhow::Result<()> {
        self.pause().await;
        if self.fail_updates.load(Ordering::SeqCst) {
            anyhow::bail!("update rejected");
        }
        self.record(Call::Update {
            path: local.to_path_buf(),
            remote_id: remote_id.to_string(),
        });
        Ok(())
    }

    async fn delete_recursive(&self, remote_id: &str) -> anyhow::Result<()> {
        self.pause().await;
        if self.fail_deletes.load(Ordering::SeqCst) {
            anyhow::bail!("delete rejected");
        }
        self.record(Call::Delete {
            remote_id: remote_id.to_string(),
        });
        Ok(())
    }

    async fn switch_account(&self, _account: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<SyncNotice>>,
    separators: AtomicU32,
}

impl RecordingNotifier {
    fn labels(&self) -> Vec<&'static str> {
        self.notices.lock().unwrap().iter().map(|n| n.label()).collect()
    }
}

impl INotificationSink for RecordingNotifier {
    fn notify(&self, notice: &SyncNotice) {
        self.notices.lock().unwrap().push(notice.clone());
    }

    fn separator(&self) {
        self.separators.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Test helpers
// ============================================================================

struct Harness {
    _src: TempDir,
    _state: TempDir,
    root: PathBuf,
    state_file: PathBuf,
    store: Arc<MetadataStore>,
    backend: Arc<RecordingBackend>,
    notices: Arc<RecordingNotifier>,
    engine: SyncEngine,
}

fn settings(workers: usize, retries: u32) -> EngineSettings {
    EngineSettings {
        workers,
        retry: RetryPolicy {
            retries,
            base_delay: Duration::from_millis(1),
        },
    }
}

fn harness(backend: RecordingBackend, settings: EngineSettings, root_remote_id: &str) -> Harness {
    let src = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    let root = src.path().to_path_buf();
    let state_file = state.path().join("object_map.json");

    let store = Arc::new(MetadataStore::open(&state_file, &root, root_remote_id).unwrap());
    let backend = Arc::new(backend);
    let notices = Arc::new(RecordingNotifier::default());
    let engine = SyncEngine::new(
        Arc::clone(&store),
        Arc::clone(&backend) as Arc<dyn IRemoteBackend>,
        Arc::clone(&notices) as Arc<dyn INotificationSink>,
        settings,
    );

    Harness {
        _src: src,
        _state: state,
        root,
        state_file,
        store,
        backend,
        notices,
        engine,
    }
}

/// Creates `entries` below `root`; names ending in `/` are directories.
fn build_tree(root: &Path, entries: &[&str]) {
    for entry in entries {
        let path = root.join(entry.trim_end_matches('/'));
        if entry.ends_with('/') {
            fs::create_dir_all(&path).unwrap();
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, entry.as_bytes()).unwrap();
        }
    }
}

/// Rewrites `path` with `content` and moves its mtime `secs` into the future.
fn touch_with(path: &Path, content: &[u8], secs: u64) {
    fs::write(path, content).unwrap();
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs))
        .unwrap();
}

fn created_paths(calls: &[Call]) -> Vec<PathBuf> {
    calls
        .iter()
        .filter_map(|call| match call {
            Call::Mkdir { path, .. } | Call::Upload { path, .. } => Some(path.clone()),
            _ => None,
        })
        .collect()
}

fn persisted(state_file: &Path) -> HashMap<String, TrackedObject> {
    serde_json::from_str(&fs::read_to_string(state_file).unwrap()).unwrap()
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_initial_sync_creates_every_object_once() {
    let h = harness(RecordingBackend::default(), settings(4, 0), "");
    build_tree(&h.root, &["a.txt", "docs/", "docs/b.txt", "docs/deep/c.txt", "empty/"]);

    let report = h.engine.sync().await.unwrap();

    let created = created_paths(&h.backend.calls());
    let unique: HashSet<_> = created.iter().cloned().collect();
    assert_eq!(created.len(), 6);
    assert_eq!(unique.len(), 6);
    assert_eq!(report.created, 6);
    assert_eq!(report.updated, 0);
    assert_eq!(report.deleted, 0);
    assert!(report.passes >= 1);

    // Every tracked object is resolved and parented on its directory's id
    let snapshot = h.store.snapshot();
    assert_eq!(snapshot.len(), 6);
    for (path, obj) in &snapshot {
        assert!(!obj.is_locked(), "{} left locked", path.display());
        let parent = h.store.lookup(path.parent().unwrap()).unwrap();
        assert_eq!(obj.parent_remote_id, parent.remote_id);
    }
    assert_eq!(h.store.lookup(&h.root.join("docs")).unwrap().last_modified, 0);

    // Persisted snapshot matches the store
    let on_disk = persisted(&h.state_file);
    assert_eq!(on_disk.len(), 6);
    let key = h.root.join("docs/b.txt").to_string_lossy().into_owned();
    assert_eq!(on_disk[&key], snapshot[&h.root.join("docs/b.txt")]);

    let labels = h.notices.labels();
    assert_eq!(labels.iter().filter(|l| **l == "mkdir").count(), 3);
    assert_eq!(labels.iter().filter(|l| **l == "created").count(), 3);
    assert_eq!(h.notices.separators.load(Ordering::SeqCst), report.passes);
}

#[tokio::test]
async fn test_parents_are_created_before_children() {
    let h = harness(RecordingBackend::default(), settings(8, 0), "");
    build_tree(&h.root, &["x/y/z/file.bin", "x/y/other.bin", "x/sibling.bin"]);

    h.engine.sync().await.unwrap();

    let created = created_paths(&h.backend.calls());
    let position = |p: &Path| created.iter().position(|c| c == p).unwrap();
    for path in &created {
        let parent = path.parent().unwrap();
        if parent != h.root {
            assert!(
                position(parent) < position(path),
                "{} created before its parent",
                path.display()
            );
        }
    }
}

#[tokio::test]
async fn test_root_folder_id_parents_top_level_objects() {
    let h = harness(RecordingBackend::default(), settings(2, 0), "ROOT-FOLDER");
    build_tree(&h.root, &["top.txt"]);

    h.engine.sync().await.unwrap();

    assert_eq!(
        h.backend.calls(),
        vec![Call::Upload {
            path: h.root.join("top.txt"),
            parent: "ROOT-FOLDER".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_default_root_creates_without_parent() {
    let h = harness(RecordingBackend::default(), settings(2, 0), "");
    build_tree(&h.root, &["top/"]);

    h.engine.sync().await.unwrap();

    assert_eq!(
        h.backend.calls(),
        vec![Call::Mkdir {
            path: h.root.join("top"),
            parent: ".".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_resync_without_changes_is_a_no_op() {
    let h = harness(RecordingBackend::default(), settings(4, 0), "");
    build_tree(&h.root, &["a.txt", "d/b.txt"]);
    h.engine.sync().await.unwrap();
    h.backend.clear();

    let report = h.engine.sync().await.unwrap();

    assert!(h.backend.calls().is_empty());
    assert_eq!(report.created, 0);
    assert_eq!(report.updated, 0);
    assert_eq!(report.deleted, 0);
    assert_eq!(report.passes, 1);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let h = harness(RecordingBackend::default(), settings(4, 0), "");
    build_tree(&h.root, &["a.txt", "d/b.txt"]);
    h.engine.sync().await.unwrap();

    // A fresh process: new store from the persisted file, new engine
    let store = Arc::new(MetadataStore::open(&h.state_file, &h.root, "").unwrap());
    let backend = Arc::new(RecordingBackend::default());
    let engine = SyncEngine::new(
        Arc::clone(&store),
        Arc::clone(&backend) as Arc<dyn IRemoteBackend>,
        Arc::new(RecordingNotifier::default()) as Arc<dyn INotificationSink>,
        settings(4, 0),
    );

    let report = engine.sync().await.unwrap();

    assert!(backend.calls().is_empty());
    assert_eq!(report.created, 0);
    assert_eq!(store.snapshot(), h.store.snapshot());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_workers_never_duplicate_creations() {
    let h = harness(
        RecordingBackend::with_delay(Duration::from_millis(3)),
        settings(16, 0),
        "",
    );
    let mut entries = Vec::new();
    for d in 0..4 {
        for s in 0..3 {
            for f in 0..4 {
                entries.push(format!("d{d}/s{s}/f{f}.txt"));
            }
        }
    }
    let refs: Vec<&str> = entries.iter().map(String::as_str).collect();
    build_tree(&h.root, &refs);

    let report = h.engine.sync().await.unwrap();

    let created = created_paths(&h.backend.calls());
    let unique: HashSet<_> = created.iter().cloned().collect();
    // 4 top dirs + 12 subdirs + 48 files
    assert_eq!(created.len(), 64);
    assert_eq!(unique.len(), 64);
    assert_eq!(report.created, 64);
    assert!(h.store.snapshot().values().all(|obj| !obj.is_locked()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_racing_resolves_of_one_path_create_once() {
    let h = harness(
        RecordingBackend::with_delay(Duration::from_millis(20)),
        settings(1, 0),
        "",
    );
    build_tree(&h.root, &["shared/target.bin"]);
    let resolver = Arc::new(ObjectResolver::new(
        Arc::clone(&h.store),
        Arc::clone(&h.backend) as Arc<dyn IRemoteBackend>,
        Arc::clone(&h.notices) as Arc<dyn INotificationSink>,
    ));
    let target = h.root.join("shared/target.bin");

    let mut handles = Vec::new();
    for _ in 0..16 {
        let resolver = Arc::clone(&resolver);
        let target = target.clone();
        handles.push(tokio::spawn(async move {
            resolver.resolve(&target).await.unwrap()
        }));
    }
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    let created = outcomes
        .iter()
        .filter(|r| matches!(r, Resolution::Created(_)))
        .count();
    assert_eq!(created, 1);
    assert_eq!(
        created_paths(&h.backend.calls()),
        vec![h.root.join("shared"), target.clone()]
    );
    assert!(!h.store.lookup(&target).unwrap().is_locked());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deep_chain_converges_within_depth_passes() {
    let h = harness(
        RecordingBackend::with_delay(Duration::from_millis(2)),
        settings(8, 0),
        "",
    );
    // file sits at depth 5 below the root
    build_tree(&h.root, &["l1/l2/l3/l4/file.txt"]);

    let report = h.engine.sync().await.unwrap();

    assert_eq!(report.created, 5);
    assert!(report.passes >= 1);
    assert!(report.passes <= 5, "took {} passes", report.passes);
    assert_eq!(created_paths(&h.backend.calls()).len(), 5);
}

// ============================================================================
// Modification
// ============================================================================

#[tokio::test]
async fn test_modified_file_is_updated() {
    let h = harness(RecordingBackend::default(), settings(2, 0), "");
    build_tree(&h.root, &["a.txt"]);
    h.engine.sync().await.unwrap();
    let file = h.root.join("a.txt");
    let remote_id = h.store.lookup(&file).unwrap().remote_id;
    h.backend.clear();

    touch_with(&file, b"a much longer body", 120);
    let report = h.engine.sync().await.unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(
        h.backend.calls(),
        vec![Call::Update {
            path: file.clone(),
            remote_id: remote_id.clone(),
        }]
    );
    let stored = h.store.lookup(&file).unwrap();
    assert_eq!(stored.size, 18);
    assert_eq!(stored.remote_id, remote_id);
    assert!(h.notices.labels().contains(&"updated"));

    // Persisted with the new metadata
    let on_disk = persisted(&h.state_file);
    assert_eq!(on_disk[&file.to_string_lossy().into_owned()].size, 18);
}

#[tokio::test]
async fn test_same_size_edit_is_not_uploaded() {
    let h = harness(RecordingBackend::default(), settings(2, 0), "");
    build_tree(&h.root, &["a.txt"]);
    h.engine.sync().await.unwrap();
    h.backend.clear();

    // Same length as the original "a.txt" content
    touch_with(&h.root.join("a.txt"), b"zzzzz", 120);
    let report = h.engine.sync().await.unwrap();

    assert_eq!(report.updated, 0);
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_failed_update_is_retried_next_cycle() {
    let h = harness(RecordingBackend::default(), settings(2, 0), "");
    build_tree(&h.root, &["a.txt"]);
    h.engine.sync().await.unwrap();
    let file = h.root.join("a.txt");
    let before = h.store.lookup(&file).unwrap();

    touch_with(&file, b"grown content", 120);
    h.backend.fail_updates.store(true, Ordering::SeqCst);
    let report = h.engine.sync().await.unwrap();

    assert_eq!(report.updated, 0);
    assert_eq!(h.store.lookup(&file).unwrap(), before);

    h.backend.fail_updates.store(false, Ordering::SeqCst);
    let report = h.engine.sync().await.unwrap();
    assert_eq!(report.updated, 1);
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn test_removed_paths_are_deleted_remotely() {
    let h = harness(RecordingBackend::default(), settings(4, 0), "");
    build_tree(&h.root, &["keep.txt", "gone/", "gone/inner.txt"]);
    h.engine.sync().await.unwrap();
    let gone_id = h.store.lookup(&h.root.join("gone")).unwrap().remote_id;
    let inner_id = h.store.lookup(&h.root.join("gone/inner.txt")).unwrap().remote_id;
    h.backend.clear();

    fs::remove_dir_all(h.root.join("gone")).unwrap();
    let report = h.engine.sync().await.unwrap();

    assert_eq!(report.deleted, 2);
    assert_eq!(report.failed_deletions, 0);
    let deleted: HashSet<Call> = h.backend.calls().into_iter().collect();
    assert_eq!(
        deleted,
        HashSet::from([
            Call::Delete { remote_id: gone_id },
            Call::Delete { remote_id: inner_id },
        ])
    );
    assert!(h.store.lookup(&h.root.join("gone")).is_none());
    assert!(h.store.lookup(&h.root.join("keep.txt")).is_some());

    let on_disk = persisted(&h.state_file);
    assert_eq!(on_disk.len(), 1);
}

#[tokio::test]
async fn test_failed_remote_delete_still_drops_entry() {
    let h = harness(RecordingBackend::default(), settings(2, 3), "");
    build_tree(&h.root, &["old.txt"]);
    h.engine.sync().await.unwrap();

    fs::remove_file(h.root.join("old.txt")).unwrap();
    h.backend.fail_deletes.store(true, Ordering::SeqCst);
    let report = h.engine.sync().await.unwrap();

    assert_eq!(report.deleted, 0);
    assert_eq!(report.failed_deletions, 1);
    assert!(h.store.is_empty());
    assert!(h.notices.labels().contains(&"deleted"));
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_failed_creation_aborts_cycle_without_persisting() {
    let h = harness(RecordingBackend::default(), settings(1, 0), "");
    build_tree(&h.root, &["bad.txt"]);
    h.backend.fail_upload(&h.root.join("bad.txt"), u32::MAX);

    let err = h.engine.sync().await.unwrap_err();

    assert!(matches!(err, SyncError::Backend { op: "upload", .. }));
    assert!(h.store.lookup(&h.root.join("bad.txt")).is_none());
    assert_eq!(fs::read_to_string(&h.state_file).unwrap(), "{}");
}

#[tokio::test]
async fn test_transient_creation_failure_is_retried() {
    let h = harness(RecordingBackend::default(), settings(2, 2), "");
    build_tree(&h.root, &["flaky.txt"]);
    h.backend.fail_upload(&h.root.join("flaky.txt"), 1);

    let report = h.engine.sync().await.unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(created_paths(&h.backend.calls()), vec![h.root.join("flaky.txt")]);
}

#[tokio::test]
async fn test_stale_placeholder_is_reclaimed() {
    let h = harness(RecordingBackend::default(), settings(2, 0), "");
    build_tree(&h.root, &["dir/file.txt"]);
    h.store
        .try_insert(&h.root.join("dir"), TrackedObject::placeholder(".", 0, 0));

    let report = h.engine.sync().await.unwrap();

    assert_eq!(report.created, 2);
    assert!(!h.store.lookup(&h.root.join("dir")).unwrap().is_locked());
}

// ============================================================================
// Unmirrored paths
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_directory_symlink_is_not_mirrored() {
    let h = harness(RecordingBackend::default(), settings(2, 0), "");
    build_tree(&h.root, &["real/f.txt"]);
    std::os::unix::fs::symlink(h.root.join("real"), h.root.join("link")).unwrap();

    let first = h.engine.sync().await.unwrap();
    assert_eq!(first.created, 2);
    assert!(h.store.lookup(&h.root.join("link")).is_none());
    h.backend.clear();

    let second = h.engine.sync().await.unwrap();

    assert!(h.backend.calls().is_empty());
    assert_eq!(second.updated, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_file_symlink_resyncs_without_updates() {
    let h = harness(RecordingBackend::default(), settings(2, 0), "");
    build_tree(&h.root, &["real.txt"]);
    std::os::unix::fs::symlink(h.root.join("real.txt"), h.root.join("alias.txt")).unwrap();

    h.engine.sync().await.unwrap();
    assert!(h.store.lookup(&h.root.join("alias.txt")).is_some());
    h.backend.clear();

    let report = h.engine.sync().await.unwrap();

    assert!(h.backend.calls().is_empty());
    assert_eq!(report.updated, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_dangling_symlink_does_not_block_cycles() {
    let h = harness(RecordingBackend::default(), settings(2, 2), "");
    build_tree(&h.root, &["a.txt"]);
    std::os::unix::fs::symlink(h.root.join("missing"), h.root.join("dangling")).unwrap();

    let report = h.engine.sync().await.unwrap();

    assert_eq!(report.created, 1);
    let snapshot = persisted(&h.state_file);
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.contains_key(h.root.join("a.txt").to_str().unwrap()));
}

#[cfg(unix)]
#[tokio::test]
async fn test_non_utf8_name_is_never_uploaded_or_deleted() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let h = harness(RecordingBackend::default(), settings(2, 0), "");
    let bad = h.root.join(OsStr::from_bytes(b"caf\xe9.txt"));
    if fs::write(&bad, b"x").is_err() {
        // Filesystem refuses non-UTF-8 names
        return;
    }
    build_tree(&h.root, &["ok.txt"]);
    h.engine.sync().await.unwrap();

    // A fresh process reading the persisted snapshot
    let store = Arc::new(MetadataStore::open(&h.state_file, &h.root, "").unwrap());
    let backend = Arc::new(RecordingBackend::default());
    let engine = SyncEngine::new(
        Arc::clone(&store),
        Arc::clone(&backend) as Arc<dyn IRemoteBackend>,
        Arc::new(RecordingNotifier::default()) as Arc<dyn INotificationSink>,
        settings(2, 0),
    );
    engine.sync().await.unwrap();

    assert_eq!(created_paths(&h.backend.calls()), vec![h.root.join("ok.txt")]);
    assert!(backend.calls().is_empty());
    assert_eq!(store.snapshot(), h.store.snapshot());
}
