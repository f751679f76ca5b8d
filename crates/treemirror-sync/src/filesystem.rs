//! Local tree enumeration
//!
//! Walks the sync root and records the metadata each sync pass needs.
//!
//! ## Design Decisions
//!
//! - **Root included**: the sync root itself is the first entry. It resolves
//!   to the synthesized root object and is otherwise a no-op.
//! - **Lexical order**: entries within a directory are sorted by file name,
//!   and a directory always precedes its contents.
//! - **No symlink following**: the walk never descends through a symlink, so
//!   cyclic links cannot make it diverge. A symlink to a regular file is
//!   mirrored as that file with the target's metadata; symlinks to
//!   directories and dangling symlinks are skipped with a warning.
//! - **UTF-8 names only**: a path that is not valid UTF-8 cannot be a
//!   snapshot key, so it is skipped (with its whole subtree) and a warning
//!   is logged.
//! - **Blocking walk**: `walkdir` is synchronous, so the walk runs on the
//!   blocking thread pool via `spawn_blocking`.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::SyncError;

/// One local path observed during a walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    /// Modification time in Unix seconds
    pub modified_unix: i64,
    pub size: u64,
}

/// Enumerates `root` and everything below it.
///
/// # Errors
///
/// Any error reading a directory or an entry's metadata aborts the walk
/// with `SyncError::Walk`.
#[instrument(skip(root), fields(root = %root.display()))]
pub async fn walk_tree(root: &Path) -> Result<Vec<WalkEntry>, SyncError> {
    let root = root.to_path_buf();
    let entries = tokio::task::spawn_blocking(move || walk_blocking(&root))
        .await
        .map_err(|e| SyncError::TaskAborted(format!("walk task failed: {e}")))??;

    debug!(count = entries.len(), "Local tree enumerated");
    Ok(entries)
}

fn walk_blocking(root: &Path) -> Result<Vec<WalkEntry>, SyncError> {
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            // Snapshot keys are UTF-8 strings
            let representable = entry.path().to_str().is_some();
            if !representable {
                warn!(
                    path = %entry.path().display(),
                    "Skipping path that is not valid UTF-8"
                );
            }
            representable
        });

    for entry_result in walker {
        let entry = entry_result?;
        let metadata = if entry.path_is_symlink() {
            match mirrored_metadata(entry.path()).map_err(|source| SyncError::Stat {
                path: entry.path().to_path_buf(),
                source,
            })? {
                Some(metadata) => metadata,
                None => {
                    warn!(
                        path = %entry.path().display(),
                        "Skipping symlink that does not point to a file"
                    );
                    continue;
                }
            }
        } else {
            entry.metadata()?
        };

        entries.push(WalkEntry {
            path: entry.into_path(),
            is_dir: metadata.is_dir(),
            modified_unix: metadata.modified().map(unix_seconds).unwrap_or(0),
            size: metadata.len(),
        });
    }

    Ok(entries)
}

/// Reads the metadata `path` is mirrored with.
///
/// Regular files and directories yield their own metadata. A symlink to a
/// regular file yields the target's metadata. Any other symlink, dangling
/// ones included, yields `None` and is not mirrored.
pub fn mirrored_metadata(path: &Path) -> io::Result<Option<Metadata>> {
    let own = std::fs::symlink_metadata(path)?;
    if !own.file_type().is_symlink() {
        return Ok(Some(own));
    }
    match std::fs::metadata(path) {
        Ok(target) if target.is_file() => Ok(Some(target)),
        Ok(_) => Ok(None),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Converts a filesystem timestamp to whole Unix seconds.
pub fn unix_seconds(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}
