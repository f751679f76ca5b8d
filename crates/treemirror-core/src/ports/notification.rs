//! Notification sink port (driven/secondary port)
//!
//! This module defines the interface for reporting synchronized objects to
//! the user. The daemon prints one line per notice on the console; tests
//! collect notices to assert on them.
//!
//! ## Design Notes
//!
//! - Notices are fire-and-forget; sinks must not block the worker calling them.
//! - Sinks receive absolute local paths and decide how to shorten them.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::domain::format_size;

/// A user-facing report about one synchronized object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
    /// A remote folder was created for a local directory
    DirectoryCreated { path: PathBuf, size: u64 },
    /// A local file was uploaded as a new remote object
    FileCreated { path: PathBuf, size: u64 },
    /// A modified local file was pushed to its remote object
    FileUpdated {
        path: PathBuf,
        old_size: u64,
        new_size: u64,
    },
    /// A remote object was deleted because its local counterpart is gone
    Deleted { path: PathBuf, size: u64 },
}

impl SyncNotice {
    /// The local path the notice is about
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            SyncNotice::DirectoryCreated { path, .. }
            | SyncNotice::FileCreated { path, .. }
            | SyncNotice::FileUpdated { path, .. }
            | SyncNotice::Deleted { path, .. } => path,
        }
    }

    /// Short operation label (`mkdir`, `created`, `updated`, `deleted`)
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            SyncNotice::DirectoryCreated { .. } => "mkdir",
            SyncNotice::FileCreated { .. } => "created",
            SyncNotice::FileUpdated { .. } => "updated",
            SyncNotice::Deleted { .. } => "deleted",
        }
    }

    /// Renders the notice as a console line, showing the path relative to `base`
    /// when it lies below it.
    #[must_use]
    pub fn render(&self, base: Option<&Path>) -> String {
        let path = self.path();
        let shown = base
            .and_then(|b| path.strip_prefix(b).ok())
            .unwrap_or(path);

        match self {
            SyncNotice::DirectoryCreated { size, .. }
            | SyncNotice::FileCreated { size, .. }
            | SyncNotice::Deleted { size, .. } => format!(
                "{}: {} ({})",
                self.label(),
                shown.display(),
                format_size(*size)
            ),
            SyncNotice::FileUpdated {
                old_size, new_size, ..
            } => format!(
                "{}: {} ({} -> {})",
                self.label(),
                shown.display(),
                format_size(*old_size),
                format_size(*new_size)
            ),
        }
    }
}

impl fmt::Display for SyncNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(None))
    }
}

/// Port trait for delivering sync notices
pub trait INotificationSink: Send + Sync {
    /// Reports a single synchronized object
    fn notify(&self, notice: &SyncNotice);

    /// Marks the boundary between two phases or cycles
    fn separator(&self);
}
