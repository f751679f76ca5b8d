//! Console notification sink
//!
//! Prints one line per synchronized object to stdout, with paths shown
//! relative to the parent of the sync root (so the root's own name is kept),
//! and a dashed separator line between passes.

use std::path::{Path, PathBuf};

use tracing::debug;

use treemirror_core::ports::{INotificationSink, SyncNotice};

/// Width of the separator line printed between passes
pub const SEPARATOR_WIDTH: usize = 66;

/// [`INotificationSink`] writing human-readable lines to stdout
#[derive(Debug, Clone)]
pub struct ConsoleNotifier {
    base: Option<PathBuf>,
}

impl ConsoleNotifier {
    pub fn new(sync_root: &Path) -> Self {
        Self {
            base: sync_root.parent().map(Path::to_path_buf),
        }
    }

    /// Formats `notice` the way it is printed
    pub fn line(&self, notice: &SyncNotice) -> String {
        notice.render(self.base.as_deref())
    }
}

impl INotificationSink for ConsoleNotifier {
    fn notify(&self, notice: &SyncNotice) {
        let line = self.line(notice);
        debug!(op = notice.label(), path = %notice.path().display(), "{line}");
        println!("{line}");
    }

    fn separator(&self) {
        println!("{}", "-".repeat(SEPARATOR_WIDTH));
    }
}
