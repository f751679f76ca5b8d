//! TreeMirror Sync - One-way mirror synchronization engine
//!
//! Provides:
//! - Local tree enumeration
//! - Parent-first remote object resolution with placeholder locking
//! - Multi-pass sync cycles over a bounded worker pool
//! - Deletion reconciliation and periodic scheduling
//!
//! ## Modules
//!
//! - [`engine`] - Sync engine orchestrating passes, deletions and persistence
//! - [`filesystem`] - Local tree walk producing [`filesystem::WalkEntry`] records
//! - [`pool`] - Bounded worker pool with per-task retry
//! - [`resolver`] - Recursive object resolver
//! - [`notify`] - Console notification sink
//! - [`scheduler`] - Periodic cycle loop with graceful shutdown

pub mod engine;
pub mod filesystem;
pub mod notify;
pub mod pool;
pub mod resolver;
pub mod scheduler;

use std::path::PathBuf;

use thiserror::Error;

use treemirror_cache::CacheError;
use treemirror_core::domain::DomainError;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Enumerating the local tree failed
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Reading metadata of a local path failed
    #[error("Failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The path does not lie below the sync root
    #[error("Path outside sync root: {0}")]
    OutsideRoot(PathBuf),

    /// A remote backend operation failed
    #[error("Remote {op} failed for {path}: {source:#}")]
    Backend {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Loading or persisting the metadata store failed
    #[error("Store error: {0}")]
    Store(#[from] CacheError),

    /// A domain-level error propagated from treemirror-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// A worker task panicked or was cancelled
    #[error("Task aborted: {0}")]
    TaskAborted(String),
}

impl SyncError {
    /// Returns true if retrying the failed task may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Backend { .. } | SyncError::Stat { .. })
    }
}
