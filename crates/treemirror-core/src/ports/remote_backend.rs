//! Remote backend port (driven/secondary port)
//!
//! This module defines the interface for the remote object store that the
//! local tree is mirrored into. The production adapter drives an external
//! object-store CLI; tests and load runs use in-process fakes.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific
//!   and don't need domain-level classification.
//! - Uses `#[async_trait]` for async trait methods.
//! - Operations take the *local* path of the object. Adapters derive the
//!   object name (and, for CLI adapters, the working directory) from it.

use std::path::Path;

/// Where a newly created remote object is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteParent<'a> {
    /// The account's default root folder
    Root,
    /// A specific remote folder
    Folder(&'a str),
}

impl<'a> RemoteParent<'a> {
    /// Maps a parent's remote id to a placement, treating the root marker as `Root`.
    #[must_use]
    pub fn from_remote_id(remote_id: &'a str) -> Self {
        if remote_id == crate::domain::ROOT_MARKER {
            Self::Root
        } else {
            Self::Folder(remote_id)
        }
    }
}

/// Port trait for remote object store operations
///
/// ## Implementation Notes
///
/// - Implementations must not retry internally; the sync engine's worker
///   pool owns the retry policy.
/// - `create_directory` and `upload_file` return the identifier of the new
///   remote object, which becomes the object's permanent identity.
#[async_trait::async_trait]
pub trait IRemoteBackend: Send + Sync {
    /// Creates a remote folder mirroring the local directory at `local`
    ///
    /// # Returns
    /// The identifier of the new remote folder
    async fn create_directory(&self, local: &Path, parent: RemoteParent<'_>)
        -> anyhow::Result<String>;

    /// Uploads the local file at `local` as a new remote object
    ///
    /// # Returns
    /// The identifier of the new remote file
    async fn upload_file(&self, local: &Path, parent: RemoteParent<'_>) -> anyhow::Result<String>;

    /// Replaces the content of the remote file `remote_id` with the local file at `local`
    async fn update_file(&self, local: &Path, remote_id: &str) -> anyhow::Result<()>;

    /// Deletes the remote object `remote_id` and everything below it
    async fn delete_recursive(&self, remote_id: &str) -> anyhow::Result<()>;

    /// Selects the account whose credentials subsequent operations use
    async fn switch_account(&self, account: &str) -> anyhow::Result<()>;
}
