//! TrackedObject - the stored record for one local path
//!
//! A `TrackedObject` links a local filesystem path (the key it is stored
//! under) to the identifier of the remote object mirroring it.
//!
//! ## Placeholder state
//!
//! An empty `remote_id` marks a *placeholder*: a worker has claimed the path
//! and is creating the remote object. Other workers that observe a
//! placeholder must defer instead of creating a second remote object.
//!
//! ```text
//! placeholder ("")  ──complete()──→  resolved (id)
//!        │
//!        └── removed from the store when creation fails
//! ```
//!
//! ## Persisted form
//!
//! Field names follow the on-disk JSON format:
//! `{"gd_id": ..., "gdp_id": ..., "last_mod": ..., "size": ...}`.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Remote identifier used for the root when no root folder id is configured.
///
/// Backends create objects under the account's default root when they are
/// parented under this marker.
pub const ROOT_MARKER: &str = ".";

/// Stored metadata for one tracked local path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedObject {
    /// Remote object identifier; empty while creation is in flight
    #[serde(rename = "gd_id")]
    pub remote_id: String,
    /// Remote identifier of the enclosing directory
    #[serde(rename = "gdp_id")]
    pub parent_remote_id: String,
    /// Local modification time (Unix seconds); zero for directories
    #[serde(rename = "last_mod", default)]
    pub last_modified: i64,
    /// Local size in bytes
    #[serde(default)]
    pub size: u64,
}

impl TrackedObject {
    /// Creates a placeholder claiming a path whose remote object is not yet created.
    #[must_use]
    pub fn placeholder(parent_remote_id: impl Into<String>, last_modified: i64, size: u64) -> Self {
        Self {
            remote_id: String::new(),
            parent_remote_id: parent_remote_id.into(),
            last_modified,
            size,
        }
    }

    /// Synthesizes the never-persisted object standing for the sync root.
    ///
    /// An empty `remote_id` maps to [`ROOT_MARKER`] so the root is never
    /// mistaken for a placeholder.
    #[must_use]
    pub fn root(remote_id: &str) -> Self {
        let remote_id = if remote_id.is_empty() {
            ROOT_MARKER
        } else {
            remote_id
        };
        Self {
            remote_id: remote_id.to_string(),
            ..Self::default()
        }
    }

    /// Returns true while the remote creation for this object is in flight.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.remote_id.is_empty()
    }

    /// Returns true if this object stands for the default remote root.
    #[must_use]
    pub fn is_root_marker(&self) -> bool {
        self.remote_id == ROOT_MARKER
    }

    /// Completes a placeholder with the identifier returned by the backend.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRemoteId` for an empty id and
    /// `DomainError::InvalidState` if the object was already resolved.
    pub fn complete(&mut self, remote_id: &str) -> Result<(), DomainError> {
        if remote_id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "Remote ID cannot be empty".to_string(),
            ));
        }
        if !self.is_locked() {
            return Err(DomainError::InvalidState {
                from: format!("resolved({})", self.remote_id),
                to: format!("resolved({remote_id})"),
            });
        }
        self.remote_id = remote_id.to_string();
        Ok(())
    }

    /// Returns true if observed local metadata warrants re-uploading the file.
    ///
    /// Both conditions must hold: the modification time advanced *and* the
    /// size changed. Requiring the size delta keeps clock skew alone from
    /// triggering uploads, at the cost of missing equal-length edits.
    #[must_use]
    pub fn needs_update(&self, observed_modified: i64, observed_size: u64) -> bool {
        observed_modified > self.last_modified && observed_size != self.size
    }

    /// Records new local modification metadata after a successful update.
    pub fn record_modification(&mut self, modified: i64, size: u64) {
        self.last_modified = modified;
        self.size = size;
    }
}
