//! TreeMirror Cache - Local state persistence
//!
//! In-memory map from local paths to their remote objects, with a JSON
//! snapshot file on disk:
//! - Placeholder claims that deduplicate concurrent creations
//! - Modification metadata used for change detection
//! - Snapshot persistence at the end of each sync cycle
//!
//! ## Key Components
//!
//! - [`MetadataStore`] - Thread-safe store shared by all sync workers
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use treemirror_cache::MetadataStore;
//!
//! # fn example() -> Result<(), treemirror_cache::CacheError> {
//! let store = MetadataStore::open(
//!     Path::new("/home/user/.local/share/treemirror/object_map.json"),
//!     Path::new("/srv/photos"),
//!     "",
//! )?;
//! // Share it across workers as Arc<MetadataStore>...
//! store.persist()?;
//! # Ok(())
//! # }
//! ```

pub mod store;

pub use store::MetadataStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Reading, creating or replacing the snapshot file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file is not a valid object map
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
