//! Domain entities and business rules
//!
//! This module contains the core domain types for TreeMirror:
//! - [`TrackedObject`] - the stored record linking a local path to a remote object
//! - Byte size formatting used by console notices
//! - Domain-specific error types

pub mod errors;
pub mod size;
pub mod tracked_object;

// Re-export commonly used types
pub use errors::DomainError;
pub use size::format_size;
pub use tracked_object::{TrackedObject, ROOT_MARKER};
